//! Router-level tests against an in-memory database
//!
//! Each test builds a fresh app, seeds users directly in the store and then
//! drives the HTTP API the way a client would.

use std::sync::{Arc, OnceLock};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Datelike;
use dossier_core::{Rank, SystemRole};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::auth::{self, password};
use crate::cache::View;
use crate::config::Settings;
use crate::router;
use crate::state::AppState;

const PASSWORD: &str = "Dienst2026x";

const JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01,
];

/// Argon2 is slow in debug builds; every seeded user shares one hash
fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| password::hash_password(PASSWORD).unwrap())
}

struct TestApp {
    app: Router,
    state: Arc<AppState>,
}

impl TestApp {
    async fn new() -> Self {
        let state = AppState::connect("sqlite::memory:", Settings::default())
            .await
            .unwrap();
        let state = Arc::new(state);
        Self {
            app: router(state.clone()),
            state,
        }
    }

    async fn user(&self, username: &str, rank: Rank, role: SystemRole) -> String {
        auth::insert_user(
            &self.state.db,
            username,
            &format!("KHK {username}"),
            password_hash(),
            rank,
            role,
            None,
        )
        .await
        .unwrap()
    }

    async fn raw(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.raw(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, Some(token), Some(body)).await
    }

    async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Create a report and return its id
    async fn report(&self, token: &str, title: &str, narrative: &str) -> String {
        let (status, body) = self
            .post(
                "/api/reports",
                token,
                json!({ "title": title, "narrative": narrative, "location": "Hafen, Schuppen 4" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn transition(
        &self,
        token: &str,
        report_id: &str,
        action: &str,
        comment: Option<&str>,
    ) -> (StatusCode, Value) {
        self.post(
            &format!("/api/reports/{report_id}/transition"),
            token,
            json!({ "action": action, "comment": comment }),
        )
        .await
    }

    /// Drive a fresh report by `author` all the way to approval by `reviewer`
    async fn approved_report(&self, author: &str, reviewer: &str) -> String {
        let id = self.report(author, "Übergabe am Hafen", "<p>Beobachtung</p>").await;
        for (token, action) in [
            (author, "submit"),
            (reviewer, "start_review"),
            (reviewer, "approve"),
        ] {
            let (status, body) = self.transition(token, &id, action, None).await;
            assert_eq!(status, StatusCode::OK, "{action}: {body}");
        }
        id
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }
}

/// Admin, a plain officer, a senior officer with review rank and a junior
struct Staff {
    admin: String,
    officer: String,
    senior: String,
    junior: String,
    officer_id: String,
    senior_id: String,
    junior_id: String,
}

async fn staff(app: &TestApp) -> Staff {
    app.user("admin", Rank::Kriminalrat, SystemRole::Admin).await;
    let officer_id = app.user("weber", Rank::Kommissar, SystemRole::Member).await;
    let senior_id = app
        .user("schulz", Rank::Hauptkommissar, SystemRole::Member)
        .await;
    let junior_id = app
        .user("klein", Rank::Oberkommissar, SystemRole::Member)
        .await;
    Staff {
        admin: app.login("admin").await,
        officer: app.login("weber").await,
        senior: app.login("schulz").await,
        junior: app.login("klein").await,
        officer_id,
        senior_id,
        junior_id,
    }
}

// ============================================================
// Auth
// ============================================================

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    let response = app
        .raw(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_sets_session_cookie() {
    let app = TestApp::new().await;
    app.user("weber", Rank::Kommissar, SystemRole::Member).await;

    let response = app
        .raw(
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": "Weber", "password": PASSWORD }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("dossier_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));

    let session = cookie.split(';').next().unwrap().to_string();
    let response = app
        .raw(
            Request::get("/api/auth/me")
                .header(header::COOKIE, session)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert_eq!(me["username"], "weber");
    assert_eq!(me["rank"], "kommissar");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn failed_logins_look_the_same() {
    let app = TestApp::new().await;
    let s = staff(&app).await;

    let (status, wrong) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "weber", "password": "Falsch123x" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .patch(
            &format!("/api/users/{}", s.officer_id),
            &s.admin,
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, inactive) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "weber", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["error"], inactive["error"]);

    // deactivation also ended the running session
    let (status, _) = app.get("/api/auth/me", &s.officer).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_user_login_still_checks_a_password() {
    let app = TestApp::new().await;
    app.user("weber", Rank::Kommissar, SystemRole::Member).await;

    let login = |username: &'static str| {
        app.send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": username, "password": "Falsch123x" })),
        )
    };
    let (status, unknown) = login("niemand").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, wrong) = login("weber").await;
    assert_eq!(unknown, wrong);

    let dummy = auth::dummy_hash().await.unwrap();
    assert!(dummy.starts_with("$argon2id$"));
    assert!(!password::verify_password("Falsch123x", &dummy));
    assert!(!password::verify_password(PASSWORD, &dummy));
}

#[tokio::test]
async fn profile_carries_timestamps() {
    let app = TestApp::new().await;
    app.user("weber", Rank::Kommissar, SystemRole::Member).await;
    let token = app.login("weber").await;

    let (status, me) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(me["created_at"].is_string());
    assert!(me["updated_at"].is_string());
}

#[tokio::test]
async fn requests_without_session_are_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/api/reports", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["status"], 401);

    let (status, _) = app.get("/api/reports", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_ends_session() {
    let app = TestApp::new().await;
    app.user("weber", Rank::Kommissar, SystemRole::Member).await;
    let token = app.login("weber").await;

    let (status, _) = app
        .send(Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_change_revokes_other_sessions() {
    let app = TestApp::new().await;
    app.user("weber", Rank::Kommissar, SystemRole::Member).await;
    let first = app.login("weber").await;
    let second = app.login("weber").await;

    let (status, body) = app
        .post(
            "/api/auth/password",
            &first,
            json!({ "current_password": PASSWORD, "new_password": "schwach" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = app
        .post(
            "/api/auth/password",
            &first,
            json!({ "current_password": PASSWORD, "new_password": "NeuesPasswort7" }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(app.get("/api/auth/me", &first).await.0, StatusCode::OK);
    assert_eq!(
        app.get("/api/auth/me", &second).await.0,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn bootstrap_admin_only_on_empty_store() {
    let app = TestApp::new().await;
    let created = auth::bootstrap_admin(&app.state.db, "chef", None)
        .await
        .unwrap();
    assert!(created.is_none());

    let created = auth::bootstrap_admin(&app.state.db, "chef", Some(PASSWORD))
        .await
        .unwrap();
    assert!(created.is_some());

    let again = auth::bootstrap_admin(&app.state.db, "chef2", Some(PASSWORD))
        .await
        .unwrap();
    assert!(again.is_none());

    let token = app.login("chef").await;
    let (_, me) = app.get("/api/auth/me", &token).await;
    assert_eq!(me["role"], "admin");
}

// ============================================================
// Users
// ============================================================

#[tokio::test]
async fn only_admins_manage_users() {
    let app = TestApp::new().await;
    let s = staff(&app).await;

    let new_user = json!({
        "username": "neu",
        "display_name": "KK Neu",
        "password": "Anfang2026x",
        "rank": "kommissaranwaerter"
    });
    let (status, _) = app.post("/api/users", &s.officer, new_user.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post("/api/users", &s.admin, new_user.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["role"], "member");
    assert_eq!(body["rank_label"], "Kriminalkommissaranwärter");

    let (status, _) = app.post("/api/users", &s.admin, new_user).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, users) = app.get("/api/users", &s.officer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn admin_cannot_demote_or_deactivate_self() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let (_, me) = app.get("/api/auth/me", &s.admin).await;
    let uri = format!("/api/users/{}", me["id"].as_str().unwrap());

    let (status, _) = app.patch(&uri, &s.admin, json!({ "role": "member" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.patch(&uri, &s.admin, json!({ "active": false })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .patch(&uri, &s.admin, json!({ "rank": "kriminaloberrat" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rank"], "kriminaloberrat");
}

// ============================================================
// Reports
// ============================================================

#[tokio::test]
async fn report_review_lifecycle() {
    let app = TestApp::new().await;
    let s = staff(&app).await;

    let id = app.report(&s.officer, "Observation Bahnhof", "").await;

    // an empty narrative cannot be submitted
    let (status, _) = app.transition(&s.officer, &id, "submit", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .patch(
            &format!("/api/reports/{id}"),
            &s.officer,
            json!({ "narrative": "<p>Zwei Personen, <b>Übergabe</b> beobachtet.</p>" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.transition(&s.officer, &id, "submit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "submitted");
    assert!(body["submitted_at"].is_string());

    // nobody reviews their own report, juniors do not review at all
    let (status, _) = app.transition(&s.officer, &id, "start_review", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.transition(&s.junior, &id, "start_review", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.transition(&s.senior, &id, "start_review", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "under_review");
    assert_eq!(body["reviewer"]["id"], s.senior_id.as_str());

    let (status, _) = app.transition(&s.senior, &id, "return", Some("  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app
        .transition(&s.senior, &id, "return", Some("Uhrzeit fehlt"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "returned");
    assert_eq!(body["review_comment"], "Uhrzeit fehlt");

    // returned reports are editable again
    let (status, _) = app
        .patch(
            &format!("/api/reports/{id}"),
            &s.officer,
            json!({ "incident_at": "2026-03-14T22:15:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    for (token, action) in [
        (&s.officer, "submit"),
        (&s.senior, "start_review"),
        (&s.senior, "approve"),
    ] {
        let (status, body) = app.transition(token, &id, action, None).await;
        assert_eq!(status, StatusCode::OK, "{action}: {body}");
    }

    let (status, body) = app.transition(&s.senior, &id, "approve", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = app
        .patch(
            &format!("/api/reports/{id}"),
            &s.officer,
            json!({ "title": "Nachträglich" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, detail) = app.get(&format!("/api/reports/{id}"), &s.junior).await;
    assert_eq!(detail["status"], "approved");
    assert_eq!(detail["status_label"], "Freigegeben");
}

#[tokio::test]
async fn withdraw_returns_report_to_draft() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let id = app.report(&s.officer, "Kontrolle", "<p>Text</p>").await;

    app.transition(&s.officer, &id, "submit", None).await;
    let (status, body) = app.transition(&s.officer, &id, "withdraw", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "draft");
    assert!(body["submitted_at"].is_null());
}

#[tokio::test]
async fn drafts_are_private_to_their_author() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let draft = app.report(&s.officer, "Entwurf", "<p>geheim</p>").await;
    let submitted = app.report(&s.officer, "Eingereicht", "<p>Text</p>").await;
    app.transition(&s.officer, &submitted, "submit", None).await;

    let (status, _) = app.get(&format!("/api/reports/{draft}"), &s.senior).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/api/reports/{draft}"), &s.admin).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = app.get("/api/reports", &s.senior).await;
    let titles: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Eingereicht"]);

    let (_, mine) = app.get("/api/reports?mine=true", &s.officer).await;
    assert_eq!(mine.as_array().unwrap().len(), 2);

    let (_, filtered) = app.get("/api/reports?status=submitted", &s.officer).await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);
    assert_eq!(filtered[0]["excerpt"], "Text");
}

#[tokio::test]
async fn delete_rules() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let draft = app.report(&s.officer, "Weg damit", "").await;
    let submitted = app.report(&s.officer, "Bleibt", "<p>x</p>").await;
    app.transition(&s.officer, &submitted, "submit", None).await;

    let (status, _) = app
        .delete(&format!("/api/reports/{submitted}"), &s.officer)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&format!("/api/reports/{draft}"), &s.officer).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .delete(&format!("/api/reports/{submitted}"), &s.admin)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn map_is_validated_and_replaced_whole() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let id = app.report(&s.officer, "Lage", "").await;
    let uri = format!("/api/reports/{id}/map");

    let outside = json!({
        "width": 1000.0,
        "height": 800.0,
        "markers": [{ "id": "m1", "kind": "suspect", "position": { "x": 1200.0, "y": 10.0 }, "color": "red" }]
    });
    let (status, _) = app.put(&uri, &s.officer, outside).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let map = json!({
        "width": 1000.0,
        "height": 800.0,
        "viewport": { "offset": { "x": 0.0, "y": 0.0 }, "zoom": 1.0, "view_width": 400.0, "view_height": 300.0 },
        "markers": [
            { "id": "m1", "kind": "suspect", "position": { "x": 120.0, "y": 80.0 }, "color": "red", "label": "Person A" }
        ],
        "shapes": [
            { "id": "s1", "geometry": { "type": "circle", "center": { "x": 500.0, "y": 400.0 }, "radius": 50.0 }, "color": "blue" }
        ],
        "legend": [
            { "color": "red", "meaning": "Tatverdächtige" },
            { "color": "green", "meaning": "Zugriffsteam" }
        ]
    });
    let (status, body) = app.put(&uri, &s.officer, map).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["map"]["markers"][0]["label"], "Person A");
    assert_eq!(body["map"]["shapes"][0]["stroke_width"], 2.0);
    assert_eq!(body["map_warnings"]["unlabelled_colors"], json!(["blue"]));
    assert_eq!(body["map_warnings"]["unused_legend_colors"], json!(["green"]));

    let (status, _) = app.put(&uri, &s.senior, json!({ "width": 10.0, "height": 10.0 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================
// Evidence
// ============================================================

#[tokio::test]
async fn evidence_upload_and_download() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let report = app.report(&s.officer, "Durchsuchung", "<p>Fund</p>").await;
    let upload_uri = format!("/api/reports/{report}/evidence");

    let (status, body) = app
        .post(
            &upload_uri,
            &s.officer,
            json!({ "file_name": "fake.jpg", "mime_type": "image/jpeg", "data_base64": BASE64.encode(b"not an image") }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = app
        .post(
            &upload_uri,
            &s.officer,
            json!({ "file_name": "x.jpg", "mime_type": "image/jpeg", "data_base64": "%%%" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, meta) = app
        .post(
            &upload_uri,
            &s.officer,
            json!({
                "file_name": "../Fundort 1.jpg",
                "mime_type": "image/jpeg",
                "data_base64": BASE64.encode(JPEG),
                "caption": "Versteck im Radkasten"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{meta}");
    assert_eq!(meta["kind"], "photo");
    assert_eq!(meta["file_name"], "Fundort_1.jpg");
    assert_eq!(meta["size_bytes"], JPEG.len());
    let evidence_id = meta["id"].as_str().unwrap().to_string();

    let response = app
        .raw(
            Request::get(format!("/api/evidence/{evidence_id}/content"))
                .header(header::AUTHORIZATION, format!("Bearer {}", s.officer))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    assert!(response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("Fundort_1.jpg"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), JPEG);

    let (_, detail) = app.get(&format!("/api/reports/{report}"), &s.officer).await;
    assert_eq!(detail["evidence"].as_array().unwrap().len(), 1);

    // once submitted the evidence is frozen, even for admins
    app.transition(&s.officer, &report, "submit", None).await;
    let (status, _) = app
        .delete(&format!("/api/evidence/{evidence_id}"), &s.officer)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .delete(&format!("/api/evidence/{evidence_id}"), &s.admin)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ============================================================
// Cases
// ============================================================

#[tokio::test]
async fn escalate_and_close_case() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let report = app.approved_report(&s.officer, &s.senior).await;

    // drafts cannot be escalated
    let draft = app.report(&s.officer, "Entwurf", "").await;
    let (status, _) = app
        .post(&format!("/api/reports/{draft}/escalate"), &s.officer, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, case) = app
        .post(
            &format!("/api/reports/{report}/escalate"),
            &s.senior,
            json!({ "priority": "high" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{case}");
    let year = chrono::Utc::now().year();
    assert_eq!(case["case_number"], format!("AZ-{year}-0001"));
    assert_eq!(case["title"], "Übergabe am Hafen");
    assert_eq!(case["summary"], "Beobachtung");
    assert_eq!(case["status"], "open");
    assert_eq!(case["priority"], "high");
    assert_eq!(case["reporting_officer"]["id"], s.officer_id.as_str());
    assert_eq!(case["lead_investigator"]["id"], s.senior_id.as_str());
    assert_eq!(case["reports"][0]["id"], report.as_str());
    let case_id = case["id"].as_str().unwrap().to_string();

    // a report belongs to at most one case
    let (status, _) = app
        .post(&format!("/api/reports/{report}/escalate"), &s.senior, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let participant_uri = format!("/api/cases/{case_id}/participants/{}", s.junior_id);
    let (status, _) = app
        .put(&participant_uri, &s.officer, json!({ "role": "support" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .put(&participant_uri, &s.senior, json!({ "role": "support" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["participants"][0]["role"], "support");
    let (status, _) = app
        .put(
            &format!("/api/cases/{case_id}/participants/{}", s.senior_id),
            &s.senior,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let advance_uri = format!("/api/cases/{case_id}/advance");
    for expected in ["investigating", "in_review"] {
        let (status, body) = app.post(&advance_uri, &s.senior, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], expected);
    }

    let (status, _) = app.post(&advance_uri, &s.senior, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post(&advance_uri, &s.admin, json!({ "closing_note": "x" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, closed) = app.get(&format!("/api/cases/{case_id}"), &s.junior).await;
    assert_eq!(closed["status"], "closed");
    assert!(closed["closed_at"].is_string());

    let (status, _) = app.post(&advance_uri, &s.admin, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.delete(&participant_uri, &s.senior).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn link_and_unlink_reports() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let first = app.approved_report(&s.officer, &s.senior).await;
    let second = app.approved_report(&s.junior, &s.senior).await;

    let (status, case) = app
        .post(
            "/api/cases",
            &s.officer,
            json!({
                "title": "Ring Nordstadt",
                "lead_investigator_id": s.officer_id,
                "report_ids": [first]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{case}");
    let case_id = case["id"].as_str().unwrap().to_string();

    let link_uri = format!("/api/cases/{case_id}/reports/{second}");
    let (status, _) = app.post(&link_uri, &s.junior, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.post(&link_uri, &s.officer, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reports"].as_array().unwrap().len(), 2);

    let (_, list) = app.get("/api/cases?mine=true", &s.officer).await;
    assert_eq!(list[0]["report_count"], 2);

    let (status, body) = app.delete(&link_uri, &s.officer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reports"].as_array().unwrap().len(), 1);
    let (status, _) = app.delete(&link_uri, &s.officer).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // linked reports cannot be deleted
    let (status, _) = app.delete(&format!("/api/reports/{first}"), &s.admin).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn concurrent_link_and_return_leave_report_consistent() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let anchor = app.approved_report(&s.officer, &s.senior).await;
    let (status, case) = app
        .post(
            "/api/cases",
            &s.officer,
            json!({
                "title": "Ring Nordstadt",
                "lead_investigator_id": s.officer_id,
                "report_ids": [anchor]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{case}");
    let case_id = case["id"].as_str().unwrap().to_string();

    let report = app.report(&s.junior, "Kurierfahrt", "<p>Observation</p>").await;
    app.transition(&s.junior, &report, "submit", None).await;
    let (status, _) = app.transition(&s.senior, &report, "start_review", None).await;
    assert_eq!(status, StatusCode::OK);

    let link_uri = format!("/api/cases/{case_id}/reports/{report}");
    let ((link, _), (ret, _)) = tokio::join!(
        app.post(&link_uri, &s.officer, json!({})),
        app.transition(&s.senior, &report, "return", Some("Bitte Zeiten ergänzen")),
    );
    let ok = [link, ret].iter().filter(|s| **s == StatusCode::OK).count();
    assert_eq!(ok, 1, "link={link} return={ret}");
    for status in [link, ret] {
        assert!(
            [StatusCode::OK, StatusCode::CONFLICT, StatusCode::BAD_REQUEST].contains(&status),
            "{status}"
        );
    }

    let (_, body) = app.get(&format!("/api/reports/{report}"), &s.junior).await;
    if link == StatusCode::OK {
        assert_eq!(body["status"], "under_review");
        assert_eq!(body["case"]["id"], case_id.as_str());
    } else {
        assert_eq!(body["status"], "returned");
        assert_eq!(body["case"], Value::Null);
    }

    // sequentially, a linked report cannot be returned
    let other = app.report(&s.junior, "Zweite Fahrt", "<p>Observation</p>").await;
    app.transition(&s.junior, &other, "submit", None).await;
    app.transition(&s.senior, &other, "start_review", None).await;
    let (status, _) = app
        .post(&format!("/api/cases/{case_id}/reports/{other}"), &s.officer, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.transition(&s.senior, &other, "return", Some("Fehlt")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn concurrent_escalations_open_one_case() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let report = app.approved_report(&s.officer, &s.senior).await;

    let uri = format!("/api/reports/{report}/escalate");
    let ((first, _), (second, _)) = tokio::join!(
        app.post(&uri, &s.officer, json!({})),
        app.post(&uri, &s.senior, json!({})),
    );
    let created = [first, second]
        .iter()
        .filter(|s| **s == StatusCode::CREATED)
        .count();
    assert_eq!(created, 1, "first={first} second={second}");

    let (_, cases) = app.get("/api/cases", &s.admin).await;
    let cases = cases.as_array().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["report_count"], 1);

    let (_, log) = app.get("/api/activity?entity=case", &s.admin).await;
    assert_eq!(log["entries"].as_array().unwrap().len(), 1);
    assert_eq!(log["chain"]["valid"], true);
}

#[tokio::test]
async fn failed_link_rolls_back_new_case() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let report = app.approved_report(&s.officer, &s.senior).await;

    // the second link of the same report fails after the case row was written
    let (status, _) = app
        .post(
            "/api/cases",
            &s.officer,
            json!({
                "title": "Doppelt",
                "lead_investigator_id": s.officer_id,
                "report_ids": [report, report]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, cases) = app.get("/api/cases", &s.admin).await;
    assert_eq!(cases.as_array().unwrap().len(), 0);
    let (_, body) = app.get(&format!("/api/reports/{report}"), &s.officer).await;
    assert_eq!(body["case"], Value::Null);
    let (_, log) = app.get("/api/activity?entity=case", &s.admin).await;
    assert_eq!(log["entries"].as_array().unwrap().len(), 0);

    // the number was not consumed
    let (status, case) = app
        .post(&format!("/api/reports/{report}/escalate"), &s.officer, json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let year = chrono::Utc::now().year();
    assert_eq!(case["case_number"], format!("AZ-{year}-0001"));
}

#[tokio::test]
async fn foreign_drafts_cannot_be_escalated_or_seen() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let draft = app.report(&s.officer, "Entwurf", "<p>Notiz</p>").await;

    let (status, _) = app
        .post(&format!("/api/reports/{draft}/escalate"), &s.junior, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/api/reports/{draft}"), &s.junior).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inactive_user_cannot_lead_case() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    app.patch(
        &format!("/api/users/{}", s.junior_id),
        &s.admin,
        json!({ "active": false }),
    )
    .await;

    let (status, _) = app
        .post(
            "/api/cases",
            &s.officer,
            json!({ "title": "Test", "lead_investigator_id": s.junior_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================
// Confiscations, kompendium, dashboard
// ============================================================

#[tokio::test]
async fn confiscation_summary_is_cached_until_mutation() {
    let app = TestApp::new().await;
    let s = staff(&app).await;

    let (status, _) = app
        .post(
            "/api/confiscations",
            &s.officer,
            json!({ "drug_type": "other", "amount": 3, "unit": "piece" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for (amount, unit) in [(500.0, "gram"), (1.0, "kilogram")] {
        let (status, body) = app
            .post(
                "/api/confiscations",
                &s.officer,
                json!({ "drug_type": "cannabis", "amount": amount, "unit": unit, "location": "Lager" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (status, summary) = app.get("/api/confiscations/summary", &s.junior).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        summary,
        json!({
            "lines": [{ "drug_type": "cannabis", "unit_class": "mass", "total": 1500.0, "records": 2 }],
            "total_records": 2
        })
    );
    assert!(app.state.views.is_cached(View::ConfiscationSummary).await);

    let (status, pills) = app
        .post(
            "/api/confiscations",
            &s.junior,
            json!({ "drug_type": "mdma", "amount": 40, "unit": "piece" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!app.state.views.is_cached(View::ConfiscationSummary).await);

    let (_, summary) = app.get("/api/confiscations/summary", &s.junior).await;
    assert_eq!(summary["total_records"], 3);

    // only the recording officer or an admin may change a record
    let pills_uri = format!("/api/confiscations/{}", pills["id"].as_str().unwrap());
    let (status, _) = app.patch(&pills_uri, &s.officer, json!({ "amount": 41 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.patch(&pills_uri, &s.junior, json!({ "amount": 41 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"]["amount"], 41.0);
    let (status, _) = app.delete(&pills_uri, &s.admin).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = app.get("/api/confiscations?drug_type=cannabis", &s.junior).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn kompendium_is_admin_authored_and_grouped() {
    let app = TestApp::new().await;
    let s = staff(&app).await;

    let (status, _) = app
        .post(
            "/api/kompendium",
            &s.officer,
            json!({ "title": "BtMG §29", "category": "Recht" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for (title, category, position) in [
        ("Schnelltest", "Taktik", 0),
        ("BtMG §29", "Recht", 2),
        ("Anlage I", "  recht ", 1),
    ] {
        let (status, body) = app
            .post(
                "/api/kompendium",
                &s.admin,
                json!({ "title": title, "category": category, "position": position, "content": "<p>…</p>" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (status, index) = app.get("/api/kompendium", &s.officer).await;
    assert_eq!(status, StatusCode::OK);
    let groups: Vec<(String, Vec<String>)> = index
        .as_array()
        .unwrap()
        .iter()
        .map(|g| {
            (
                g["category"].as_str().unwrap().to_string(),
                g["docs"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|d| d["title"].as_str().unwrap().to_string())
                    .collect(),
            )
        })
        .collect();
    assert_eq!(
        groups,
        vec![
            (
                "Recht".to_string(),
                vec!["Anlage I".to_string(), "BtMG §29".to_string()]
            ),
            ("Taktik".to_string(), vec!["Schnelltest".to_string()]),
        ]
    );
    assert!(app.state.views.is_cached(View::Kompendium).await);

    let doc_id = index[1]["docs"][0]["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .patch(
            &format!("/api/kompendium/{doc_id}"),
            &s.admin,
            json!({ "category": "Einsatz" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.state.views.is_cached(View::Kompendium).await);

    let (_, index) = app.get("/api/kompendium", &s.officer).await;
    assert_eq!(index[0]["category"], "Einsatz");
}

#[tokio::test]
async fn dashboard_shows_queues() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    app.report(&s.officer, "Entwurf", "").await;
    let submitted = app.report(&s.officer, "Zur Prüfung", "<p>x</p>").await;
    app.transition(&s.officer, &submitted, "submit", None).await;

    let (status, officer) = app.get("/api/dashboard", &s.officer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(officer["my_drafts"].as_array().unwrap().len(), 1);
    assert_eq!(officer["awaiting_review"], json!([]));
    let counts = officer["overview"]["reports"].as_array().unwrap();
    assert_eq!(counts.len(), 5);
    assert_eq!(counts[0], json!({ "status": "draft", "count": 1 }));
    assert_eq!(counts[1], json!({ "status": "submitted", "count": 1 }));
    assert!(app.state.views.is_cached(View::Dashboard).await);

    let (_, senior) = app.get("/api/dashboard", &s.senior).await;
    assert_eq!(senior["awaiting_review"][0]["id"], submitted.as_str());

    app.transition(&s.senior, &submitted, "start_review", None).await;
    assert!(!app.state.views.is_cached(View::Dashboard).await);
}

// ============================================================
// Activity log
// ============================================================

#[tokio::test]
async fn activity_log_is_chained_and_admin_only() {
    let app = TestApp::new().await;
    let s = staff(&app).await;
    let report = app.report(&s.officer, "Protokolliert", "<p>x</p>").await;
    app.transition(&s.officer, &report, "submit", None).await;

    let (status, _) = app.get("/api/activity", &s.senior).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, log) = app.get("/api/activity", &s.admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log["chain"]["valid"], true);
    assert!(log["chain"]["broken_at"].is_null());

    let (_, filtered) = app
        .get(&format!("/api/activity?entity=report&entity_id={report}"), &s.admin)
        .await;
    let actions: Vec<&str> = filtered["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["submit", "create"]);

    // tampering with a stored row breaks verification
    sqlx::query("UPDATE activity_log SET details = 'edited' WHERE action = 'create'")
        .execute(&app.state.db)
        .await
        .unwrap();
    let (_, log) = app.get("/api/activity", &s.admin).await;
    assert_eq!(log["chain"]["valid"], false);
}
