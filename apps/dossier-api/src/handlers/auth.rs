//! Login, logout and password change

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use dossier_core::activity::Entity;

use crate::auth::{self, password, session, CurrentUser};
use crate::db::{fetch_user, now};
use crate::error::{ApiError, ApiResult};
use crate::handlers::activity;
use crate::models::{ChangePasswordRequest, LoginRequest, LoginResponse, UserPublic, UserRow};
use crate::state::AppState;

const LOGIN_FAILED: &str = "Invalid username or password";

/// Exchange credentials for a session
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user: Option<UserRow> = sqlx::query_as(
        r#"
        SELECT id, username, display_name, badge_number, password_hash, rank, system_role,
               active, created_at, updated_at, last_login_at
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(req.username.trim().to_lowercase())
    .fetch_optional(&state.db)
    .await?;

    let Some(mut user) = user else {
        auth::reject_unknown_user(req.password).await?;
        tracing::info!("Login failed for unknown user");
        return Err(ApiError::Unauthorized(LOGIN_FAILED.into()));
    };

    let verified =
        auth::verify_password_blocking(req.password, user.password_hash.clone()).await?;
    if !verified || !user.active {
        tracing::info!(user_id = %user.id, "Login rejected");
        return Err(ApiError::Unauthorized(LOGIN_FAILED.into()));
    }

    let ttl = state.settings.session_ttl;
    let token = session::create_session(&state.db, &user.id, ttl).await?;

    let login_at = Utc::now();
    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(crate::db::timestamp(login_at))
        .bind(&user.id)
        .execute(&state.db)
        .await?;
    user.last_login_at = Some(login_at);

    activity::record(&state, &user.id, Entity::Session, &user.id, "login", None).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    let cookie = session::session_cookie(&token, ttl, state.settings.cookie_secure);
    let body = LoginResponse {
        token,
        expires_at: login_at + ttl,
        user: user.to_public()?,
    };

    Ok(([(header::SET_COOKIE, cookie)], Json(body)))
}

/// End the current session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    session::delete_session(&state.db, &user.token_hash).await?;
    activity::record(&state, &user.id, Entity::Session, &user.id, "logout", None).await?;
    tracing::info!(user = %user.username, "User logged out");

    let cookie = session::clear_cookie(state.settings.cookie_secure);
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<UserPublic>> {
    let row = fetch_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("user", &user.id))?;
    Ok(Json(row.to_public()?))
}

/// Change the caller's password and revoke their other sessions
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let row = fetch_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("user", &user.id))?;

    if !auth::verify_password_blocking(req.current_password, row.password_hash).await? {
        return Err(ApiError::InvalidRequest(
            "Current password is incorrect".into(),
        ));
    }
    password::validate_password_strength(&req.new_password).map_err(ApiError::InvalidRequest)?;

    let hash = auth::hash_password_blocking(req.new_password).await?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&hash)
        .bind(now())
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    let revoked = session::delete_user_sessions(&state.db, &user.id, Some(&user.token_hash)).await?;
    activity::record(
        &state,
        &user.id,
        Entity::User,
        &user.id,
        "change_password",
        Some(format!("revoked {revoked} other session(s)")),
    )
    .await?;
    tracing::info!(user_id = %user.id, revoked, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}
