//! Photo and video evidence attached to reports

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dossier_core::activity::Entity;
use dossier_core::evidence::check_upload;
use dossier_core::roles::ensure;
use sqlx::SqlitePool;

use crate::auth::CurrentUser;
use crate::db::now;
use crate::error::{ApiError, ApiResult};
use crate::handlers::activity;
use crate::handlers::reports::fetch_visible_report;
use crate::models::{EvidenceMeta, EvidenceRow, UploadEvidenceRequest};
use crate::state::AppState;

async fn fetch_evidence(db: &SqlitePool, id: &str) -> ApiResult<EvidenceRow> {
    let row: Option<EvidenceRow> = sqlx::query_as(
        r#"
        SELECT id, report_id, kind, file_name, mime_type, size_bytes, sha256, caption,
               uploaded_by, created_at
        FROM evidence
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.ok_or_else(|| ApiError::not_found("evidence", id))
}

/// Attach a file to an editable report
pub async fn upload_evidence(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(report_id): Path<String>,
    Json(req): Json<UploadEvidenceRequest>,
) -> ApiResult<(StatusCode, Json<EvidenceMeta>)> {
    let report = fetch_visible_report(&state.db, &user, &report_id).await?;
    let status = report.status()?;
    ensure(
        user.actor().can_edit_report(&report.author_id, status.is_editable()),
        "add evidence to this report",
    )?;
    if !status.is_editable() {
        return Err(ApiError::Conflict(format!(
            "Evidence can only be changed while the report is editable, it is {status}"
        )));
    }

    let data = BASE64
        .decode(req.data_base64.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid file base64: {}", e)))?;

    let checked = check_upload(
        &req.file_name,
        &req.mime_type,
        req.caption.as_deref(),
        &data,
        state.settings.max_upload_bytes,
    )?;

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO evidence (id, report_id, kind, file_name, mime_type, size_bytes, sha256,
                              caption, data, uploaded_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&report_id)
    .bind(checked.kind.as_str())
    .bind(&checked.file_name)
    .bind(&checked.mime_type)
    .bind(data.len() as i64)
    .bind(&checked.sha256)
    .bind(&checked.caption)
    .bind(&data)
    .bind(&user.id)
    .bind(now())
    .execute(&state.db)
    .await?;

    activity::record(
        &state,
        &user.id,
        Entity::Evidence,
        &id,
        "upload",
        Some(format!("{} ({}) sha256={}", checked.file_name, report_id, checked.sha256)),
    )
    .await?;
    tracing::info!(evidence_id = %id, report_id = %report_id, bytes = data.len(), "Evidence uploaded");

    let row = fetch_evidence(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(row.to_meta()?)))
}

pub async fn get_evidence(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<EvidenceMeta>> {
    let row = fetch_evidence(&state.db, &id).await?;
    fetch_visible_report(&state.db, &user, &row.report_id).await?;
    Ok(Json(row.to_meta()?))
}

/// Download the stored bytes
pub async fn get_evidence_content(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, [(header::HeaderName, String); 2], Vec<u8>)> {
    let row = fetch_evidence(&state.db, &id).await?;
    fetch_visible_report(&state.db, &user, &row.report_id).await?;

    let (data,): (Vec<u8>,) = sqlx::query_as("SELECT data FROM evidence WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, row.mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", row.file_name),
            ),
        ],
        data,
    ))
}

pub async fn delete_evidence(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let row = fetch_evidence(&state.db, &id).await?;
    let report = fetch_visible_report(&state.db, &user, &row.report_id).await?;
    let status = report.status()?;
    ensure(
        user.actor().can_edit_report(&report.author_id, status.is_editable()),
        "remove evidence from this report",
    )?;
    if !status.is_editable() {
        return Err(ApiError::Conflict(format!(
            "Evidence can only be changed while the report is editable, it is {status}"
        )));
    }

    sqlx::query("DELETE FROM evidence WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    activity::record(
        &state,
        &user.id,
        Entity::Evidence,
        &id,
        "delete",
        Some(format!("{} ({})", row.file_name, row.report_id)),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
