//! Drug seizure records and their statistics

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use dossier_core::activity::Entity;
use dossier_core::confiscation::{summarize, ConfiscationInput, Quantity};
use dossier_core::roles::ensure;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::auth::CurrentUser;
use crate::cache::View;
use crate::db::{now, timestamp};
use crate::error::{ApiError, ApiResult};
use crate::handlers::activity;
use crate::handlers::non_blank;
use crate::handlers::reports::fetch_visible_report;
use crate::models::{
    ConfiscationListQuery, ConfiscationResponse, ConfiscationRow, ConfiscationSummary,
    CreateConfiscationRequest, UpdateConfiscationRequest,
};
use crate::state::AppState;

const SELECT_CONFISCATIONS: &str = r#"
    SELECT id, drug_type, description, amount, unit, location, seized_at, report_id,
           recorded_by, notes, created_at, updated_at
    FROM confiscations
"#;

async fn fetch_confiscation(db: &SqlitePool, id: &str) -> ApiResult<ConfiscationRow> {
    let row: Option<ConfiscationRow> =
        sqlx::query_as(&format!("{SELECT_CONFISCATIONS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(db)
            .await?;
    row.ok_or_else(|| ApiError::not_found("confiscation", id))
}

/// Totals over every record
pub(crate) async fn render_summary(db: &SqlitePool) -> ApiResult<ConfiscationSummary> {
    let rows: Vec<ConfiscationRow> = sqlx::query_as(SELECT_CONFISCATIONS).fetch_all(db).await?;

    let items = rows
        .iter()
        .map(|row| Ok((row.drug_type()?, row.quantity()?)))
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(ConfiscationSummary {
        lines: summarize(items.iter().map(|(drug, qty)| (*drug, qty))),
        total_records: rows.len() as u32,
    })
}

async fn invalidate(state: &AppState) {
    state
        .views
        .invalidate(&[View::ConfiscationSummary, View::Dashboard])
        .await;
}

pub async fn list_confiscations(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Query(query): Query<ConfiscationListQuery>,
) -> ApiResult<Json<Vec<ConfiscationResponse>>> {
    let rows: Vec<ConfiscationRow> = sqlx::query_as(&format!(
        "{SELECT_CONFISCATIONS} WHERE (?1 IS NULL OR drug_type = ?1) AND (?2 IS NULL OR report_id = ?2) ORDER BY seized_at DESC"
    ))
    .bind(query.drug_type.map(|d| d.as_str()))
    .bind(non_blank(query.report.as_deref()))
    .fetch_all(&state.db)
    .await?;

    let items = rows
        .iter()
        .map(ConfiscationRow::to_response)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(items))
}

pub async fn create_confiscation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateConfiscationRequest>,
) -> ApiResult<(StatusCode, Json<ConfiscationResponse>)> {
    let input = ConfiscationInput::new(
        req.drug_type,
        req.description.as_deref(),
        Quantity::new(req.amount, req.unit)?,
        req.location.as_deref(),
        req.notes.as_deref(),
    )?;

    let report_id = non_blank(req.report_id.as_deref());
    if let Some(report_id) = report_id {
        fetch_visible_report(&state.db, &user, report_id).await?;
    }

    let id = uuid::Uuid::new_v4().to_string();
    let ts = now();

    sqlx::query(
        r#"
        INSERT INTO confiscations (id, drug_type, description, amount, unit, location, seized_at,
                                   report_id, recorded_by, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(input.drug_type.as_str())
    .bind(&input.description)
    .bind(input.quantity.amount)
    .bind(input.quantity.unit.as_str())
    .bind(&input.location)
    .bind(timestamp(req.seized_at.unwrap_or_else(Utc::now)))
    .bind(report_id)
    .bind(&user.id)
    .bind(&input.notes)
    .bind(&ts)
    .bind(&ts)
    .execute(&state.db)
    .await?;

    invalidate(&state).await;
    activity::record(
        &state,
        &user.id,
        Entity::Confiscation,
        &id,
        "create",
        Some(format!(
            "{} {} {}",
            input.quantity.amount, input.quantity.unit, input.drug_type
        )),
    )
    .await?;
    tracing::info!(confiscation_id = %id, "Recorded confiscation");

    let row = fetch_confiscation(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(row.to_response()?)))
}

pub async fn get_confiscation(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ConfiscationResponse>> {
    let row = fetch_confiscation(&state.db, &id).await?;
    Ok(Json(row.to_response()?))
}

pub async fn update_confiscation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateConfiscationRequest>,
) -> ApiResult<Json<ConfiscationResponse>> {
    let row = fetch_confiscation(&state.db, &id).await?;
    ensure(
        user.actor().can_edit_confiscation(&row.recorded_by),
        "edit this confiscation",
    )?;

    let current = row.quantity()?;
    let quantity = Quantity::new(
        req.amount.unwrap_or(current.amount),
        req.unit.unwrap_or(current.unit),
    )?;
    let input = ConfiscationInput::new(
        req.drug_type.unwrap_or(row.drug_type()?),
        req.description.as_deref().or(row.description.as_deref()),
        quantity,
        req.location.as_deref().or(row.location.as_deref()),
        req.notes.as_deref().or(row.notes.as_deref()),
    )?;

    let report_id = match req.report_id.as_deref() {
        Some(new_report) => match non_blank(Some(new_report)) {
            Some(report_id) => {
                fetch_visible_report(&state.db, &user, report_id).await?;
                Some(report_id.to_string())
            }
            None => None,
        },
        None => row.report_id.clone(),
    };
    let seized_at = req.seized_at.unwrap_or(row.seized_at);

    sqlx::query(
        r#"
        UPDATE confiscations
        SET drug_type = ?, description = ?, amount = ?, unit = ?, location = ?, seized_at = ?,
            report_id = ?, notes = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(input.drug_type.as_str())
    .bind(&input.description)
    .bind(input.quantity.amount)
    .bind(input.quantity.unit.as_str())
    .bind(&input.location)
    .bind(timestamp(seized_at))
    .bind(&report_id)
    .bind(&input.notes)
    .bind(now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    invalidate(&state).await;
    activity::record(&state, &user.id, Entity::Confiscation, &id, "update", None).await?;

    let row = fetch_confiscation(&state.db, &id).await?;
    Ok(Json(row.to_response()?))
}

pub async fn delete_confiscation(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let row = fetch_confiscation(&state.db, &id).await?;
    ensure(
        user.actor().can_edit_confiscation(&row.recorded_by),
        "delete this confiscation",
    )?;

    sqlx::query("DELETE FROM confiscations WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    invalidate(&state).await;
    activity::record(&state, &user.id, Entity::Confiscation, &id, "delete", None).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Seizure totals per drug type and unit class (cached)
pub async fn confiscation_summary(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> ApiResult<Json<Value>> {
    let view = state
        .views
        .get_or_render(View::ConfiscationSummary, || async {
            let summary = render_summary(&state.db).await?;
            serde_json::to_value(summary).map_err(|e| ApiError::Internal(e.into()))
        })
        .await?;
    Ok(Json(view.as_ref().clone()))
}
