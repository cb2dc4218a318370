//! Report handlers: CRUD, tactical map and lifecycle transitions

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use dossier_core::activity::Entity;
use dossier_core::report::{self, ReportAction, ReportContent, ReportStatus};
use dossier_core::roles::ensure;
use dossier_core::tactical_map::TacticalMap;
use sqlx::SqlitePool;

use crate::auth::CurrentUser;
use crate::cache::View;
use crate::db::{now, optional_user_ref, timestamp, user_ref};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{activity, non_blank};
use crate::models::{
    CaseRow, CreateReportRequest, EvidenceRow, MapWarnings, ReportDetail, ReportListQuery,
    ReportListRow, ReportRow, ReportSummary, TransitionRequest, UpdateReportRequest,
};
use crate::state::AppState;

/// Filters for report summaries; every `None` matches everything
#[derive(Debug, Default)]
pub(crate) struct ReportFilter<'a> {
    pub status: Option<ReportStatus>,
    pub author_id: Option<&'a str>,
    pub case_id: Option<&'a str>,
    pub exclude_author_id: Option<&'a str>,
    /// Drafts are only listed for their author and admins
    pub viewer_id: &'a str,
    pub viewer_is_admin: bool,
}

pub(crate) async fn list_summaries(
    db: &SqlitePool,
    filter: &ReportFilter<'_>,
) -> ApiResult<Vec<ReportSummary>> {
    let rows: Vec<ReportListRow> = sqlx::query_as(
        r#"
        SELECT r.id, r.title, r.narrative, r.location, r.incident_at, r.status, r.author_id,
               u.display_name AS author_name, u.rank AS author_rank, r.case_id,
               (SELECT COUNT(*) FROM evidence e WHERE e.report_id = r.id) AS evidence_count,
               r.updated_at
        FROM reports r
        JOIN users u ON u.id = r.author_id
        WHERE (?1 IS NULL OR r.status = ?1)
          AND (?2 IS NULL OR r.author_id = ?2)
          AND (?3 IS NULL OR r.case_id = ?3)
          AND (?4 IS NULL OR r.author_id != ?4)
          AND (r.status != 'draft' OR r.author_id = ?5 OR ?6)
        ORDER BY r.updated_at DESC
        "#,
    )
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.author_id)
    .bind(filter.case_id)
    .bind(filter.exclude_author_id)
    .bind(filter.viewer_id)
    .bind(filter.viewer_is_admin)
    .fetch_all(db)
    .await?;

    rows.iter().map(ReportListRow::to_summary).collect()
}

pub(crate) async fn fetch_report(db: &SqlitePool, id: &str) -> ApiResult<ReportRow> {
    let row: Option<ReportRow> = sqlx::query_as(
        r#"
        SELECT id, title, narrative, location, incident_at, status, author_id, reviewer_id,
               review_comment, case_id, map_json, created_at, updated_at, submitted_at, reviewed_at
        FROM reports
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.ok_or_else(|| ApiError::not_found("report", id))
}

/// Load a report the caller may see; other officers' drafts look missing
pub(crate) async fn fetch_visible_report(
    db: &SqlitePool,
    user: &CurrentUser,
    id: &str,
) -> ApiResult<ReportRow> {
    let row = fetch_report(db, id).await?;
    if row.status()? == ReportStatus::Draft && row.author_id != user.id && !user.actor().is_admin()
    {
        return Err(ApiError::not_found("report", id));
    }
    Ok(row)
}

pub(crate) async fn fetch_case_row(db: &SqlitePool, id: &str) -> ApiResult<Option<CaseRow>> {
    let row = sqlx::query_as(
        r#"
        SELECT id, case_number, title, summary, status, priority, reporting_officer_id,
               lead_investigator_id, closing_note, created_at, updated_at, closed_at
        FROM cases
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

async fn report_detail(db: &SqlitePool, row: ReportRow) -> ApiResult<ReportDetail> {
    let status = row.status()?;
    let map = row.map()?;

    let case = match row.case_id.as_deref() {
        Some(case_id) => match fetch_case_row(db, case_id).await? {
            Some(case) => Some(case.to_ref()?),
            None => None,
        },
        None => None,
    };

    let evidence: Vec<EvidenceRow> = sqlx::query_as(
        r#"
        SELECT id, report_id, kind, file_name, mime_type, size_bytes, sha256, caption,
               uploaded_by, created_at
        FROM evidence
        WHERE report_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(&row.id)
    .fetch_all(db)
    .await?;

    let confiscation_ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM confiscations WHERE report_id = ? ORDER BY seized_at")
            .bind(&row.id)
            .fetch_all(db)
            .await?;

    Ok(ReportDetail {
        author: user_ref(db, &row.author_id).await?,
        reviewer: optional_user_ref(db, row.reviewer_id.as_deref()).await?,
        map_warnings: MapWarnings {
            unlabelled_colors: map.unlabelled_colors(),
            unused_legend_colors: map.unused_legend_colors(),
        },
        evidence: evidence
            .iter()
            .map(EvidenceRow::to_meta)
            .collect::<ApiResult<Vec<_>>>()?,
        confiscation_ids,
        case,
        map,
        status,
        status_label: status.label().to_string(),
        id: row.id,
        title: row.title,
        narrative: row.narrative,
        location: row.location,
        incident_at: row.incident_at,
        review_comment: row.review_comment,
        created_at: row.created_at,
        updated_at: row.updated_at,
        submitted_at: row.submitted_at,
        reviewed_at: row.reviewed_at,
    })
}

fn map_json(map: &TacticalMap) -> ApiResult<String> {
    serde_json::to_string(map).map_err(|e| ApiError::Internal(e.into()))
}

/// List reports (excerpt view)
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ReportListQuery>,
) -> ApiResult<Json<Vec<ReportSummary>>> {
    let author_id = if query.mine {
        Some(user.id.as_str())
    } else {
        non_blank(query.author.as_deref())
    };

    let filter = ReportFilter {
        status: query.status,
        author_id,
        case_id: non_blank(query.case.as_deref()),
        exclude_author_id: None,
        viewer_id: &user.id,
        viewer_is_admin: user.actor().is_admin(),
    };

    Ok(Json(list_summaries(&state.db, &filter).await?))
}

pub async fn create_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateReportRequest>,
) -> ApiResult<(StatusCode, Json<ReportDetail>)> {
    let content = ReportContent::new(&req.title, &req.narrative, req.location.as_deref())?;
    let map = req.map.unwrap_or_default().validated()?;

    let id = uuid::Uuid::new_v4().to_string();
    let ts = now();

    sqlx::query(
        r#"
        INSERT INTO reports (id, title, narrative, location, incident_at, status, author_id,
                             map_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&content.title)
    .bind(&content.narrative)
    .bind(&content.location)
    .bind(req.incident_at.map(timestamp))
    .bind(ReportStatus::Draft.as_str())
    .bind(&user.id)
    .bind(map_json(&map)?)
    .bind(&ts)
    .bind(&ts)
    .execute(&state.db)
    .await?;

    state.views.invalidate(&[View::Dashboard]).await;
    activity::record(
        &state,
        &user.id,
        Entity::Report,
        &id,
        "create",
        Some(content.title.clone()),
    )
    .await?;
    tracing::info!(report_id = %id, "Created report");

    let row = fetch_report(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(report_detail(&state.db, row).await?)))
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ReportDetail>> {
    let row = fetch_visible_report(&state.db, &user, &id).await?;
    Ok(Json(report_detail(&state.db, row).await?))
}

pub async fn update_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateReportRequest>,
) -> ApiResult<Json<ReportDetail>> {
    let row = fetch_visible_report(&state.db, &user, &id).await?;
    let status = row.status()?;
    ensure(
        user.actor().can_edit_report(&row.author_id, status.is_editable()),
        "edit this report",
    )?;

    let location = match req.location.as_deref() {
        Some(loc) => non_blank(Some(loc)),
        None => row.location.as_deref(),
    };
    let content = ReportContent::new(
        req.title.as_deref().unwrap_or(&row.title),
        req.narrative.as_deref().unwrap_or(&row.narrative),
        location,
    )?;
    let incident_at = req.incident_at.or(row.incident_at);

    sqlx::query(
        r#"
        UPDATE reports
        SET title = ?, narrative = ?, location = ?, incident_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&content.title)
    .bind(&content.narrative)
    .bind(&content.location)
    .bind(incident_at.map(timestamp))
    .bind(now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    activity::record(&state, &user.id, Entity::Report, &id, "update", None).await?;

    let row = fetch_report(&state.db, &id).await?;
    Ok(Json(report_detail(&state.db, row).await?))
}

pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let row = fetch_visible_report(&state.db, &user, &id).await?;
    let status = row.status()?;
    ensure(
        user.actor()
            .can_delete_report(&row.author_id, status == ReportStatus::Draft),
        "delete this report",
    )?;
    if row.case_id.is_some() {
        return Err(ApiError::Conflict(
            "Report is linked to a case; unlink it first".into(),
        ));
    }

    let result = sqlx::query("DELETE FROM reports WHERE id = ? AND case_id IS NULL")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(
            "Report was linked to a case concurrently; unlink it first".into(),
        ));
    }

    state.views.invalidate(&[View::Dashboard]).await;
    activity::record(
        &state,
        &user.id,
        Entity::Report,
        &id,
        "delete",
        Some(row.title),
    )
    .await?;
    tracing::info!(report_id = %id, "Deleted report");

    Ok(StatusCode::NO_CONTENT)
}

/// Replace the tactical map as a whole
pub async fn put_map(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(map): Json<TacticalMap>,
) -> ApiResult<Json<ReportDetail>> {
    let row = fetch_visible_report(&state.db, &user, &id).await?;
    ensure(
        user.actor()
            .can_edit_report(&row.author_id, row.status()?.is_editable()),
        "edit this report",
    )?;

    let map = map.validated()?;
    let elements = map.markers.len() + map.shapes.len();

    sqlx::query("UPDATE reports SET map_json = ?, updated_at = ? WHERE id = ?")
        .bind(map_json(&map)?)
        .bind(now())
        .bind(&id)
        .execute(&state.db)
        .await?;

    activity::record(
        &state,
        &user.id,
        Entity::Report,
        &id,
        "update_map",
        Some(format!("{elements} element(s)")),
    )
    .await?;

    let row = fetch_report(&state.db, &id).await?;
    Ok(Json(report_detail(&state.db, row).await?))
}

/// Move a report through its lifecycle
pub async fn transition_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<ReportDetail>> {
    let row = fetch_visible_report(&state.db, &user, &id).await?;
    let current = row.status()?;
    let actor = user.actor();

    if req.action.is_review_action() {
        ensure(actor.can_review_report(&row.author_id), "review this report")?;
    } else {
        ensure(row.author_id == user.id, "submit or withdraw this report")?;
    }

    let (next, comment) = report::plan_transition(
        current,
        &report::TransitionRequest {
            action: req.action,
            narrative: &row.narrative,
            comment: req.comment.as_deref(),
        },
    )?;

    if req.action == ReportAction::Return {
        if let Some(case_id) = row.case_id.as_deref() {
            return Err(ApiError::Conflict(format!(
                "Report is linked to case {case_id}; unlink it before returning"
            )));
        }
    }

    let ts = now();
    let mut reviewer_id = row.reviewer_id.clone();
    let mut review_comment = row.review_comment.clone();
    let mut submitted_at = row.submitted_at.map(timestamp);
    let mut reviewed_at = row.reviewed_at.map(timestamp);

    match req.action {
        ReportAction::Submit => submitted_at = Some(ts.clone()),
        ReportAction::Withdraw => submitted_at = None,
        ReportAction::StartReview => reviewer_id = Some(user.id.clone()),
        ReportAction::Approve | ReportAction::Return => {
            reviewer_id = Some(user.id.clone());
            review_comment = comment.clone();
            reviewed_at = Some(ts.clone());
        }
    }

    let log_guard = state.activity_lock.lock().await;
    let mut tx = state.db.begin().await?;
    // a returned report must not stay linked to a case
    let result = sqlx::query(
        r#"
        UPDATE reports
        SET status = ?, reviewer_id = ?, review_comment = ?, submitted_at = ?, reviewed_at = ?,
            updated_at = ?
        WHERE id = ? AND status = ? AND (? = 0 OR case_id IS NULL)
        "#,
    )
    .bind(next.as_str())
    .bind(&reviewer_id)
    .bind(&review_comment)
    .bind(&submitted_at)
    .bind(&reviewed_at)
    .bind(&ts)
    .bind(&id)
    .bind(current.as_str())
    .bind(req.action == ReportAction::Return)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(
            "Report changed concurrently, reload and retry".into(),
        ));
    }
    activity::append(
        &mut tx,
        &user.id,
        Entity::Report,
        &id,
        req.action.as_str(),
        Some(match comment {
            Some(c) => format!("{current} -> {next}: {c}"),
            None => format!("{current} -> {next}"),
        }),
    )
    .await?;
    tx.commit().await?;
    drop(log_guard);

    state.views.invalidate(&[View::Dashboard]).await;
    tracing::info!(report_id = %id, from = %current, to = %next, "Report transition");

    let row = fetch_report(&state.db, &id).await?;
    Ok(Json(report_detail(&state.db, row).await?))
}
