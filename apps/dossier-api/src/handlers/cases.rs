//! Case handlers: escalation, lifecycle, participants and linked reports

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, Utc};
use dossier_core::activity::Entity;
use dossier_core::case::{
    check_participant, check_report_link, CaseContent, CaseNumber, CasePriority, CaseStatus,
};
use dossier_core::report::ReportStatus;
use dossier_core::roles::ensure;
use dossier_core::text;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::auth::CurrentUser;
use crate::cache::View;
use crate::db::{now, parse_column, require_active_user, user_ref};
use crate::error::{ApiError, ApiResult};
use crate::handlers::activity;
use crate::handlers::reports::{
    fetch_case_row, fetch_report, fetch_visible_report, list_summaries, ReportFilter,
};
use crate::models::{
    AdvanceCaseRequest, CaseDetail, CaseListQuery, CaseListRow, CaseRow, CaseSummary,
    CreateCaseRequest, EscalateRequest, ParticipantRequest, ParticipantRow, ReportRow,
    UpdateCaseRequest,
};
use crate::state::AppState;

/// Summary length taken from a report narrative on escalation
const ESCALATION_SUMMARY_CHARS: usize = 2_000;
const CASE_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Default)]
pub(crate) struct CaseFilter<'a> {
    pub status: Option<CaseStatus>,
    /// Lead investigator, reporting officer or participant
    pub member_id: Option<&'a str>,
    pub open_only: bool,
}

pub(crate) async fn list_case_summaries(
    db: &SqlitePool,
    filter: &CaseFilter<'_>,
) -> ApiResult<Vec<CaseSummary>> {
    let rows: Vec<CaseListRow> = sqlx::query_as(
        r#"
        SELECT c.id, c.case_number, c.title, c.status, c.priority, c.lead_investigator_id,
               u.display_name AS lead_name, u.rank AS lead_rank,
               (SELECT COUNT(*) FROM reports r WHERE r.case_id = c.id) AS report_count,
               c.updated_at
        FROM cases c
        JOIN users u ON u.id = c.lead_investigator_id
        WHERE (?1 IS NULL OR c.status = ?1)
          AND (?2 IS NULL
               OR c.lead_investigator_id = ?2
               OR c.reporting_officer_id = ?2
               OR EXISTS (SELECT 1 FROM case_participants p
                          WHERE p.case_id = c.id AND p.user_id = ?2))
          AND (?3 = 0 OR c.status != 'closed')
        ORDER BY c.updated_at DESC
        "#,
    )
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.member_id)
    .bind(filter.open_only)
    .fetch_all(db)
    .await?;

    rows.iter().map(CaseListRow::to_summary).collect()
}

async fn fetch_case(db: &SqlitePool, id: &str) -> ApiResult<CaseRow> {
    fetch_case_row(db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("case", id))
}

async fn case_detail(db: &SqlitePool, user: &CurrentUser, row: CaseRow) -> ApiResult<CaseDetail> {
    let participants: Vec<ParticipantRow> = sqlx::query_as(
        r#"
        SELECT p.user_id, u.display_name, u.rank, p.role, p.added_at
        FROM case_participants p
        JOIN users u ON u.id = p.user_id
        WHERE p.case_id = ?
        ORDER BY p.added_at
        "#,
    )
    .bind(&row.id)
    .fetch_all(db)
    .await?;

    let reports = list_summaries(
        db,
        &ReportFilter {
            case_id: Some(&row.id),
            viewer_id: &user.id,
            viewer_is_admin: user.actor().is_admin(),
            ..Default::default()
        },
    )
    .await?;

    let status = row.status()?;
    Ok(CaseDetail {
        case_number: parse_column("case_number", &row.case_number)?,
        status,
        status_label: status.label().to_string(),
        priority: parse_column("priority", &row.priority)?,
        reporting_officer: user_ref(db, &row.reporting_officer_id).await?,
        lead_investigator: user_ref(db, &row.lead_investigator_id).await?,
        participants: participants
            .iter()
            .map(ParticipantRow::to_participant)
            .collect::<ApiResult<Vec<_>>>()?,
        reports,
        id: row.id,
        title: row.title,
        summary: row.summary,
        closing_note: row.closing_note,
        created_at: row.created_at,
        updated_at: row.updated_at,
        closed_at: row.closed_at,
    })
}

struct NewCase<'a> {
    content: CaseContent,
    priority: CasePriority,
    reporting_officer_id: &'a str,
    lead_investigator_id: &'a str,
}

/// Insert a case under the next free number of the current year
async fn insert_case(
    conn: &mut SqliteConnection,
    new: &NewCase<'_>,
) -> ApiResult<(String, CaseNumber)> {
    let id = uuid::Uuid::new_v4().to_string();
    let year = Utc::now().year();

    for _ in 0..CASE_NUMBER_ATTEMPTS {
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT case_number FROM cases WHERE case_number LIKE ?")
                .bind(format!("{}-{}-%", CaseNumber::PREFIX, year))
                .fetch_all(&mut *conn)
                .await?;
        let number = CaseNumber::next_in_year(year, existing.iter().map(String::as_str));
        let ts = now();

        let result = sqlx::query(
            r#"
            INSERT INTO cases (id, case_number, title, summary, status, priority,
                               reporting_officer_id, lead_investigator_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(number.to_string())
        .bind(&new.content.title)
        .bind(&new.content.summary)
        .bind(CaseStatus::Open.as_str())
        .bind(new.priority.as_str())
        .bind(new.reporting_officer_id)
        .bind(new.lead_investigator_id)
        .bind(&ts)
        .bind(&ts)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => return Ok((id, number)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::warn!("Case number {} taken concurrently, retrying", number);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Conflict(
        "Could not allocate a case number, please retry".into(),
    ))
}

/// Link a report that is still unlinked and linkable at write time
async fn attach_report(
    conn: &mut SqliteConnection,
    report_id: &str,
    case_id: &str,
) -> ApiResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE reports
        SET case_id = ?, updated_at = ?
        WHERE id = ? AND case_id IS NULL AND status IN (?, ?)
        "#,
    )
    .bind(case_id)
    .bind(now())
    .bind(report_id)
    .bind(ReportStatus::UnderReview.as_str())
    .bind(ReportStatus::Approved.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(format!(
            "Report {report_id} changed concurrently and can no longer be linked"
        )));
    }
    Ok(())
}

async fn detach_report(
    conn: &mut SqliteConnection,
    report_id: &str,
    case_id: &str,
) -> ApiResult<()> {
    let result =
        sqlx::query("UPDATE reports SET case_id = NULL, updated_at = ? WHERE id = ? AND case_id = ?")
            .bind(now())
            .bind(report_id)
            .bind(case_id)
            .execute(&mut *conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(format!(
            "Report {report_id} is no longer linked to this case"
        )));
    }
    Ok(())
}

async fn touch_case<'e, E>(db: E, case_id: &str) -> ApiResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE cases SET updated_at = ? WHERE id = ?")
        .bind(now())
        .bind(case_id)
        .execute(db)
        .await?;
    Ok(())
}

fn check_link(report: &ReportRow, case_id: &str) -> ApiResult<()> {
    check_report_link(report.status()?, report.case_id.as_deref(), case_id)?;
    Ok(())
}

/// Load a case the caller may manage and that still accepts changes
async fn manageable_case(
    db: &SqlitePool,
    user: &CurrentUser,
    id: &str,
    operation: &str,
) -> ApiResult<CaseRow> {
    let row = fetch_case(db, id).await?;
    ensure(user.actor().can_manage_case(&row.lead_investigator_id), operation)?;
    row.status()?.ensure_mutable()?;
    Ok(row)
}

pub async fn list_cases(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<CaseListQuery>,
) -> ApiResult<Json<Vec<CaseSummary>>> {
    let filter = CaseFilter {
        status: query.status,
        member_id: query.mine.then_some(user.id.as_str()),
        open_only: false,
    };
    Ok(Json(list_case_summaries(&state.db, &filter).await?))
}

pub async fn create_case(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateCaseRequest>,
) -> ApiResult<(StatusCode, Json<CaseDetail>)> {
    let content = CaseContent::new(&req.title, &req.summary)?;
    require_active_user(&state.db, &req.lead_investigator_id).await?;

    let mut reports = Vec::with_capacity(req.report_ids.len());
    for report_id in &req.report_ids {
        let report = fetch_report(&state.db, report_id).await?;
        check_link(&report, "")?;
        reports.push(report);
    }

    let log_guard = state.activity_lock.lock().await;
    let mut tx = state.db.begin().await?;
    let (id, number) = insert_case(
        &mut tx,
        &NewCase {
            content,
            priority: req.priority,
            reporting_officer_id: &user.id,
            lead_investigator_id: &req.lead_investigator_id,
        },
    )
    .await?;
    for report in &reports {
        attach_report(&mut tx, &report.id, &id).await?;
    }
    activity::append(
        &mut tx,
        &user.id,
        Entity::Case,
        &id,
        "create",
        Some(format!("{number} with {} report(s)", reports.len())),
    )
    .await?;
    tx.commit().await?;
    drop(log_guard);

    state.views.invalidate(&[View::Dashboard]).await;
    tracing::info!(case_id = %id, "Opened case {}", number);

    let row = fetch_case(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(case_detail(&state.db, &user, row).await?)))
}

/// Open a case from a report, pre-filled from it
pub async fn escalate_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(report_id): Path<String>,
    Json(req): Json<EscalateRequest>,
) -> ApiResult<(StatusCode, Json<CaseDetail>)> {
    let report = fetch_visible_report(&state.db, &user, &report_id).await?;
    let actor = user.actor();
    ensure(
        report.author_id == user.id || actor.can_review_report(&report.author_id),
        "escalate this report",
    )?;
    check_link(&report, "")?;

    let lead_investigator_id = req
        .lead_investigator_id
        .clone()
        .unwrap_or_else(|| user.id.clone());
    require_active_user(&state.db, &lead_investigator_id).await?;

    let title = req.title.as_deref().unwrap_or(&report.title);
    let summary = text::narrative_excerpt(&report.narrative, ESCALATION_SUMMARY_CHARS);
    let content = CaseContent::new(title, &summary)?;

    let log_guard = state.activity_lock.lock().await;
    let mut tx = state.db.begin().await?;
    let (id, number) = insert_case(
        &mut tx,
        &NewCase {
            content,
            priority: req.priority.unwrap_or_default(),
            reporting_officer_id: &report.author_id,
            lead_investigator_id: &lead_investigator_id,
        },
    )
    .await?;
    attach_report(&mut tx, &report_id, &id).await?;
    activity::append(
        &mut tx,
        &user.id,
        Entity::Case,
        &id,
        "escalate",
        Some(format!("{number} from report {report_id}")),
    )
    .await?;
    tx.commit().await?;
    drop(log_guard);

    state.views.invalidate(&[View::Dashboard]).await;
    tracing::info!(case_id = %id, report_id = %report_id, "Escalated report to case {}", number);

    let row = fetch_case(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(case_detail(&state.db, &user, row).await?)))
}

pub async fn get_case(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<CaseDetail>> {
    let row = fetch_case(&state.db, &id).await?;
    Ok(Json(case_detail(&state.db, &user, row).await?))
}

pub async fn update_case(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateCaseRequest>,
) -> ApiResult<Json<CaseDetail>> {
    let row = manageable_case(&state.db, &user, &id, "edit this case").await?;

    let content = CaseContent::new(
        req.title.as_deref().unwrap_or(&row.title),
        req.summary.as_deref().unwrap_or(&row.summary),
    )?;
    let priority = match req.priority {
        Some(p) => p,
        None => parse_column("priority", &row.priority)?,
    };

    let lead_investigator_id = match req.lead_investigator_id.as_deref() {
        Some(new_lead) if new_lead != row.lead_investigator_id => {
            require_active_user(&state.db, new_lead).await?;
            // the new lead is no longer a separate participant
            sqlx::query("DELETE FROM case_participants WHERE case_id = ? AND user_id = ?")
                .bind(&id)
                .bind(new_lead)
                .execute(&state.db)
                .await?;
            new_lead.to_string()
        }
        _ => row.lead_investigator_id.clone(),
    };

    sqlx::query(
        r#"
        UPDATE cases
        SET title = ?, summary = ?, priority = ?, lead_investigator_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&content.title)
    .bind(&content.summary)
    .bind(priority.as_str())
    .bind(&lead_investigator_id)
    .bind(now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let details = (lead_investigator_id != row.lead_investigator_id)
        .then(|| format!("lead investigator -> {lead_investigator_id}"));
    activity::record(&state, &user.id, Entity::Case, &id, "update", details).await?;

    let row = fetch_case(&state.db, &id).await?;
    Ok(Json(case_detail(&state.db, &user, row).await?))
}

/// Move the case one step along its lifecycle
pub async fn advance_case(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<AdvanceCaseRequest>,
) -> ApiResult<Json<CaseDetail>> {
    let row = fetch_case(&state.db, &id).await?;
    let current = row.status()?;
    let actor = user.actor();

    if current.next() == Some(CaseStatus::Closed) {
        ensure(actor.can_close_case(&row.lead_investigator_id), "close this case")?;
    } else {
        ensure(actor.can_manage_case(&row.lead_investigator_id), "advance this case")?;
    }

    let (next, closing_note) = current.advance(req.closing_note.as_deref())?;
    let ts = now();
    let closed_at = next.is_closed().then(|| ts.clone());

    sqlx::query(
        r#"
        UPDATE cases
        SET status = ?, closing_note = COALESCE(?, closing_note), closed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(next.as_str())
    .bind(&closing_note)
    .bind(&closed_at)
    .bind(&ts)
    .bind(&id)
    .execute(&state.db)
    .await?;

    state.views.invalidate(&[View::Dashboard]).await;
    activity::record(
        &state,
        &user.id,
        Entity::Case,
        &id,
        "advance",
        Some(format!("{current} -> {next}")),
    )
    .await?;
    tracing::info!(case_id = %id, from = %current, to = %next, "Case advanced");

    let row = fetch_case(&state.db, &id).await?;
    Ok(Json(case_detail(&state.db, &user, row).await?))
}

/// Add a participant or change their role
pub async fn put_participant(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((id, user_id)): Path<(String, String)>,
    Json(req): Json<ParticipantRequest>,
) -> ApiResult<Json<CaseDetail>> {
    let row = manageable_case(&state.db, &user, &id, "manage participants of this case").await?;

    let existing: Vec<String> =
        sqlx::query_scalar("SELECT user_id FROM case_participants WHERE case_id = ?")
            .bind(&id)
            .fetch_all(&state.db)
            .await?;

    if existing.contains(&user_id) {
        sqlx::query("UPDATE case_participants SET role = ? WHERE case_id = ? AND user_id = ?")
            .bind(req.role.as_str())
            .bind(&id)
            .bind(&user_id)
            .execute(&state.db)
            .await?;
    } else {
        require_active_user(&state.db, &user_id).await?;
        let current: Vec<&str> = existing.iter().map(String::as_str).collect();
        check_participant(&row.lead_investigator_id, &current, &user_id)?;

        sqlx::query(
            "INSERT INTO case_participants (case_id, user_id, role, added_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user_id)
        .bind(req.role.as_str())
        .bind(now())
        .execute(&state.db)
        .await?;
    }
    touch_case(&state.db, &id).await?;

    activity::record(
        &state,
        &user.id,
        Entity::Case,
        &id,
        "set_participant",
        Some(format!("{user_id} as {}", req.role)),
    )
    .await?;

    let row = fetch_case(&state.db, &id).await?;
    Ok(Json(case_detail(&state.db, &user, row).await?))
}

pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<CaseDetail>> {
    manageable_case(&state.db, &user, &id, "manage participants of this case").await?;

    let result = sqlx::query("DELETE FROM case_participants WHERE case_id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("participant", &user_id));
    }
    touch_case(&state.db, &id).await?;

    activity::record(
        &state,
        &user.id,
        Entity::Case,
        &id,
        "remove_participant",
        Some(user_id),
    )
    .await?;

    let row = fetch_case(&state.db, &id).await?;
    Ok(Json(case_detail(&state.db, &user, row).await?))
}

pub async fn link_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((id, report_id)): Path<(String, String)>,
) -> ApiResult<Json<CaseDetail>> {
    manageable_case(&state.db, &user, &id, "link reports to this case").await?;
    let report = fetch_report(&state.db, &report_id).await?;
    check_link(&report, &id)?;

    let log_guard = state.activity_lock.lock().await;
    let mut tx = state.db.begin().await?;
    attach_report(&mut tx, &report_id, &id).await?;
    touch_case(&mut *tx, &id).await?;
    activity::append(
        &mut tx,
        &user.id,
        Entity::Case,
        &id,
        "link_report",
        Some(report_id),
    )
    .await?;
    tx.commit().await?;
    drop(log_guard);

    let row = fetch_case(&state.db, &id).await?;
    Ok(Json(case_detail(&state.db, &user, row).await?))
}

pub async fn unlink_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((id, report_id)): Path<(String, String)>,
) -> ApiResult<Json<CaseDetail>> {
    manageable_case(&state.db, &user, &id, "unlink reports from this case").await?;
    let report = fetch_report(&state.db, &report_id).await?;
    if report.case_id.as_deref() != Some(id.as_str()) {
        return Err(ApiError::InvalidRequest(
            "Report is not linked to this case".into(),
        ));
    }

    let log_guard = state.activity_lock.lock().await;
    let mut tx = state.db.begin().await?;
    detach_report(&mut tx, &report_id, &id).await?;
    touch_case(&mut *tx, &id).await?;
    activity::append(
        &mut tx,
        &user.id,
        Entity::Case,
        &id,
        "unlink_report",
        Some(report_id),
    )
    .await?;
    tx.commit().await?;
    drop(log_guard);

    let row = fetch_case(&state.db, &id).await?;
    Ok(Json(case_detail(&state.db, &user, row).await?))
}
