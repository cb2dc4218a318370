//! Landing page data: unit overview plus the caller's work queues

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use dossier_core::case::CaseStatus;
use dossier_core::report::ReportStatus;
use sqlx::SqlitePool;

use crate::auth::CurrentUser;
use crate::cache::View;
use crate::error::{ApiError, ApiResult};
use crate::handlers::cases::{list_case_summaries, CaseFilter};
use crate::handlers::confiscations::render_summary;
use crate::handlers::reports::{list_summaries, ReportFilter};
use crate::models::{DashboardResponse, StatusCount, UnitOverview};
use crate::state::AppState;

/// Count rows per status; statuses without rows are reported as zero
async fn status_counts<S: Copy>(
    db: &SqlitePool,
    table: &str,
    all: &[S],
    as_str: fn(&S) -> &'static str,
) -> ApiResult<Vec<StatusCount<S>>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as(&format!("SELECT status, COUNT(*) FROM {table} GROUP BY status"))
            .fetch_all(db)
            .await?;
    let counts: HashMap<String, i64> = rows.into_iter().collect();

    Ok(all
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: counts.get(as_str(status)).copied().unwrap_or(0),
        })
        .collect())
}

async fn render_overview(db: &SqlitePool) -> ApiResult<UnitOverview> {
    Ok(UnitOverview {
        reports: status_counts(db, "reports", ReportStatus::ALL, ReportStatus::as_str).await?,
        cases: status_counts(db, "cases", CaseStatus::ALL, CaseStatus::as_str).await?,
        confiscations: render_summary(db).await?,
    })
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<DashboardResponse>> {
    let overview = state
        .views
        .get_or_render(View::Dashboard, || async {
            let overview = render_overview(&state.db).await?;
            serde_json::to_value(overview).map_err(|e| ApiError::Internal(e.into()))
        })
        .await?;
    let overview: UnitOverview = serde_json::from_value(overview.as_ref().clone())
        .map_err(|e| ApiError::Internal(e.into()))?;

    let actor = user.actor();
    let mine = |status| ReportFilter {
        status: Some(status),
        author_id: Some(user.id.as_str()),
        viewer_id: &user.id,
        viewer_is_admin: actor.is_admin(),
        ..Default::default()
    };

    let my_drafts = list_summaries(&state.db, &mine(ReportStatus::Draft)).await?;
    let my_returned = list_summaries(&state.db, &mine(ReportStatus::Returned)).await?;

    let mut awaiting_review = Vec::new();
    if actor.is_reviewer() {
        for status in [ReportStatus::Submitted, ReportStatus::UnderReview] {
            let filter = ReportFilter {
                status: Some(status),
                exclude_author_id: Some(&user.id),
                viewer_id: &user.id,
                viewer_is_admin: actor.is_admin(),
                ..Default::default()
            };
            awaiting_review.extend(list_summaries(&state.db, &filter).await?);
        }
    }

    let my_open_cases = list_case_summaries(
        &state.db,
        &CaseFilter {
            member_id: Some(&user.id),
            open_only: true,
            ..Default::default()
        },
    )
    .await?;

    Ok(Json(DashboardResponse {
        overview,
        my_drafts,
        my_returned,
        awaiting_review,
        my_open_cases,
    }))
}
