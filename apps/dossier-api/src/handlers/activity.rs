//! Activity log: appending and the admin view

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use dossier_core::activity::{verify_chain, ActivityEntry, Entity};
use dossier_core::roles::ensure;
use sqlx::SqliteConnection;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::models::{ActivityQuery, ActivityResponse, ActivityRow};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1_000;

/// Append an entry chained to the latest one
pub async fn record(
    state: &AppState,
    actor_id: &str,
    entity: Entity,
    entity_id: &str,
    action: &str,
    details: Option<String>,
) -> ApiResult<()> {
    let _guard = state.activity_lock.lock().await;
    let mut conn = state.db.acquire().await?;
    append(&mut conn, actor_id, entity, entity_id, action, details).await
}

/// Append on a connection the caller already holds, usually inside the
/// transaction of the mutation being logged.
///
/// The caller must hold `AppState::activity_lock` until that transaction
/// commits, and must take the lock before opening the transaction.
pub async fn append(
    conn: &mut SqliteConnection,
    actor_id: &str,
    entity: Entity,
    entity_id: &str,
    action: &str,
    details: Option<String>,
) -> ApiResult<()> {
    let last: Option<ActivityRow> = sqlx::query_as(
        r#"
        SELECT id, timestamp, actor_id, entity, entity_id, action, details, previous_hash
        FROM activity_log
        ORDER BY seq DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(&mut *conn)
    .await?;

    let previous_hash = match last {
        Some(row) => Some(row.to_entry()?.compute_hash()),
        None => None,
    };

    let entry = ActivityEntry::new(actor_id, entity, entity_id, action, details, previous_hash);

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, timestamp, actor_id, entity, entity_id, action, details, previous_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.timestamp)
    .bind(&entry.actor_id)
    .bind(entry.entity.as_str())
    .bind(&entry.entity_id)
    .bind(&entry.action)
    .bind(&entry.details)
    .bind(&entry.previous_hash)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(entity = %entity, entity_id, action, "activity recorded");
    Ok(())
}

async fn load_chain(state: &AppState) -> ApiResult<Vec<ActivityEntry>> {
    let rows: Vec<ActivityRow> = sqlx::query_as(
        r#"
        SELECT id, timestamp, actor_id, entity, entity_id, action, details, previous_hash
        FROM activity_log
        ORDER BY seq ASC
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    rows.iter().map(ActivityRow::to_entry).collect()
}

/// List recent activity, newest first, with the chain's verification state
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<ActivityResponse>> {
    ensure(user.actor().is_admin(), "read the activity log")?;

    let entries = load_chain(&state).await?;
    let chain = verify_chain(&entries);
    if !chain.valid {
        tracing::warn!(broken_at = ?chain.broken_at, "activity log chain is broken");
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;
    let entries = entries
        .into_iter()
        .rev()
        .filter(|e| query.entity.map_or(true, |entity| e.entity == entity))
        .filter(|e| {
            query
                .entity_id
                .as_deref()
                .map_or(true, |id| e.entity_id == id)
        })
        .take(limit)
        .collect();

    Ok(Json(ActivityResponse { chain, entries }))
}
