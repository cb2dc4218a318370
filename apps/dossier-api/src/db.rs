//! Shared persistence helpers

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use dossier_core::DomainError;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::models::{UserRef, UserRow};

/// Fixed-width RFC 3339 so stored timestamps compare as text
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    timestamp(Utc::now())
}

/// Parse an enum stored as text; a bad value means the row is corrupt
pub fn parse_column<T>(column: &str, value: &str) -> ApiResult<T>
where
    T: FromStr<Err = DomainError>,
{
    value
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Column {column}: {e}")))
}

pub async fn fetch_user(db: &SqlitePool, id: &str) -> ApiResult<Option<UserRow>> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, display_name, badge_number, password_hash, rank, system_role,
               active, created_at, updated_at, last_login_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Load a user another record points at
pub async fn user_ref(db: &SqlitePool, id: &str) -> ApiResult<UserRef> {
    let user = fetch_user(db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("user", id))?;
    user.to_ref()
}

pub async fn optional_user_ref(db: &SqlitePool, id: Option<&str>) -> ApiResult<Option<UserRef>> {
    match id {
        Some(id) => user_ref(db, id).await.map(Some),
        None => Ok(None),
    }
}

/// A user that may be assigned to something: must exist and be active
pub async fn require_active_user(db: &SqlitePool, id: &str) -> ApiResult<UserRow> {
    let user = fetch_user(db, id)
        .await?
        .ok_or_else(|| ApiError::InvalidRequest(format!("Unknown user {id}")))?;
    if !user.active {
        return Err(ApiError::InvalidRequest(format!(
            "User {} is deactivated",
            user.username
        )));
    }
    Ok(user)
}
