//! Authentication for the Dossier API
//!
//! ## Features
//! - Argon2id password hashing
//! - Opaque session tokens (cookie or Bearer), stored hashed with expiry
//! - `CurrentUser` extractor resolving the session on every request
//!
//! There is no self-registration: admins create accounts, and the first
//! admin is bootstrapped from configuration.

pub mod password;
pub mod session;

use std::sync::{Arc, OnceLock};

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use dossier_core::{Actor, Rank, SystemRole};
use sqlx::SqlitePool;

use crate::db::{now, parse_column, timestamp};
use crate::error::ApiError;
use crate::models::UserRow;
use crate::state::AppState;

/// The user behind the request's session
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub rank: Rank,
    pub role: SystemRole,
    pub token_hash: String,
}

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.rank, self.role)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session::token_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Login required".into()))?;
        let token_hash = session::hash_token(&token);

        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.display_name, u.badge_number, u.password_hash, u.rank,
                   u.system_role, u.active, u.created_at, u.updated_at, u.last_login_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ? AND s.expires_at > ? AND u.active = 1
            "#,
        )
        .bind(&token_hash)
        .bind(timestamp(Utc::now()))
        .fetch_optional(&state.db)
        .await?;

        let user = row.ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".into()))?;

        Ok(CurrentUser {
            rank: parse_column("rank", &user.rank)?,
            role: parse_column("system_role", &user.system_role)?,
            id: user.id,
            username: user.username,
            token_hash,
        })
    }
}

/// Insert a user row; the password must already be hashed
pub async fn insert_user(
    db: &SqlitePool,
    username: &str,
    display_name: &str,
    password_hash: &str,
    rank: Rank,
    role: SystemRole,
    badge_number: Option<&str>,
) -> Result<String, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let ts = now();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, display_name, badge_number, password_hash, rank,
                           system_role, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(username)
    .bind(display_name)
    .bind(badge_number)
    .bind(password_hash)
    .bind(rank.as_str())
    .bind(role.as_str())
    .bind(&ts)
    .bind(&ts)
    .execute(db)
    .await?;

    Ok(id)
}

/// Hash on the blocking pool; Argon2 is deliberately slow
pub async fn hash_password_blocking(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(ApiError::Internal)
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.into()))
}

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Argon2 hash of a random secret, used to spend the same time on logins
/// for unknown usernames as on real password checks
pub(crate) async fn dummy_hash() -> Result<String, ApiError> {
    if let Some(hash) = DUMMY_HASH.get() {
        return Ok(hash.clone());
    }
    let hash = hash_password_blocking(uuid::Uuid::new_v4().to_string()).await?;
    Ok(DUMMY_HASH.get_or_init(|| hash).clone())
}

/// Run a password check that always fails
pub async fn reject_unknown_user(password: String) -> Result<(), ApiError> {
    let hash = dummy_hash().await?;
    verify_password_blocking(password, hash).await?;
    Ok(())
}

/// Create the first admin when the user table is empty
///
/// Returns the new admin's id, or `None` if users already exist or no
/// password was configured.
pub async fn bootstrap_admin(
    db: &SqlitePool,
    username: &str,
    password: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    if count > 0 {
        return Ok(None);
    }

    let Some(password) = password else {
        tracing::warn!("No users exist and BOOTSTRAP_ADMIN_PASSWORD is not set; nobody can log in");
        return Ok(None);
    };

    let username = password::validate_username(username).map_err(anyhow::Error::msg)?;
    password::validate_password_strength(password).map_err(anyhow::Error::msg)?;

    let hash = password::hash_password(password)?;
    let id = insert_user(
        db,
        &username,
        "Administrator",
        &hash,
        Rank::Kriminalrat,
        SystemRole::Admin,
        None,
    )
    .await?;

    tracing::info!("Created bootstrap admin '{}'", username);
    Ok(Some(id))
}
