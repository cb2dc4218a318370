//! Login sessions
//!
//! A session is an opaque random token handed to the client as a cookie (or
//! used as a Bearer token by scripts). Only its SHA-256 hash is stored.

use axum::http::{header, HeaderMap};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::db::timestamp;

pub const SESSION_COOKIE: &str = "dossier_session";

/// Generate a session token (two v4 UUIDs, 244 random bits)
pub fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Extract Bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: Option<&str>) -> Option<String> {
    auth_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Find the value of the session cookie in a Cookie header value
pub fn extract_cookie_token(cookie_header: Option<&str>) -> Option<String> {
    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Session token from the request, Authorization header first
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    extract_bearer_token(auth).or_else(|| {
        let cookies = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
        extract_cookie_token(cookies)
    })
}

/// `Set-Cookie` value carrying a fresh session token
pub fn session_cookie(token: &str, ttl: chrono::Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", chrono::Duration::zero(), secure)
}

/// Store a new session for `user_id` and return its token
pub async fn create_session(
    db: &SqlitePool,
    user_id: &str,
    ttl: chrono::Duration,
) -> Result<String, sqlx::Error> {
    let token = generate_token();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .bind(timestamp(now))
    .bind(timestamp(now + ttl))
    .execute(db)
    .await?;

    Ok(token)
}

pub async fn delete_session(db: &SqlitePool, token_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(db)
        .await?;
    Ok(())
}

/// Revoke every session of a user, optionally keeping one
pub async fn delete_user_sessions(
    db: &SqlitePool,
    user_id: &str,
    keep_token_hash: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND token_hash != ?")
        .bind(user_id)
        .bind(keep_token_hash.unwrap_or(""))
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn purge_expired(db: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(timestamp(Utc::now()))
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
