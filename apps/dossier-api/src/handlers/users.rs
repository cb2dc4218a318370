//! User administration

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use dossier_core::activity::Entity;
use dossier_core::roles::ensure;
use dossier_core::SystemRole;

use crate::auth::{self, password, session, CurrentUser};
use crate::db::{fetch_user, now};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{activity, non_blank};
use crate::models::{CreateUserRequest, UpdateUserRequest, UserPublic, UserRow};
use crate::state::AppState;

const DISPLAY_NAME_MAX_CHARS: usize = 100;

fn display_name(value: &str) -> ApiResult<String> {
    Ok(dossier_core::text::required_line(
        "Display name",
        value,
        DISPLAY_NAME_MAX_CHARS,
    )?)
}

/// All users, active first
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<UserPublic>>> {
    let rows: Vec<UserRow> = sqlx::query_as(
        r#"
        SELECT id, username, display_name, badge_number, password_hash, rank, system_role,
               active, created_at, updated_at, last_login_at
        FROM users
        ORDER BY active DESC, display_name COLLATE NOCASE
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let users = rows
        .iter()
        .map(UserRow::to_public)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserPublic>)> {
    ensure(user.actor().can_manage_users(), "create users")?;

    let username = password::validate_username(&req.username).map_err(ApiError::InvalidRequest)?;
    let display_name = display_name(&req.display_name)?;
    password::validate_password_strength(&req.password).map_err(ApiError::InvalidRequest)?;

    let (taken,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(&username)
        .fetch_one(&state.db)
        .await?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!(
            "Username '{username}' is already taken"
        )));
    }

    let hash = auth::hash_password_blocking(req.password).await?;
    let id = auth::insert_user(
        &state.db,
        &username,
        &display_name,
        &hash,
        req.rank,
        req.role,
        non_blank(req.badge_number.as_deref()),
    )
    .await?;

    activity::record(
        &state,
        &user.id,
        Entity::User,
        &id,
        "create",
        Some(format!("{username} ({}, {})", req.rank, req.role)),
    )
    .await?;
    tracing::info!(user_id = %id, "Created user {}", username);

    let row = fetch_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("user", &id))?;
    Ok((StatusCode::CREATED, Json(row.to_public()?)))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserPublic>> {
    ensure(user.actor().can_manage_users(), "update users")?;

    let mut row = fetch_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("user", &id))?;

    if id == user.id {
        if req.role.is_some_and(|r| r != SystemRole::Admin) {
            return Err(ApiError::InvalidRequest(
                "You cannot remove your own admin role".into(),
            ));
        }
        if req.active == Some(false) {
            return Err(ApiError::InvalidRequest(
                "You cannot deactivate your own account".into(),
            ));
        }
    }

    let mut changes = Vec::new();
    if let Some(name) = req.display_name.as_deref() {
        row.display_name = display_name(name)?;
        changes.push("display_name");
    }
    if let Some(rank) = req.rank {
        row.rank = rank.as_str().to_string();
        changes.push("rank");
    }
    if let Some(role) = req.role {
        row.system_role = role.as_str().to_string();
        changes.push("role");
    }
    if let Some(badge) = req.badge_number.as_deref() {
        row.badge_number = non_blank(Some(badge)).map(str::to_string);
        changes.push("badge_number");
    }
    if let Some(active) = req.active {
        row.active = active;
        changes.push("active");
    }
    if let Some(new_password) = req.password {
        password::validate_password_strength(&new_password).map_err(ApiError::InvalidRequest)?;
        row.password_hash = auth::hash_password_blocking(new_password).await?;
        changes.push("password");
    }

    sqlx::query(
        r#"
        UPDATE users
        SET display_name = ?, rank = ?, system_role = ?, badge_number = ?, active = ?,
            password_hash = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&row.display_name)
    .bind(&row.rank)
    .bind(&row.system_role)
    .bind(&row.badge_number)
    .bind(row.active)
    .bind(&row.password_hash)
    .bind(now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    // deactivation and password resets end existing sessions
    if !row.active || changes.contains(&"password") {
        session::delete_user_sessions(&state.db, &id, None).await?;
    }

    activity::record(
        &state,
        &user.id,
        Entity::User,
        &id,
        "update",
        Some(changes.join(",")),
    )
    .await?;

    let row = fetch_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("user", &id))?;
    Ok(Json(row.to_public()?))
}
