//! Kompendium: the unit's knowledge base

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use dossier_core::activity::Entity;
use dossier_core::kompendium::{group_by_category, CategoryGroup, DocContent};
use dossier_core::roles::ensure;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::auth::CurrentUser;
use crate::cache::View;
use crate::db::now;
use crate::error::{ApiError, ApiResult};
use crate::handlers::activity;
use crate::models::{
    CreateKompendiumRequest, KompendiumDoc, KompendiumEntry, KompendiumIndex,
    UpdateKompendiumRequest,
};
use crate::state::AppState;

async fn fetch_doc(db: &SqlitePool, id: &str) -> ApiResult<KompendiumDoc> {
    let doc: Option<KompendiumDoc> = sqlx::query_as(
        r#"
        SELECT id, title, category, content, position, author_id, created_at, updated_at
        FROM kompendium_docs
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    doc.ok_or_else(|| ApiError::not_found("kompendium doc", id))
}

async fn render_index(db: &SqlitePool) -> ApiResult<KompendiumIndex> {
    let docs: Vec<KompendiumDoc> = sqlx::query_as(
        r#"
        SELECT id, title, category, content, position, author_id, created_at, updated_at
        FROM kompendium_docs
        "#,
    )
    .fetch_all(db)
    .await?;

    Ok(group_by_category(docs)
        .into_iter()
        .map(|group| CategoryGroup {
            category: group.category,
            docs: group.docs.into_iter().map(KompendiumEntry::from).collect(),
        })
        .collect())
}

fn require_editor(user: &CurrentUser) -> ApiResult<()> {
    ensure(user.actor().can_edit_kompendium(), "edit the kompendium")?;
    Ok(())
}

/// All articles grouped by category (cached)
pub async fn kompendium_index(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> ApiResult<Json<Value>> {
    let view = state
        .views
        .get_or_render(View::Kompendium, || async {
            let index = render_index(&state.db).await?;
            serde_json::to_value(index).map_err(|e| ApiError::Internal(e.into()))
        })
        .await?;
    Ok(Json(view.as_ref().clone()))
}

pub async fn get_doc(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<KompendiumDoc>> {
    Ok(Json(fetch_doc(&state.db, &id).await?))
}

pub async fn create_doc(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateKompendiumRequest>,
) -> ApiResult<(StatusCode, Json<KompendiumDoc>)> {
    require_editor(&user)?;
    let content = DocContent::new(&req.title, &req.category, &req.content)?;

    let id = uuid::Uuid::new_v4().to_string();
    let ts = now();
    sqlx::query(
        r#"
        INSERT INTO kompendium_docs (id, title, category, content, position, author_id,
                                     created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&content.title)
    .bind(&content.category)
    .bind(&content.content)
    .bind(req.position)
    .bind(&user.id)
    .bind(&ts)
    .bind(&ts)
    .execute(&state.db)
    .await?;

    state.views.invalidate(&[View::Kompendium]).await;
    activity::record(
        &state,
        &user.id,
        Entity::Kompendium,
        &id,
        "create",
        Some(format!("{} / {}", content.category, content.title)),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(fetch_doc(&state.db, &id).await?)))
}

pub async fn update_doc(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateKompendiumRequest>,
) -> ApiResult<Json<KompendiumDoc>> {
    require_editor(&user)?;
    let doc = fetch_doc(&state.db, &id).await?;

    let content = DocContent::new(
        req.title.as_deref().unwrap_or(&doc.title),
        req.category.as_deref().unwrap_or(&doc.category),
        req.content.as_deref().unwrap_or(&doc.content),
    )?;

    sqlx::query(
        r#"
        UPDATE kompendium_docs
        SET title = ?, category = ?, content = ?, position = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&content.title)
    .bind(&content.category)
    .bind(&content.content)
    .bind(req.position.unwrap_or(doc.position))
    .bind(now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    state.views.invalidate(&[View::Kompendium]).await;
    activity::record(&state, &user.id, Entity::Kompendium, &id, "update", None).await?;

    Ok(Json(fetch_doc(&state.db, &id).await?))
}

pub async fn delete_doc(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_editor(&user)?;
    let doc = fetch_doc(&state.db, &id).await?;

    sqlx::query("DELETE FROM kompendium_docs WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    state.views.invalidate(&[View::Kompendium]).await;
    activity::record(
        &state,
        &user.id,
        Entity::Kompendium,
        &id,
        "delete",
        Some(doc.title),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
