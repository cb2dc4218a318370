//! Dossier API Server - record management for a narcotics-enforcement unit
//!
//! Provides REST endpoints for:
//! - Session login and user administration
//! - Reports with tactical maps, evidence and a review lifecycle
//! - Cases escalated from reports, with participants
//! - Confiscation records and statistics
//! - The kompendium knowledge base
//! - A hash-chained activity log

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod cache;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod state;
#[cfg(test)]
mod tests;

use config::{Args, Settings};
use handlers::{activity, cases, confiscations, dashboard, evidence, kompendium, reports, users};
use state::AppState;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);
const BODY_OVERHEAD: usize = 64 * 1024;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // evidence arrives base64-encoded inside JSON
    let body_limit = state.settings.max_upload_bytes / 3 * 4 + BODY_OVERHEAD;

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Auth
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/password", post(handlers::auth::change_password))
        // Users
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route("/api/users/:id", patch(users::update_user))
        // Reports
        .route(
            "/api/reports",
            get(reports::list_reports).post(reports::create_report),
        )
        .route(
            "/api/reports/:id",
            get(reports::get_report)
                .patch(reports::update_report)
                .delete(reports::delete_report),
        )
        .route("/api/reports/:id/map", put(reports::put_map))
        .route("/api/reports/:id/transition", post(reports::transition_report))
        .route("/api/reports/:id/escalate", post(cases::escalate_report))
        // Evidence
        .route("/api/reports/:id/evidence", post(evidence::upload_evidence))
        .route(
            "/api/evidence/:id",
            get(evidence::get_evidence).delete(evidence::delete_evidence),
        )
        .route("/api/evidence/:id/content", get(evidence::get_evidence_content))
        // Cases
        .route("/api/cases", get(cases::list_cases).post(cases::create_case))
        .route(
            "/api/cases/:id",
            get(cases::get_case).patch(cases::update_case),
        )
        .route("/api/cases/:id/advance", post(cases::advance_case))
        .route(
            "/api/cases/:id/participants/:user_id",
            put(cases::put_participant).delete(cases::remove_participant),
        )
        .route(
            "/api/cases/:id/reports/:report_id",
            post(cases::link_report).delete(cases::unlink_report),
        )
        // Confiscations
        .route(
            "/api/confiscations",
            get(confiscations::list_confiscations).post(confiscations::create_confiscation),
        )
        .route(
            "/api/confiscations/summary",
            get(confiscations::confiscation_summary),
        )
        .route(
            "/api/confiscations/:id",
            get(confiscations::get_confiscation)
                .patch(confiscations::update_confiscation)
                .delete(confiscations::delete_confiscation),
        )
        // Kompendium
        .route(
            "/api/kompendium",
            get(kompendium::kompendium_index).post(kompendium::create_doc),
        )
        .route(
            "/api/kompendium/:id",
            get(kompendium::get_doc)
                .patch(kompendium::update_doc)
                .delete(kompendium::delete_doc),
        )
        // Dashboard and activity log
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/activity", get(activity::list_activity))
        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("dossier_api={log_level}").parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Initializing Dossier API...");
    let database_url = args
        .database_url
        .clone()
        .unwrap_or_else(config::default_database_url);
    let state = AppState::connect(&database_url, Settings::from_args(&args)).await?;

    auth::bootstrap_admin(
        &state.db,
        &args.bootstrap_admin_user,
        args.bootstrap_admin_password.as_deref(),
    )
    .await?;

    let state = Arc::new(state);

    // Expired sessions are rejected on lookup; this only keeps the table small
    let purge_db = state.db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match auth::session::purge_expired(&purge_db).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired session(s)", n),
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
        }
    });

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dossier API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
