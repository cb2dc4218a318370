//! Application state for the Dossier API

use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::cache::ViewCache;
use crate::config::Settings;

pub struct AppState {
    pub db: SqlitePool,
    pub views: ViewCache,
    pub settings: Settings,
    /// Serializes appends to the hash-chained activity log
    pub activity_lock: Mutex<()>,
}

impl AppState {
    pub async fn connect(database_url: &str, settings: Settings) -> Result<Self> {
        tracing::info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // every connection to `sqlite::memory:` opens its own database, so the
        // single connection must never be recycled
        let in_memory = database_url.contains(":memory:");
        let mut pool_options =
            SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        Self::run_migrations(&pool).await?;

        Ok(Self {
            db: pool,
            views: ViewCache::default(),
            settings,
            activity_lock: Mutex::new(()),
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }

        tracing::info!("Migrations complete");
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE COLLATE NOCASE,
        display_name TEXT NOT NULL,
        badge_number TEXT,
        password_hash TEXT NOT NULL,
        rank TEXT NOT NULL,
        system_role TEXT NOT NULL DEFAULT 'member',
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_login_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        token_hash TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cases (
        id TEXT PRIMARY KEY,
        case_number TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        summary TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'open',
        priority TEXT NOT NULL DEFAULT 'normal',
        reporting_officer_id TEXT NOT NULL REFERENCES users(id),
        lead_investigator_id TEXT NOT NULL REFERENCES users(id),
        closing_note TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_participants (
        case_id TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id),
        role TEXT NOT NULL,
        added_at TEXT NOT NULL,
        PRIMARY KEY (case_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reports (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        narrative TEXT NOT NULL DEFAULT '',
        location TEXT,
        incident_at TEXT,
        status TEXT NOT NULL DEFAULT 'draft',
        author_id TEXT NOT NULL REFERENCES users(id),
        reviewer_id TEXT REFERENCES users(id),
        review_comment TEXT,
        case_id TEXT REFERENCES cases(id) ON DELETE SET NULL,
        map_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        submitted_at TEXT,
        reviewed_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS evidence (
        id TEXT PRIMARY KEY,
        report_id TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        file_name TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        sha256 TEXT NOT NULL,
        caption TEXT,
        data BLOB NOT NULL,
        uploaded_by TEXT NOT NULL REFERENCES users(id),
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS confiscations (
        id TEXT PRIMARY KEY,
        drug_type TEXT NOT NULL,
        description TEXT,
        amount REAL NOT NULL,
        unit TEXT NOT NULL,
        location TEXT,
        seized_at TEXT NOT NULL,
        report_id TEXT REFERENCES reports(id) ON DELETE SET NULL,
        recorded_by TEXT NOT NULL REFERENCES users(id),
        notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS kompendium_docs (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        category TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        position INTEGER NOT NULL DEFAULT 0,
        author_id TEXT NOT NULL REFERENCES users(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        timestamp TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        entity TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        action TEXT NOT NULL,
        details TEXT,
        previous_hash TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status)",
    "CREATE INDEX IF NOT EXISTS idx_reports_author ON reports(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_reports_case ON reports(case_id)",
    "CREATE INDEX IF NOT EXISTS idx_evidence_report ON evidence(report_id)",
    "CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status)",
    "CREATE INDEX IF NOT EXISTS idx_confiscations_report ON confiscations(report_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
];
