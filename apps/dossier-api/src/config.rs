//! Command-line and environment configuration

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for the Dossier API server
///
/// Every flag can also be set through the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "dossier-api")]
#[command(about = "Record management API for reports, cases, confiscations and the kompendium")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// SQLite connection string; defaults to the platform data directory
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Lifetime of a login session in hours
    #[arg(long, env = "SESSION_TTL_HOURS", default_value = "12")]
    pub session_ttl_hours: i64,

    /// Largest accepted evidence file in MiB
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "50")]
    pub max_upload_mb: usize,

    /// Username of the admin created when the user table is empty
    #[arg(long, env = "BOOTSTRAP_ADMIN_USER", default_value = "admin")]
    pub bootstrap_admin_user: String,

    /// Password for the bootstrap admin; no admin is created without it
    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    pub bootstrap_admin_password: Option<String>,

    /// Mark the session cookie `Secure` (serve over HTTPS)
    #[arg(long, env = "COOKIE_SECURE")]
    pub cookie_secure: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Runtime settings shared with handlers
#[derive(Debug, Clone)]
pub struct Settings {
    pub session_ttl: chrono::Duration,
    pub max_upload_bytes: usize,
    pub cookie_secure: bool,
}

impl Settings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            session_ttl: chrono::Duration::hours(args.session_ttl_hours.max(1)),
            max_upload_bytes: args.max_upload_mb.max(1) * 1024 * 1024,
            cookie_secure: args.cookie_secure,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::hours(12),
            max_upload_bytes: dossier_core::evidence::DEFAULT_MAX_BYTES,
            cookie_secure: false,
        }
    }
}

/// `sqlite:` URL inside the platform data directory
pub fn default_database_url() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dossier-api");
    std::fs::create_dir_all(&data_dir).ok();
    format!("sqlite:{}/dossier.db?mode=rwc", data_dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_args() {
        let args = Args::parse_from([
            "dossier-api",
            "--session-ttl-hours",
            "2",
            "--max-upload-mb",
            "5",
            "--cookie-secure",
        ]);
        let settings = Settings::from_args(&args);
        assert_eq!(settings.session_ttl, chrono::Duration::hours(2));
        assert_eq!(settings.max_upload_bytes, 5 * 1024 * 1024);
        assert!(settings.cookie_secure);
        assert_eq!(args.port, 3001);
    }

    #[test]
    fn default_database_lives_in_data_dir() {
        let url = default_database_url();
        assert!(url.starts_with("sqlite:"));
        assert!(url.ends_with("dossier.db?mode=rwc"));
        assert!(url.contains("dossier-api"));
        if let Some(dir) = dirs::data_dir() {
            assert!(url.contains(&dir.display().to_string()));
        }
    }
}
