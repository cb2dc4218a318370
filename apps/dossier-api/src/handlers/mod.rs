//! HTTP handlers for the Dossier API
//!
//! Every mutating handler follows the same shape: load the record with what
//! the permission check needs, check, mutate, then invalidate the cached
//! views it touched and append to the activity log.

pub mod activity;
pub mod auth;
pub mod cases;
pub mod confiscations;
pub mod dashboard;
pub mod evidence;
pub mod kompendium;
pub mod reports;
pub mod users;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Treat a blank optional field as absent
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
