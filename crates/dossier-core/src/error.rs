//! Domain error type shared by every dossier-core module

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not permitted: {0}")]
    Forbidden(String),

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(operation: impl Into<String>) -> Self {
        Self::Forbidden(operation.into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
