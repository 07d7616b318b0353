//! Error types shared by every article backend
//!
//! Backends report failures through [`ServiceError`]; the backend manager
//! folds them into report values so callers never have to match on them
//! unless they want the detail.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during article storage operations
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Article not found: {0}")]
    NotFound(String),

    #[error("Article already exists: {0}")]
    Conflict(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("I/O error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),
}

/// Result alias used throughout the backend layer
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Builds an I/O error carrying the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds an `Unreachable` error from anything displayable
    pub fn unreachable(detail: impl std::fmt::Display) -> Self {
        Self::Unreachable(detail.to_string())
    }

    /// True for the not-found family, which callers usually treat as data
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        // Drop the URL: CMS query strings may carry API keys
        Self::Unreachable(err.without_url().to_string())
    }
}

impl From<zip::result::ZipError> for ServiceError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Unreachable(format!("background task failed: {}", err))
    }
}
