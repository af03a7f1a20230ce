//! Error types for airwave-director
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for airwave-director
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content generator failed or returned nothing usable
    #[error("Generation error: {0}")]
    Generation(String),

    /// Timeline failed validation
    #[error("Invalid timeline: {0}")]
    InvalidTimeline(String),

    /// Speech synthesis failed
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Media search or URL resolution failed
    #[error("Media error: {0}")]
    Media(String),

    /// Media download failed
    #[error("Download error: {0}")]
    Download(String),

    /// Snapshot database errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Work belonging to a session that has since been stopped or restarted
    #[error("Session {0} is no longer current")]
    SessionExpired(u64),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Errors surfaced by the shared library
    #[error(transparent)]
    Common(#[from] airwave_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using airwave-director Error
pub type Result<T> = std::result::Result<T, Error>;
