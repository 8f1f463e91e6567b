//! Error types for tabtimer-core operations.
//!
//! Nothing in the page core surfaces these to the end user: the controller logs
//! them and falls back to the previous state or to "no decoration".

use std::path::PathBuf;

/// All errors that can occur in tabtimer-core operations.
#[derive(Debug, thiserror::Error)]
pub enum TabTimerError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Preference file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Preference file read failed: {path}: {source}")]
    ConfigReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Preference store unavailable: {0}")]
    StoreUnavailable(String),

    // ─────────────────────────────────────────────────────────────────────
    // Serialization Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using TabTimerError.
pub type Result<T> = std::result::Result<T, TabTimerError>;
