//! Error types for the registry subsystem.

use std::path::PathBuf;

/// Registry-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A registration field is not a safe identifier.
    #[error("invalid {field} `{value}`: {reason}")]
    InvalidIdentifier {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// A catalog entry could not be turned into a capability.  Reported as a
    /// load diagnostic, never fatal to a reload.
    #[error("failed to load adapter `{name}`: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("catalog at `{path}` is unusable: {reason}")]
    Catalog { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RegistryError>;
