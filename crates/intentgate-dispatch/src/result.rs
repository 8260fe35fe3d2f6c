//! Normalized dispatch results.
//!
//! Whatever happens inside an adapter, the caller of the dispatcher gets one
//! of these back:
//!
//! ```json
//! {"status": "success", "tool_name": "slack", "details": {...}}
//! {"status": "error", "tool_name": "slack", "error": "...", "error_kind": "timeout"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Success,
    Error,
}

/// Why a dispatch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No tool with that name is resolvable.
    ToolNotFound,
    /// The tool needs a credential and none is stored for the caller.
    CredentialNotFound,
    /// The stored OAuth credential is unusable; the user must authorize again.
    ReauthorizationRequired,
    /// The credential exists but could not be turned into a secret.
    CredentialError,
    /// The adapter ran and reported a failure.
    InvocationFailed,
    /// The adapter did not finish within the execution timeout.
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolNotFound => "tool_not_found",
            Self::CredentialNotFound => "credential_not_found",
            Self::ReauthorizationRequired => "reauthorization_required",
            Self::CredentialError => "credential_error",
            Self::InvocationFailed => "invocation_failed",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl DispatchResult {
    pub fn success(tool_name: impl Into<String>, details: Value) -> Self {
        Self {
            status: DispatchStatus::Success,
            tool_name: tool_name.into(),
            details: Some(details),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(tool_name: impl Into<String>, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Error,
            tool_name: tool_name.into(),
            details: None,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }
}
