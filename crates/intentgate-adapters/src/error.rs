//! Adapter error types.
//!
//! Every capability invocation returns `Result<Value, AdapterError>`.  The
//! dispatcher turns these into normalized results, so each variant carries
//! enough context to report the failure without inspecting opaque strings.

/// Unified error type for IntentGate adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    // -- Invocation ---------------------------------------------------------
    /// A tool invocation failed before producing a reply.
    #[error("execution failed for tool `{tool_name}`: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// The parameters supplied to a tool are invalid.
    #[error("invalid parameters for tool `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// The remote service rejected the call (e.g. an HTTP 4xx/5xx).
    #[error("provider error from `{tool_name}`{}: {message}", status_suffix(.status))]
    Provider {
        tool_name: String,
        status: Option<u16>,
        message: String,
    },

    /// The adapter answered with something that is not a valid reply.
    #[error("malformed response from `{tool_name}`: {reason}")]
    MalformedResponse { tool_name: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    // -- Plumbing -----------------------------------------------------------
    /// An I/O operation failed within the adapter.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal adapter error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
