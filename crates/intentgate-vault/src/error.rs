//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], which is the
//! single error type returned by every public API in this crate.  Each variant
//! carries enough context for callers to decide how to handle the failure
//! without inspecting opaque strings.

/// Unified error type for the IntentGate credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (e.g. wrong key, corrupted ciphertext, bad nonce).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    // -- Key file errors ----------------------------------------------------
    /// The key file exists but does not hold a usable 256-bit key.
    #[error("invalid key file {path}: {reason}")]
    InvalidKeyFile { path: String, reason: String },

    // -- Store errors -------------------------------------------------------
    /// A user-scoped write was attempted without a user identity.
    #[error("invalid scope for tool {tool_name}: user-scoped credentials need a user id")]
    InvalidScope { tool_name: String },

    /// The credential payload does not have the shape its kind requires.
    #[error("invalid payload for tool {tool_name}: {reason}")]
    InvalidPayload { tool_name: String, reason: String },

    /// No credential exists for the tool in the requested or system scope.
    #[error("credential not found: tool={tool_name}, user={user:?}")]
    CredentialNotFound {
        tool_name: String,
        user: Option<String>,
    },

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem (vault file, key file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
