//! Error types for the auth crate.
//!
//! All OAuth and token-resolution operations surface errors through
//! [`AuthError`].  Provider-boundary failures (`InvalidGrant`,
//! `RefreshFailed`, `NetworkError`) are what a [`crate::TokenEndpoint`]
//! returns; [`crate::AuthManager::resolve_access_token`] turns any of them
//! into [`AuthError::ReauthorizationRequired`] so a stale token is never
//! handed out.

/// Unified error type for the IntentGate auth crate.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The stored OAuth credential can no longer be used and could not be
    /// refreshed.  A new authorization flow is required.
    #[error("reauthorization required for {tool_name} (user={user:?}): {reason}")]
    ReauthorizationRequired {
        tool_name: String,
        user: Option<String>,
        reason: String,
    },

    /// The authorization code exchange or refresh grant was rejected by the
    /// authorization server.
    #[error("invalid grant: {reason}")]
    InvalidGrant { reason: String },

    /// The token endpoint answered, but not with usable tokens.
    #[error("token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    /// An HTTP request to the authorization server failed.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A static-key credential has none of the recognised secret fields.
    #[error("credential for {tool_name} has no usable secret field")]
    MissingSecret { tool_name: String },

    /// No OAuth provider is configured for the tool.
    #[error("no oauth provider configured for {tool_name}")]
    ProviderNotFound { tool_name: String },

    /// `complete_authorization` was called with a state that was never
    /// issued, was already used, or has expired.
    #[error("unknown or expired authorization state")]
    UnknownState,

    /// Configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// An error propagated from the vault crate.
    #[error("vault error: {0}")]
    Vault(#[from] intentgate_vault::VaultError),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// Whether the error means "no credential is stored for this tool".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Vault(intentgate_vault::VaultError::CredentialNotFound { .. })
        )
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_reauthorization_required() {
        let err = AuthError::ReauthorizationRequired {
            tool_name: "google_calendar".into(),
            user: Some("alice".into()),
            reason: "no refresh token".into(),
        };
        assert_eq!(
            err.to_string(),
            "reauthorization required for google_calendar (user=Some(\"alice\")): no refresh token"
        );
    }

    #[test]
    fn error_display_invalid_grant() {
        let err = AuthError::InvalidGrant {
            reason: "bad code".to_string(),
        };
        assert_eq!(err.to_string(), "invalid grant: bad code");
    }

    #[test]
    fn not_found_detection() {
        let err = AuthError::from(intentgate_vault::VaultError::CredentialNotFound {
            tool_name: "slack".into(),
            user: None,
        });
        assert!(err.is_not_found());
        assert!(!AuthError::UnknownState.is_not_found());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
    }
}
