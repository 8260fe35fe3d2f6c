//! Credential resolution and OAuth session management.
//!
//! The [`AuthManager`] sits on top of the vault.  It issues authorization
//! URLs, completes the code exchange, and turns stored credentials into a
//! usable secret, refreshing expired OAuth tokens on the way.
//!
//! Per OAuth credential the lifecycle is:
//!
//! ```text
//! NoCredential -> Authorized(valid) -> Authorized(expired) -> [Refreshing]
//!                                                              |-> Authorized(valid)
//!                                                              '-> ReauthorizationRequired
//! ```
//!
//! Refreshing is serialized per `(scope, tool)` so concurrent callers that
//! all see the same expired token trigger exactly one provider exchange.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use intentgate_vault::{CredentialKind, CredentialRecord, CredentialScope, Vault};

use crate::error::{AuthError, Result};
use crate::oauth::{
    OAuthConfig, OAuthFlow, OAuthTokens, TokenEndpoint, generate_pkce_verifier, pkce_challenge,
};

/// How long an issued authorization `state` stays redeemable.
const DEFAULT_AUTHORIZATION_TTL_SECS: i64 = 600;

/// Payload fields checked, in order, for a static key.
const STATIC_SECRET_FIELDS: [&str; 3] = ["api_key", "token", "access_token"];

/// An authorization that has been started but not yet completed.
#[derive(Debug, Clone)]
struct PendingAuthorization {
    tool_name: String,
    user: Option<String>,
    code_verifier: String,
    issued_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AuthManager
// ---------------------------------------------------------------------------

/// Resolves credentials from the vault and drives OAuth flows.
pub struct AuthManager {
    vault: Arc<Vault>,
    providers: DashMap<String, Arc<dyn TokenEndpoint>>,
    refresh_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    pending: DashMap<String, PendingAuthorization>,
    authorization_ttl: chrono::Duration,
}

impl AuthManager {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self {
            vault,
            providers: DashMap::new(),
            refresh_locks: DashMap::new(),
            pending: DashMap::new(),
            authorization_ttl: chrono::Duration::seconds(DEFAULT_AUTHORIZATION_TTL_SECS),
        }
    }

    /// Override how long an authorization `state` stays valid.
    pub fn with_authorization_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.authorization_ttl = ttl;
        self
    }

    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    /// Configure the OAuth provider for `tool_name` over HTTP.
    pub fn register_provider(&self, tool_name: &str, config: OAuthConfig) {
        self.register_endpoint(tool_name, Arc::new(OAuthFlow::new(config)));
    }

    /// Configure the OAuth provider for `tool_name` with any token endpoint.
    pub fn register_endpoint(&self, tool_name: &str, endpoint: Arc<dyn TokenEndpoint>) {
        tracing::debug!(tool = %tool_name, "oauth provider registered");
        self.providers.insert(tool_name.to_owned(), endpoint);
    }

    pub fn has_provider(&self, tool_name: &str) -> bool {
        self.providers.contains_key(tool_name)
    }

    // -- Authorization flow -------------------------------------------------

    /// Start an authorization for `tool_name` on behalf of `user` (or the
    /// system when `None`).
    ///
    /// Returns the URL the user must visit and the opaque `state` that
    /// [`complete_authorization`](Self::complete_authorization) expects back.
    pub fn begin_authorization(
        &self,
        tool_name: &str,
        user: Option<&str>,
    ) -> Result<(String, String)> {
        let provider = self.provider(tool_name)?;
        self.purge_expired_authorizations();

        let code_verifier = generate_pkce_verifier()?;
        let state = uuid::Uuid::now_v7().to_string();
        let url = provider.authorization_url(&state, &pkce_challenge(&code_verifier))?;

        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                tool_name: tool_name.to_owned(),
                user: user.map(str::to_owned),
                code_verifier,
                issued_at: Utc::now(),
            },
        );

        tracing::info!(tool = %tool_name, user = ?user, "authorization started");
        Ok((url, state))
    }

    /// Finish an authorization: redeem `state`, exchange `code` for tokens
    /// and store them in the vault.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnknownState`] if `state` was never issued, was already
    /// used, or has expired.  A state is consumed even when the exchange
    /// fails.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<CredentialRecord> {
        let (_, pending) = self.pending.remove(state).ok_or(AuthError::UnknownState)?;
        if Utc::now() - pending.issued_at > self.authorization_ttl {
            tracing::warn!(tool = %pending.tool_name, "authorization state expired");
            return Err(AuthError::UnknownState);
        }

        let provider = self.provider(&pending.tool_name)?;
        let tokens = provider
            .exchange_code(code, &pending.code_verifier)
            .await?;

        let scope = match pending.user {
            Some(user) => CredentialScope::User(user),
            None => CredentialScope::System,
        };
        let record = self.vault.store(
            &pending.tool_name,
            CredentialKind::OAuth,
            tokens.to_payload(),
            scope,
        )?;

        tracing::info!(tool = %record.tool_name, scope = %record.scope, "authorization completed");
        Ok(record)
    }

    // -- Resolution ---------------------------------------------------------

    /// Return a usable secret for `tool_name`.
    ///
    /// Static keys are returned as stored.  OAuth access tokens are returned
    /// while fresh and refreshed through the provider when expired; if that
    /// is impossible the call fails with
    /// [`AuthError::ReauthorizationRequired`] and the stored record is left
    /// untouched.
    pub async fn resolve_access_token(&self, tool_name: &str, user: Option<&str>) -> Result<String> {
        let record = self.vault.fetch(tool_name, user)?;

        match record.kind {
            CredentialKind::StaticKey => static_secret(&record),
            CredentialKind::OAuth => {
                let tokens = stored_tokens(&record)?;
                if !tokens.is_expired() {
                    return Ok(tokens.access_token);
                }
                tracing::debug!(tool = %tool_name, scope = %record.scope, "access token expired");
                self.refresh(&record.tool_name, &record.scope, &tokens.access_token)
                    .await
            }
        }
    }

    /// Refresh the OAuth record at exactly `(tool_name, scope)`, unless the
    /// stored access token is no longer `stale_access`.
    async fn refresh(
        &self,
        tool_name: &str,
        scope: &CredentialScope,
        stale_access: &str,
    ) -> Result<String> {
        let lock_key = format!("{scope}/{tool_name}");
        let lock = Arc::clone(self.refresh_locks.entry(lock_key).or_default().value());
        let _guard = lock.lock().await;

        // Another task may have refreshed while we waited.  A token it just
        // obtained counts even when it already falls inside the expiry margin.
        let record = self.vault.fetch_scoped(tool_name, scope)?;
        let current = stored_tokens(&record)?;
        if current.access_token != stale_access || !current.is_expired() {
            tracing::debug!(tool = %tool_name, scope = %scope, "token already refreshed");
            return Ok(current.access_token);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(reauthorization(&record, "no refresh token stored".into()));
        };
        let provider = self.provider(tool_name)?;

        let fresh = match provider.refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(tool = %tool_name, scope = %scope, error = %e, "token refresh rejected");
                return Err(reauthorization(&record, e.to_string()));
            }
        };

        let merged = OAuthTokens {
            refresh_token: fresh.refresh_token.or(current.refresh_token),
            scopes: if fresh.scopes.is_empty() {
                current.scopes
            } else {
                fresh.scopes
            },
            ..fresh
        };

        let mut payload = record.payload.clone();
        payload.extend(merged.to_payload());
        if merged.expiry.is_none() {
            payload.remove("expiry");
        }
        self.vault.replace_payload(tool_name, scope, payload)?;

        tracing::info!(tool = %tool_name, scope = %scope, "access token refreshed");
        Ok(merged.access_token)
    }

    // -- Internal helpers ---------------------------------------------------

    fn provider(&self, tool_name: &str) -> Result<Arc<dyn TokenEndpoint>> {
        self.providers
            .get(tool_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AuthError::ProviderNotFound {
                tool_name: tool_name.to_owned(),
            })
    }

    fn purge_expired_authorizations(&self) {
        let cutoff = Utc::now() - self.authorization_ttl;
        self.pending.retain(|_, pending| pending.issued_at >= cutoff);
    }
}

fn static_secret(record: &CredentialRecord) -> Result<String> {
    STATIC_SECRET_FIELDS
        .iter()
        .find_map(|field| record.field(field).filter(|value| !value.is_empty()))
        .map(str::to_owned)
        .ok_or_else(|| AuthError::MissingSecret {
            tool_name: record.tool_name.clone(),
        })
}

fn stored_tokens(record: &CredentialRecord) -> Result<OAuthTokens> {
    OAuthTokens::from_payload(&record.payload)
        .ok_or_else(|| reauthorization(record, "stored token payload is unreadable".into()))
}

fn reauthorization(record: &CredentialRecord, reason: String) -> AuthError {
    AuthError::ReauthorizationRequired {
        tool_name: record.tool_name.clone(),
        user: record.scope.user_id().map(str::to_owned),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intentgate_vault::Payload;
    use serde_json::json;

    /// Token endpoint that hands out a fixed token and never rotates.
    struct FixedEndpoint;

    #[async_trait]
    impl TokenEndpoint for FixedEndpoint {
        fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String> {
            Ok(format!(
                "https://auth.example.com/authorize?state={state}&code_challenge={code_challenge}"
            ))
        }

        async fn exchange_code(&self, code: &str, _code_verifier: &str) -> Result<OAuthTokens> {
            Ok(OAuthTokens {
                access_token: format!("access-for-{code}"),
                refresh_token: Some("refresh-1".into()),
                expiry: Some(Utc::now() + chrono::Duration::hours(1)),
                token_type: "Bearer".into(),
                scopes: vec!["calendar".into()],
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<OAuthTokens> {
            Ok(OAuthTokens {
                access_token: "refreshed".into(),
                refresh_token: None,
                expiry: Some(Utc::now() + chrono::Duration::hours(1)),
                token_type: "Bearer".into(),
                scopes: vec![],
            })
        }
    }

    fn manager() -> (tempfile::TempDir, AuthManager) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(Vault::open(dir.path()).unwrap());
        let manager = AuthManager::new(vault);
        manager.register_endpoint("google_calendar", Arc::new(FixedEndpoint));
        (dir, manager)
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn static_key_fields_in_priority_order() {
        let (_dir, manager) = manager();
        manager
            .vault()
            .store(
                "slack",
                CredentialKind::StaticKey,
                payload(json!({"token": "xoxb-1", "access_token": "other"})),
                CredentialScope::System,
            )
            .unwrap();

        assert_eq!(
            manager.resolve_access_token("slack", None).await.unwrap(),
            "xoxb-1"
        );
    }

    #[tokio::test]
    async fn static_key_without_secret_field() {
        let (_dir, manager) = manager();
        manager
            .vault()
            .store(
                "figma",
                CredentialKind::StaticKey,
                payload(json!({"workspace": "design"})),
                CredentialScope::System,
            )
            .unwrap();

        assert!(matches!(
            manager.resolve_access_token("figma", None).await,
            Err(AuthError::MissingSecret { .. })
        ));
    }

    #[tokio::test]
    async fn missing_credential_is_not_found() {
        let (_dir, manager) = manager();
        let err = manager
            .resolve_access_token("google_calendar", Some("alice"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn fresh_oauth_token_returned_without_refresh() {
        let (_dir, manager) = manager();
        let expiry = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        manager
            .vault()
            .store(
                "google_calendar",
                CredentialKind::OAuth,
                payload(json!({"access_token": "still-good", "refresh_token": "r", "expiry": expiry})),
                CredentialScope::user("alice"),
            )
            .unwrap();

        assert_eq!(
            manager
                .resolve_access_token("google_calendar", Some("alice"))
                .await
                .unwrap(),
            "still-good"
        );
    }

    #[tokio::test]
    async fn refresh_keeps_unrotated_refresh_token_and_scopes() {
        let (_dir, manager) = manager();
        let expiry = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        manager
            .vault()
            .store(
                "google_calendar",
                CredentialKind::OAuth,
                payload(json!({
                    "access_token": "stale",
                    "refresh_token": "keep-me",
                    "expiry": expiry,
                    "scopes": ["calendar"]
                })),
                CredentialScope::System,
            )
            .unwrap();

        let token = manager
            .resolve_access_token("google_calendar", None)
            .await
            .unwrap();
        assert_eq!(token, "refreshed");

        let record = manager.vault().fetch("google_calendar", None).unwrap();
        assert_eq!(record.field("refresh_token"), Some("keep-me"));
        assert_eq!(record.payload["scopes"], json!(["calendar"]));
    }

    #[tokio::test]
    async fn expired_token_without_provider() {
        let (_dir, manager) = manager();
        let expiry = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        manager
            .vault()
            .store(
                "outlook",
                CredentialKind::OAuth,
                payload(json!({"access_token": "stale", "refresh_token": "r", "expiry": expiry})),
                CredentialScope::System,
            )
            .unwrap();

        assert!(matches!(
            manager.resolve_access_token("outlook", None).await,
            Err(AuthError::ProviderNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn authorization_roundtrip_stores_user_record() {
        let (_dir, manager) = manager();
        let (url, state) = manager
            .begin_authorization("google_calendar", Some("alice"))
            .unwrap();
        assert!(url.contains(&state));

        let record = manager
            .complete_authorization("code-42", &state)
            .await
            .unwrap();
        assert_eq!(record.scope, CredentialScope::user("alice"));
        assert_eq!(record.kind, CredentialKind::OAuth);
        assert_eq!(record.field("access_token"), Some("access-for-code-42"));

        // A state is single-use.
        assert!(matches!(
            manager.complete_authorization("code-42", &state).await,
            Err(AuthError::UnknownState)
        ));
    }

    #[tokio::test]
    async fn unknown_and_expired_states_rejected() {
        let (_dir, manager) = manager();
        assert!(matches!(
            manager.complete_authorization("code", "never-issued").await,
            Err(AuthError::UnknownState)
        ));

        let manager = manager.with_authorization_ttl(chrono::Duration::seconds(-1));
        let (_, state) = manager.begin_authorization("google_calendar", None).unwrap();
        assert!(matches!(
            manager.complete_authorization("code", &state).await,
            Err(AuthError::UnknownState)
        ));
    }

    #[test]
    fn begin_authorization_requires_provider() {
        let (_dir, manager) = manager();
        assert!(matches!(
            manager.begin_authorization("outlook", None),
            Err(AuthError::ProviderNotFound { .. })
        ));
    }

    #[test]
    fn auth_manager_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthManager>();
    }
}
