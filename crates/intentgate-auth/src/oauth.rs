//! OAuth 2.0 Authorization Code Flow with PKCE.
//!
//! This module implements the provider boundary of the vault: building the
//! authorization URL, exchanging an authorization code for tokens, and
//! refreshing an access token (RFC 6749), with Proof Key for Code Exchange
//! (RFC 7636) on every authorization.
//!
//! The [`TokenEndpoint`] trait is the seam the rest of the system talks to.
//! [`OAuthFlow`] implements it over HTTP with `reqwest`; tests substitute
//! in-memory stubs.
//!
//! Tokens are persisted in the vault as a flat payload:
//!
//! ```text
//! { "access_token": "...", "refresh_token": "...", "expiry": "<RFC 3339>",
//!   "token_type": "Bearer", "scopes": ["..."] }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, NaiveDateTime, Utc};
use intentgate_vault::Payload;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{AuthError, Result};

/// Length of the PKCE code verifier in bytes (before base64 encoding).
const PKCE_VERIFIER_BYTES: usize = 32;

/// Tokens are treated as expired this many seconds before their expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Timeout for a single token endpoint request.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for an OAuth 2.0 provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// The OAuth client ID.  May be left empty in a config file and
    /// supplied through the environment.
    #[serde(default)]
    pub client_id: String,

    /// The OAuth client secret (confidential clients only).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// The authorization endpoint URL.
    pub auth_url: String,

    /// The token endpoint URL.
    pub token_url: String,

    /// The redirect URI registered with the authorization server.
    pub redirect_uri: String,

    /// The scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Provider-specific authorization parameters, e.g. Google's
    /// `access_type=offline` and `prompt=consent` to obtain a refresh token.
    #[serde(default)]
    pub extra_auth_params: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// Tokens returned by the authorization server, or loaded from the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used to authenticate API requests.
    pub access_token: String,

    /// The refresh token used to obtain new access tokens.
    pub refresh_token: Option<String>,

    /// When the access token expires.  `None` means "no expiry known".
    pub expiry: Option<DateTime<Utc>>,

    /// The token type (typically "Bearer").
    pub token_type: String,

    /// The scopes that were granted.
    pub scopes: Vec<String>,
}

impl OAuthTokens {
    /// Whether the access token is expired, with a 60-second safety margin.
    ///
    /// Tokens without expiry information are assumed valid.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry - chrono::Duration::seconds(EXPIRY_MARGIN_SECS),
            None => false,
        }
    }

    /// Read tokens from a vault payload.
    ///
    /// Returns `None` if there is no string `access_token`.  The `expiry`
    /// field accepts RFC 3339 and naive ISO-8601 timestamps (read as UTC).
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        let access_token = payload.get("access_token")?.as_str()?.to_owned();
        let refresh_token = payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        let expiry = payload
            .get("expiry")
            .and_then(Value::as_str)
            .and_then(parse_expiry);
        let token_type = payload
            .get("token_type")
            .and_then(Value::as_str)
            .unwrap_or("Bearer")
            .to_owned();
        let scopes = payload
            .get("scopes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            access_token,
            refresh_token,
            expiry,
            token_type,
            scopes,
        })
    }

    /// Render the tokens as a vault payload.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("access_token".into(), self.access_token.clone().into());
        if let Some(refresh) = &self.refresh_token {
            payload.insert("refresh_token".into(), refresh.clone().into());
        }
        if let Some(expiry) = self.expiry {
            payload.insert("expiry".into(), expiry.to_rfc3339().into());
        }
        payload.insert("token_type".into(), self.token_type.clone().into());
        if !self.scopes.is_empty() {
            payload.insert(
                "scopes".into(),
                Value::Array(self.scopes.iter().cloned().map(Value::from).collect()),
            );
        }
        payload
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Raw token response from the authorization server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
}

impl TokenResponse {
    /// Convert into [`OAuthTokens`], computing `expiry` from `expires_in`.
    fn into_tokens(self) -> OAuthTokens {
        let expiry = self
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        let scopes = self
            .scope
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expiry,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scopes,
        }
    }
}

/// Raw error response from the authorization server.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// PKCE helpers
// ---------------------------------------------------------------------------

/// Generate a PKCE code verifier (random 32 bytes, base64url encoded).
///
/// # Errors
///
/// Returns an error if the system CSPRNG fails.
pub fn generate_pkce_verifier() -> Result<String> {
    let mut bytes = [0u8; PKCE_VERIFIER_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::InvalidConfig {
            reason: "failed to generate PKCE verifier: CSPRNG error".to_string(),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Derive the PKCE code challenge from a code verifier using SHA-256.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn pkce_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

// ---------------------------------------------------------------------------
// Provider boundary
// ---------------------------------------------------------------------------

/// The token endpoint of an OAuth provider.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Build the URL the user visits to grant access.
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String>;

    /// Exchange an authorization code (plus its PKCE verifier) for tokens.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<OAuthTokens>;

    /// Obtain a new access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens>;
}

// ---------------------------------------------------------------------------
// OAuth flow
// ---------------------------------------------------------------------------

/// HTTP implementation of [`TokenEndpoint`] for one provider.
///
/// Stateless apart from its configuration; all flow state is passed
/// explicitly.
pub struct OAuthFlow {
    config: OAuthConfig,
    client: reqwest::Client,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(TOKEN_REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// POST a form to the token endpoint, adding client credentials.
    async fn token_request(&self, mut params: Vec<(&str, &str)>) -> Result<OAuthTokens> {
        params.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        Self::parse_token_response(response).await
    }

    /// Parse the HTTP response from the token endpoint.
    async fn parse_token_response(response: reqwest::Response) -> Result<OAuthTokens> {
        let status = response.status();

        if status.is_success() {
            let token_response: TokenResponse =
                response.json().await.map_err(|e| AuthError::RefreshFailed {
                    reason: format!("malformed token response: {e}"),
                })?;
            tracing::debug!("token exchange successful");
            return Ok(token_response.into_tokens());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error_body(status.as_u16(), &body))
    }
}

/// Map a non-2xx token endpoint body onto the error taxonomy.
fn classify_error_body(status: u16, body: &str) -> AuthError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(error_response) if error_response.error == "invalid_grant" => AuthError::InvalidGrant {
            reason: error_response
                .error_description
                .unwrap_or(error_response.error),
        },
        Ok(error_response) => AuthError::RefreshFailed {
            reason: match error_response.error_description {
                Some(description) => format!("{}: {description}", error_response.error),
                None => error_response.error,
            },
        },
        Err(_) => AuthError::RefreshFailed {
            reason: format!("HTTP {status}: {body}"),
        },
    }
}

#[async_trait]
impl TokenEndpoint for OAuthFlow {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("state", state);
            params.append_pair("code_challenge", code_challenge);
            params.append_pair("code_challenge_method", "S256");

            if !self.config.scopes.is_empty() {
                params.append_pair("scope", &self.config.scopes.join(" "));
            }
            for (key, value) in &self.config.extra_auth_params {
                params.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<OAuthTokens> {
        tracing::debug!(token_url = %self.config.token_url, "exchanging authorization code");
        self.token_request(vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens> {
        tracing::debug!(token_url = %self.config.token_url, "refreshing access token");
        self.token_request(vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> OAuthConfig {
        OAuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: Some("test-secret".to_string()),
            auth_url: "https://auth.example.com/authorize".to_string(),
            token_url: "https://auth.example.com/token".to_string(),
            redirect_uri: "http://127.0.0.1:8000/auth/callback".to_string(),
            scopes: vec!["calendar".to_string(), "calendar.events".to_string()],
            extra_auth_params: BTreeMap::from([
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ]),
        }
    }

    fn tokens_expiring_in(secs: i64) -> OAuthTokens {
        OAuthTokens {
            access_token: "tok".to_string(),
            refresh_token: None,
            expiry: Some(Utc::now() + chrono::Duration::seconds(secs)),
            token_type: "Bearer".to_string(),
            scopes: vec![],
        }
    }

    #[test]
    fn pkce_verifier_is_correct_length() {
        let verifier = generate_pkce_verifier().unwrap();
        // 32 bytes base64url encoded = 43 characters (no padding).
        assert_eq!(verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_is_base64url_sha256() {
        // RFC 7636 Appendix B test vector.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn authorization_url_includes_all_params() {
        let flow = OAuthFlow::new(test_config());
        let challenge = pkce_challenge("test-verifier");
        let url_str = flow.authorization_url("random-state", &challenge).unwrap();

        let url = Url::parse(&url_str).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();

        assert_eq!(params.get("response_type").unwrap(), "code");
        assert_eq!(params.get("client_id").unwrap(), "test-client-id");
        assert_eq!(
            params.get("redirect_uri").unwrap(),
            "http://127.0.0.1:8000/auth/callback"
        );
        assert_eq!(params.get("state").unwrap(), "random-state");
        assert_eq!(params.get("code_challenge").unwrap(), challenge.as_str());
        assert_eq!(params.get("code_challenge_method").unwrap(), "S256");
        assert_eq!(params.get("scope").unwrap(), "calendar calendar.events");
        assert_eq!(params.get("access_type").unwrap(), "offline");
        assert_eq!(params.get("prompt").unwrap(), "consent");
    }

    #[test]
    fn authorization_url_rejects_bad_auth_url() {
        let mut config = test_config();
        config.auth_url = "not a url".to_string();
        let flow = OAuthFlow::new(config);
        assert!(matches!(
            flow.authorization_url("s", "c"),
            Err(AuthError::UrlParse(_))
        ));
    }

    #[test]
    fn token_response_parsing() {
        let json = r#"{
            "access_token": "ya29.abc",
            "refresh_token": "1//def",
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "calendar calendar.events"
        }"#;

        let tokens = serde_json::from_str::<TokenResponse>(json)
            .unwrap()
            .into_tokens();

        assert_eq!(tokens.access_token, "ya29.abc");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//def"));
        assert!(tokens.expiry.unwrap() > Utc::now());
        assert_eq!(tokens.scopes, vec!["calendar", "calendar.events"]);
    }

    #[test]
    fn expiry_margin() {
        assert!(!tokens_expiring_in(3600).is_expired());
        assert!(tokens_expiring_in(30).is_expired());
        assert!(tokens_expiring_in(-100).is_expired());

        let mut no_expiry = tokens_expiring_in(0);
        no_expiry.expiry = None;
        assert!(!no_expiry.is_expired());
    }

    #[test]
    fn payload_roundtrip_keeps_fields() {
        let mut tokens = tokens_expiring_in(600);
        tokens.refresh_token = Some("1//r".into());
        tokens.scopes = vec!["calendar".into()];

        let restored = OAuthTokens::from_payload(&tokens.to_payload()).unwrap();
        assert_eq!(restored.access_token, tokens.access_token);
        assert_eq!(restored.refresh_token, tokens.refresh_token);
        assert_eq!(restored.scopes, tokens.scopes);
        assert_eq!(
            restored.expiry.unwrap().timestamp(),
            tokens.expiry.unwrap().timestamp()
        );
    }

    #[test]
    fn payload_accepts_naive_expiry() {
        let payload = json!({
            "access_token": "ya29",
            "refresh_token": null,
            "expiry": "2024-01-15T10:00:00.123456"
        });
        let tokens = OAuthTokens::from_payload(payload.as_object().unwrap()).unwrap();
        assert!(tokens.refresh_token.is_none());
        assert_eq!(
            tokens.expiry.unwrap().to_rfc3339(),
            "2024-01-15T10:00:00.123456+00:00"
        );
        assert!(tokens.is_expired());
    }

    #[test]
    fn payload_without_access_token_is_rejected() {
        let payload = json!({"refresh_token": "1//r"});
        assert!(OAuthTokens::from_payload(payload.as_object().unwrap()).is_none());
    }

    #[test]
    fn error_body_classification() {
        let invalid = classify_error_body(
            400,
            r#"{"error": "invalid_grant", "error_description": "Token has been revoked."}"#,
        );
        assert!(
            matches!(invalid, AuthError::InvalidGrant { ref reason } if reason == "Token has been revoked.")
        );

        let other = classify_error_body(401, r#"{"error": "invalid_client"}"#);
        assert!(matches!(other, AuthError::RefreshFailed { ref reason } if reason == "invalid_client"));

        let html = classify_error_body(502, "<html>bad gateway</html>");
        assert!(matches!(html, AuthError::RefreshFailed { .. }));
    }

    #[test]
    fn oauth_flow_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OAuthFlow>();
        assert_send_sync::<OAuthConfig>();
        assert_send_sync::<OAuthTokens>();
    }
}
