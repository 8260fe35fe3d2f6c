//! OAuth lifecycle and credential resolution for IntentGate.
//!
//! This crate turns what the vault stores into secrets an adapter can use:
//!
//! - **OAuth 2.0 Authorization Code Flow** with PKCE (RFC 7636)
//! - **Token refresh** with per-credential serialization, so a rotating
//!   refresh token is never spent twice
//! - **Static keys** returned as stored
//!
//! # Architecture
//!
//! ```text
//! AuthManager
//! ├── TokenEndpoint  (provider boundary; OAuthFlow over HTTP)
//! ├── pending states (in memory, 10 minute lifetime)
//! └── Vault          (encrypted credential storage)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use intentgate_auth::{AuthManager, OAuthConfig};
//! use intentgate_vault::Vault;
//!
//! # async fn example() -> intentgate_auth::Result<()> {
//! let vault = Arc::new(Vault::open("data")?);
//! let manager = AuthManager::new(vault);
//!
//! manager.register_provider("github", OAuthConfig {
//!     client_id: "my-app".to_string(),
//!     client_secret: None,
//!     auth_url: "https://github.com/login/oauth/authorize".to_string(),
//!     token_url: "https://github.com/login/oauth/access_token".to_string(),
//!     redirect_uri: "http://127.0.0.1:8000/auth/callback".to_string(),
//!     scopes: vec!["repo".to_string()],
//!     extra_auth_params: Default::default(),
//! });
//!
//! let (url, state) = manager.begin_authorization("github", Some("alice"))?;
//! println!("visit {url}");
//! // ... the provider redirects back with `code` and `state` ...
//! # let code = "";
//! manager.complete_authorization(code, &state).await?;
//!
//! let token = manager.resolve_access_token("github", Some("alice")).await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod oauth;

pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use oauth::{OAuthConfig, OAuthFlow, OAuthTokens, TokenEndpoint};
