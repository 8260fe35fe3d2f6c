//! Configuration loading.
//!
//! Settings come from `intentgate.toml` (optional), then environment
//! variables, which win.  A `.env` file in the working directory is loaded
//! into the environment first.
//!
//! ```toml
//! data_dir = "data"
//! adapters_dir = "adapters"
//! execution_timeout_secs = 30
//!
//! [providers.google_calendar]
//! auth_url = "https://accounts.google.com/o/oauth2/auth"
//! token_url = "https://oauth2.googleapis.com/token"
//! redirect_uri = "http://127.0.0.1:8000/auth/callback"
//! scopes = ["https://www.googleapis.com/auth/calendar"]
//! extra_auth_params = { access_type = "offline", prompt = "consent" }
//!
//! [[fallback_rules]]
//! tool_name = "slack"
//! keywords = ["slack", "channel"]
//! parameters = { channel = "#general", message = "" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use intentgate_auth::OAuthConfig;
use intentgate_dispatch::{DispatcherConfig, KeywordRule};
use serde::Deserialize;

const ENV_PREFIX: &str = "INTENTGATE_";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vault file, key file and adapter catalog.
    pub data_dir: PathBuf,
    /// The only directory code units are loaded from.
    pub adapters_dir: PathBuf,
    pub execution_timeout_secs: u64,
    /// OAuth providers by tool name.
    pub providers: BTreeMap<String, OAuthConfig>,
    /// Keyword planner rules; the built-in rules are used when empty.
    pub fallback_rules: Vec<KeywordRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            adapters_dir: PathBuf::from("adapters"),
            execution_timeout_secs: 30,
            providers: BTreeMap::new(),
            fallback_rules: Vec::new(),
        }
    }
}

impl Config {
    /// Load `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "ignoring unreadable .env file");
            }
        }

        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `INTENTGATE_*` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = var("INTENTGATE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("INTENTGATE_ADAPTERS_DIR") {
            self.adapters_dir = PathBuf::from(dir);
        }
        if let Some(secs) = var("INTENTGATE_TIMEOUT_SECS") {
            self.execution_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("INTENTGATE_TIMEOUT_SECS is not a number: {secs}"))?;
        }

        for (tool, provider) in &mut self.providers {
            let prefix = env_prefix(tool);
            if let Some(id) = var(&format!("{prefix}_CLIENT_ID")) {
                provider.client_id = id;
            }
            if let Some(secret) = var(&format!("{prefix}_CLIENT_SECRET")) {
                provider.client_secret = Some(secret);
            }
        }
        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            execution_timeout: Duration::from_secs(self.execution_timeout_secs.max(1)),
        }
    }
}

/// `google-calendar` -> `INTENTGATE_GOOGLE_CALENDAR`.
fn env_prefix(tool: &str) -> String {
    let mut prefix = String::from(ENV_PREFIX);
    prefix.extend(tool.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    prefix
}
