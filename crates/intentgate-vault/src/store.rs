//! Encrypted, file-backed credential store.
//!
//! The [`Vault`] keeps every credential in one JSON document:
//!
//! ```text
//! { "tools": { tool_name: CredentialRecord },
//!   "users": { user_id: { tool_name: CredentialRecord } } }
//! ```
//!
//! The document only ever reaches disk sealed with AES-256-GCM (see
//! [`crate::crypto`]).  Every mutation runs under one mutex around the whole
//! read-modify-write cycle: copy the current document, apply the change,
//! seal, write to a temporary file, rename over the vault file, and only then
//! publish the new document in memory.
//!
//! A vault file that cannot be decrypted or parsed is not fatal: the vault
//! starts empty and reports [`LoadStatus::Recovered`].  The unreadable file is
//! preserved next to the original with a `.corrupt` suffix and overwritten by
//! the next successful write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::keyfile::{self, KeyFile};

/// Default vault file name inside the data directory.
pub const VAULT_FILE_NAME: &str = "vault.enc";

/// Free-form credential material (tokens, keys, expiry, ...).
pub type Payload = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a credential is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// OAuth 2.0 tokens: `access_token`, optional `refresh_token` and
    /// `expiry`.
    OAuth,
    /// A static API key or bot token, returned as-is.
    StaticKey,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth => "oauth",
            Self::StaticKey => "static_key",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "oauth" => Some(Self::OAuth),
            "static_key" | "static" | "api_key" => Some(Self::StaticKey),
            _ => None,
        }
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    /// Shared by every caller; at most one per tool.
    System,
    /// Owned by a single user identity.
    User(String),
}

impl CredentialScope {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::System => None,
            Self::User(id) => Some(id),
        }
    }

    /// Stable string form, e.g. `system` or `user:alice`.
    pub fn key(&self) -> String {
        match self {
            Self::System => "system".to_owned(),
            Self::User(id) => format!("user:{id}"),
        }
    }
}

impl std::fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// A credential as held in the vault document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub tool_name: String,
    pub scope: CredentialScope,
    pub kind: CredentialKind,
    /// The secret material.  Never written to disk unencrypted.
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Return a string field of the payload.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}

/// What happened when the vault file was read at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// No vault file existed; the store starts empty.
    Fresh,
    /// The vault file was decrypted and parsed.
    Loaded,
    /// The vault file existed but could not be decrypted or parsed; the store
    /// starts empty.
    Recovered,
}

/// Tool names with stored credentials, without any secret material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    pub system_tools: Vec<String>,
    pub user_tools: BTreeMap<String, Vec<String>>,
}

/// The document sealed into the vault file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VaultData {
    #[serde(default)]
    tools: BTreeMap<String, CredentialRecord>,
    #[serde(default)]
    users: BTreeMap<String, BTreeMap<String, CredentialRecord>>,
}

impl VaultData {
    fn get(&self, tool_name: &str, scope: &CredentialScope) -> Option<&CredentialRecord> {
        match scope {
            CredentialScope::System => self.tools.get(tool_name),
            CredentialScope::User(id) => self.users.get(id).and_then(|t| t.get(tool_name)),
        }
    }

    fn insert(&mut self, record: CredentialRecord) {
        match &record.scope {
            CredentialScope::System => {
                self.tools.insert(record.tool_name.clone(), record);
            }
            CredentialScope::User(id) => {
                self.users
                    .entry(id.clone())
                    .or_default()
                    .insert(record.tool_name.clone(), record);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Encrypted credential vault backed by a single sealed file.
///
/// # Example
///
/// ```rust,no_run
/// # use intentgate_vault::store::{CredentialKind, CredentialScope, Vault};
/// # fn example() -> intentgate_vault::error::Result<()> {
/// let vault = Vault::open("data")?;
///
/// let mut payload = serde_json::Map::new();
/// payload.insert("token".into(), "xoxb-...".into());
/// vault.store("slack", CredentialKind::StaticKey, payload, CredentialScope::System)?;
///
/// let record = vault.fetch("slack", None)?;
/// println!("token = {:?}", record.field("token"));
/// # Ok(())
/// # }
/// ```
pub struct Vault {
    path: PathBuf,
    key: Vec<u8>,
    data: Mutex<VaultData>,
    load_status: LoadStatus,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("load_status", &self.load_status)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open (or create) the vault in `data_dir`, using `vault.enc` and
    /// `vault.key` inside it.  The key is generated on first use.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let key_file = KeyFile::new(KeyFile::default_path(data_dir));
        let key = key_file.load_or_create()?;
        Self::open_with_key(data_dir.join(VAULT_FILE_NAME), &key)
    }

    /// Open the vault file at `path` with an explicit 256-bit `key`.
    pub fn open_with_key(path: impl Into<PathBuf>, key: &[u8]) -> Result<Self> {
        if key.len() != crypto::KEY_LEN {
            return Err(VaultError::Internal(format!(
                "vault key must be {} bytes, got {}",
                crypto::KEY_LEN,
                key.len()
            )));
        }

        let path = path.into();
        let (data, load_status) = Self::load(&path, key);

        tracing::info!(
            path = %path.display(),
            status = ?load_status,
            system_tools = data.tools.len(),
            users = data.users.len(),
            "vault opened"
        );

        Ok(Self {
            path,
            key: key.to_vec(),
            data: Mutex::new(data),
            load_status,
        })
    }

    /// Read and decrypt the vault file, failing closed to an empty document.
    fn load(path: &Path, key: &[u8]) -> (VaultData, LoadStatus) {
        if !path.exists() {
            return (VaultData::default(), LoadStatus::Fresh);
        }

        let decoded = std::fs::read(path)
            .map_err(VaultError::from)
            .and_then(|blob| crypto::open(&blob, key))
            .and_then(|plain| serde_json::from_slice::<VaultData>(&plain).map_err(Into::into));

        match decoded {
            Ok(data) => (data, LoadStatus::Loaded),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "vault file unreadable, starting with an empty store"
                );
                let backup = sibling(path, "corrupt");
                if let Err(copy_err) = std::fs::copy(path, &backup) {
                    tracing::warn!(error = %copy_err, "could not preserve unreadable vault file");
                }
                (VaultData::default(), LoadStatus::Recovered)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the vault file was found at open time.
    pub fn load_status(&self) -> LoadStatus {
        self.load_status
    }

    /// Store a credential, overwriting any record with the same tool and
    /// scope.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidScope`] for a user scope with an empty
    /// identity and [`VaultError::InvalidPayload`] for an OAuth payload
    /// without a string `access_token`.
    pub fn store(
        &self,
        tool_name: &str,
        kind: CredentialKind,
        payload: Payload,
        scope: CredentialScope,
    ) -> Result<CredentialRecord> {
        if let CredentialScope::User(id) = &scope {
            if id.trim().is_empty() {
                return Err(VaultError::InvalidScope {
                    tool_name: tool_name.to_owned(),
                });
            }
        }

        if kind == CredentialKind::OAuth
            && !payload.get("access_token").is_some_and(Value::is_string)
        {
            return Err(VaultError::InvalidPayload {
                tool_name: tool_name.to_owned(),
                reason: "oauth credentials need a string `access_token`".into(),
            });
        }

        let mut data = self.lock()?;
        let now = Utc::now();
        let created_at = data
            .get(tool_name, &scope)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let record = CredentialRecord {
            tool_name: tool_name.to_owned(),
            scope,
            kind,
            payload,
            created_at,
            updated_at: now,
        };

        let mut next = data.clone();
        next.insert(record.clone());
        self.persist(&next)?;
        *data = next;

        tracing::info!(
            tool = %record.tool_name,
            scope = %record.scope,
            kind = %record.kind,
            "credential stored"
        );
        Ok(record)
    }

    /// Fetch a credential, preferring the user's own record and falling back
    /// to the system record.
    pub fn fetch(&self, tool_name: &str, user: Option<&str>) -> Result<CredentialRecord> {
        let data = self.lock()?;

        let user_record = user.and_then(|id| data.get(tool_name, &CredentialScope::user(id)));
        user_record
            .or_else(|| data.get(tool_name, &CredentialScope::System))
            .cloned()
            .ok_or_else(|| VaultError::CredentialNotFound {
                tool_name: tool_name.to_owned(),
                user: user.map(str::to_owned),
            })
    }

    /// Fetch the record stored under exactly `scope`, with no fallback.
    pub fn fetch_scoped(&self, tool_name: &str, scope: &CredentialScope) -> Result<CredentialRecord> {
        let data = self.lock()?;
        data.get(tool_name, scope)
            .cloned()
            .ok_or_else(|| VaultError::CredentialNotFound {
                tool_name: tool_name.to_owned(),
                user: scope.user_id().map(str::to_owned),
            })
    }

    /// Replace the payload of an existing record in place, keeping its kind
    /// and creation time.  Used for token refresh.
    pub fn replace_payload(
        &self,
        tool_name: &str,
        scope: &CredentialScope,
        payload: Payload,
    ) -> Result<CredentialRecord> {
        let mut data = self.lock()?;

        let mut record = data
            .get(tool_name, scope)
            .cloned()
            .ok_or_else(|| VaultError::CredentialNotFound {
                tool_name: tool_name.to_owned(),
                user: scope.user_id().map(str::to_owned),
            })?;
        record.payload = payload;
        record.updated_at = Utc::now();

        let mut next = data.clone();
        next.insert(record.clone());
        self.persist(&next)?;
        *data = next;

        tracing::debug!(tool = %tool_name, scope = %scope, "credential payload replaced");
        Ok(record)
    }

    /// Return a single string field from the credential for `tool_name`, or
    /// `None` if there is no such credential or field.
    pub fn lookup_field(&self, tool_name: &str, field: &str, user: Option<&str>) -> Option<String> {
        self.fetch(tool_name, user)
            .ok()
            .and_then(|record| record.field(field).map(str::to_owned))
    }

    /// List which tools have credentials, per scope.
    pub fn list_tools(&self) -> Result<VaultSummary> {
        let data = self.lock()?;
        Ok(VaultSummary {
            system_tools: data.tools.keys().cloned().collect(),
            user_tools: data
                .users
                .iter()
                .map(|(user, tools)| (user.clone(), tools.keys().cloned().collect()))
                .collect(),
        })
    }

    // -- Internal helpers ---------------------------------------------------

    fn lock(&self) -> Result<MutexGuard<'_, VaultData>> {
        self.data
            .lock()
            .map_err(|e| VaultError::Internal(format!("vault lock poisoned: {e}")))
    }

    /// Seal `data` and atomically replace the vault file with it.
    fn persist(&self, data: &VaultData) -> Result<()> {
        let plaintext = serde_json::to_vec(data)?;
        let blob = crypto::seal(&plaintext, &self.key)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = sibling(&self.path, "tmp");
        keyfile::write_private(&tmp, &blob)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::trace!(path = %self.path.display(), bytes = blob.len(), "vault persisted");
        Ok(())
    }
}

/// `vault.enc` -> `vault.enc.<suffix>`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn test_vault(dir: &Path) -> Vault {
        Vault::open(dir).unwrap()
    }

    #[test]
    fn store_and_fetch_system_credential() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault
            .store(
                "slack",
                CredentialKind::StaticKey,
                payload(json!({"token": "xoxb-1"})),
                CredentialScope::System,
            )
            .unwrap();

        let record = vault.fetch("slack", None).unwrap();
        assert_eq!(record.kind, CredentialKind::StaticKey);
        assert_eq!(record.field("token"), Some("xoxb-1"));
    }

    #[test]
    fn user_record_takes_precedence_over_system() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault
            .store(
                "figma",
                CredentialKind::StaticKey,
                payload(json!({"api_key": "shared"})),
                CredentialScope::System,
            )
            .unwrap();
        vault
            .store(
                "figma",
                CredentialKind::StaticKey,
                payload(json!({"api_key": "mine"})),
                CredentialScope::user("alice"),
            )
            .unwrap();

        assert_eq!(
            vault.fetch("figma", Some("alice")).unwrap().field("api_key"),
            Some("mine")
        );
        assert_eq!(
            vault.fetch("figma", Some("bob")).unwrap().field("api_key"),
            Some("shared")
        );
        assert_eq!(
            vault.fetch("figma", None).unwrap().field("api_key"),
            Some("shared")
        );
    }

    #[test]
    fn missing_credential_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        let result = vault.fetch("calendar", Some("alice"));
        assert!(matches!(
            result,
            Err(VaultError::CredentialNotFound { ref tool_name, .. }) if tool_name == "calendar"
        ));
    }

    #[test]
    fn empty_user_id_is_invalid_scope() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        let result = vault.store(
            "calendar",
            CredentialKind::OAuth,
            payload(json!({"access_token": "ya29"})),
            CredentialScope::user("  "),
        );
        assert!(matches!(result, Err(VaultError::InvalidScope { .. })));
    }

    #[test]
    fn oauth_payload_requires_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        let result = vault.store(
            "calendar",
            CredentialKind::OAuth,
            payload(json!({"refresh_token": "1//r"})),
            CredentialScope::user("alice"),
        );
        assert!(matches!(result, Err(VaultError::InvalidPayload { .. })));
    }

    #[test]
    fn overwrite_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        let first = vault
            .store(
                "slack",
                CredentialKind::StaticKey,
                payload(json!({"token": "old"})),
                CredentialScope::System,
            )
            .unwrap();
        let second = vault
            .store(
                "slack",
                CredentialKind::StaticKey,
                payload(json!({"token": "new"})),
                CredentialScope::System,
            )
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(vault.fetch("slack", None).unwrap().field("token"), Some("new"));
        assert_eq!(vault.list_tools().unwrap().system_tools, vec!["slack"]);
    }

    #[test]
    fn replace_payload_requires_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        let result = vault.replace_payload(
            "calendar",
            &CredentialScope::user("alice"),
            payload(json!({"access_token": "x"})),
        );
        assert!(matches!(result, Err(VaultError::CredentialNotFound { .. })));
    }

    #[test]
    fn lookup_field_returns_single_value() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault
            .store(
                "figma",
                CredentialKind::StaticKey,
                payload(json!({"api_key": "figd_1", "default_file_id": "AbC123"})),
                CredentialScope::System,
            )
            .unwrap();

        assert_eq!(
            vault.lookup_field("figma", "default_file_id", None).as_deref(),
            Some("AbC123")
        );
        assert!(vault.lookup_field("figma", "missing", None).is_none());
        assert!(vault.lookup_field("nope", "api_key", None).is_none());
    }

    #[test]
    fn list_tools_groups_by_scope() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault
            .store(
                "slack",
                CredentialKind::StaticKey,
                payload(json!({"token": "t"})),
                CredentialScope::System,
            )
            .unwrap();
        vault
            .store(
                "google_calendar",
                CredentialKind::OAuth,
                payload(json!({"access_token": "a"})),
                CredentialScope::user("alice"),
            )
            .unwrap();

        let summary = vault.list_tools().unwrap();
        assert_eq!(summary.system_tools, vec!["slack"]);
        assert_eq!(summary.user_tools["alice"], vec!["google_calendar"]);
    }

    #[test]
    fn sibling_appends_suffix() {
        assert_eq!(
            sibling(Path::new("/data/vault.enc"), "tmp"),
            PathBuf::from("/data/vault.enc.tmp")
        );
    }
}
