//! Vault key file management.
//!
//! The vault key is a single 256-bit AES key generated on first run and
//! stored base64-encoded in its own file, separate from the vault data.
//! There is no escrow: losing the key file makes every stored credential
//! permanently unrecoverable.
//!
//! On Unix the key file is created with mode `0600` (owner read/write only).
//! An existing key file that cannot be parsed is reported as an error rather
//! than replaced, because regenerating it would orphan the existing vault.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::crypto;
use crate::error::{Result, VaultError};

/// File-backed storage for the vault key.
#[derive(Debug, Clone)]
pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default key file location: `<data_dir>/vault.key`.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("vault.key")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the key, generating and persisting a new one if the file does not
    /// exist yet.
    pub fn load_or_create(&self) -> Result<Vec<u8>> {
        if self.exists() {
            return self.load();
        }

        let key = crypto::generate_key()?;
        self.write(&key)?;
        tracing::info!(path = %self.path.display(), "generated new vault key");
        Ok(key.to_vec())
    }

    /// Load an existing key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKeyFile`] if the content is not base64 or
    /// does not decode to [`crypto::KEY_LEN`] bytes.
    pub fn load(&self) -> Result<Vec<u8>> {
        let encoded = std::fs::read_to_string(&self.path)?;
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| self.invalid(format!("not valid base64: {e}")))?;

        if key.len() != crypto::KEY_LEN {
            return Err(self.invalid(format!(
                "expected {} key bytes, found {}",
                crypto::KEY_LEN,
                key.len()
            )));
        }

        tracing::debug!(path = %self.path.display(), "loaded vault key");
        Ok(key)
    }

    fn write(&self, key: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_private(&self.path, STANDARD.encode(key).as_bytes())
    }

    fn invalid(&self, reason: String) -> VaultError {
        VaultError::InvalidKeyFile {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

/// Write `data` to `path`, restricting permissions to the owner on Unix.
pub(crate) fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        // `mode` only applies on creation.
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, data)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
