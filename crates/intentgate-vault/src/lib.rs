//! Encrypted credential vault for IntentGate.
//!
//! Credentials for every tool adapter live in one JSON document, sealed with
//! AES-256-GCM before it touches the disk.  The 256-bit key is generated on
//! first run and kept in a separate owner-only key file.
//!
//! # Modules
//!
//! - [`crypto`]: AES-256-GCM seal/open of the vault document.
//! - [`keyfile`]: generate-once key file with restrictive permissions.
//! - [`store`]: scoped credential records, fail-closed loading, atomic writes.
//! - [`error`]: Unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use intentgate_vault::{CredentialKind, CredentialScope, Vault};
//!
//! # fn example() -> intentgate_vault::Result<()> {
//! let vault = Vault::open("data")?;
//!
//! let mut payload = serde_json::Map::new();
//! payload.insert("access_token".into(), "ya29...".into());
//! payload.insert("refresh_token".into(), "1//0g...".into());
//! vault.store(
//!     "google_calendar",
//!     CredentialKind::OAuth,
//!     payload,
//!     CredentialScope::user("alice"),
//! )?;
//!
//! let record = vault.fetch("google_calendar", Some("alice"))?;
//! assert_eq!(record.kind, CredentialKind::OAuth);
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod keyfile;
pub mod store;

pub use error::{Result, VaultError};
pub use keyfile::KeyFile;
pub use store::{
    CredentialKind, CredentialRecord, CredentialScope, LoadStatus, Payload, Vault, VaultSummary,
};
