//! Registry catalog -- the persisted list of dynamically registered adapters.
//!
//! The catalog is a JSON file mapping adapter name to its registration:
//!
//! ```json
//! {
//!   "weather": {
//!     "code_reference": "weather.py",
//!     "entrypoint": "current_weather",
//!     "description": "Current weather for a city",
//!     "parameters": [{"name": "city", "description": "", "required": true}],
//!     "requires_credential": true,
//!     "registered_at": "2026-01-01T00:00:00Z"
//!   }
//! }
//! ```
//!
//! Code units live in one fixed adapters directory and `code_reference` is a
//! bare file name inside it.  Every identifier is validated before the
//! filesystem is touched, so a registration can never point outside that
//! directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use chrono::{DateTime, Utc};
use intentgate_adapters::{CapabilityDescriptor, ParameterSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Default catalog file name inside the data directory.
pub const CATALOG_FILE_NAME: &str = "registry.json";

/// Prefix given to a dynamic adapter whose name collides with a native one.
/// Reserved: no registration may start with it.
pub const ALIAS_PREFIX: &str = "custom_";

// `None` only if a pattern failed to compile, in which case nothing matches.
static IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{0,63}$").ok());

static FILE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").ok());

fn pattern_matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A stored registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// File name of the code unit inside the adapters directory.
    pub code_reference: String,
    /// Function the worker should run.
    pub entrypoint: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub requires_credential: bool,
    pub registered_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// The capability descriptor declared by this registration.
    pub fn descriptor(&self, name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: name.to_owned(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            requires_credential: self.requires_credential,
        }
    }
}

/// A catalog entry together with its name, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterEntry {
    pub name: String,
    #[serde(flatten)]
    pub entry: CatalogEntry,
}

/// A registration request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    pub name: String,
    pub code_reference: String,
    pub entrypoint: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub requires_credential: bool,
}

impl Registration {
    pub fn new(
        name: impl Into<String>,
        code_reference: impl Into<String>,
        entrypoint: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            code_reference: code_reference.into(),
            entrypoint: entrypoint.into(),
            description: description.into(),
            parameters: Vec::new(),
            requires_credential: false,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    /// Check every identifier in the registration.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_identifier("entrypoint", &self.entrypoint)?;
        validate_code_reference(&self.code_reference)?;
        for param in &self.parameters {
            validate_identifier("parameter", &param.name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_identifier(field: &'static str, value: &str) -> Result<()> {
    if pattern_matches(&IDENTIFIER, value) {
        Ok(())
    } else {
        Err(RegistryError::InvalidIdentifier {
            field,
            value: value.to_owned(),
            reason: "expected a letter or `_` followed by up to 63 letters, digits, `_` or `-`"
                .into(),
        })
    }
}

/// An adapter name: an identifier outside the reserved alias namespace.
pub fn validate_name(value: &str) -> Result<()> {
    validate_identifier("name", value)?;
    if value.starts_with(ALIAS_PREFIX) {
        return Err(RegistryError::InvalidIdentifier {
            field: "name",
            value: value.to_owned(),
            reason: format!("the `{ALIAS_PREFIX}` prefix is reserved for aliases"),
        });
    }
    Ok(())
}

pub fn validate_code_reference(value: &str) -> Result<()> {
    if value.contains("..") || !pattern_matches(&FILE_NAME, value) {
        return Err(RegistryError::InvalidIdentifier {
            field: "code_reference",
            value: value.to_owned(),
            reason: "expected a bare file name inside the adapters directory".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// File-backed adapter catalog.
///
/// Registrations are read-modify-write under a mutex, so concurrent
/// `register` calls on one `Catalog` never lose each other's entries.
pub struct Catalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Catalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Catalog at `<data_dir>/registry.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CATALOG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry.
    ///
    /// A missing file is an empty catalog.  An unreadable one is logged and
    /// also treated as empty.
    pub fn load(&self) -> BTreeMap<String, CatalogEntry> {
        match self.read() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "catalog unreadable, treating as empty"
                );
                BTreeMap::new()
            }
        }
    }

    /// Add or overwrite a registration.  Does not load any code.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidIdentifier`] if any identifier is unsafe;
    /// this is checked before the catalog file is read.
    /// [`RegistryError::Catalog`] if the existing file cannot be parsed.  The
    /// file is left as it is so no earlier registration is lost.
    pub fn register(&self, registration: Registration) -> Result<AdapterEntry> {
        registration.validate()?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| RegistryError::Internal(format!("catalog lock poisoned: {e}")))?;

        let mut entries = self.read().inspect_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "catalog unreadable, refusing to register");
        })?;

        let entry = CatalogEntry {
            code_reference: registration.code_reference,
            entrypoint: registration.entrypoint,
            description: registration.description,
            parameters: registration.parameters,
            requires_credential: registration.requires_credential,
            registered_at: Utc::now(),
        };
        let replaced = entries
            .insert(registration.name.clone(), entry.clone())
            .is_some();
        self.write(&entries)?;

        tracing::info!(adapter = %registration.name, replaced, "adapter registered");
        Ok(AdapterEntry {
            name: registration.name,
            entry,
        })
    }

    /// All entries, sorted by name.
    pub fn list(&self) -> Vec<AdapterEntry> {
        self.load()
            .into_iter()
            .map(|(name, entry)| AdapterEntry { name, entry })
            .collect()
    }

    // -- Internal helpers ---------------------------------------------------

    fn read(&self) -> Result<BTreeMap<String, CatalogEntry>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| RegistryError::Catalog {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write(&self, entries: &BTreeMap<String, CatalogEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
