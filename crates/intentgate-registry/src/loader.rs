//! Adapter loader -- turns catalog entries into invocable capabilities.
//!
//! Loading never fails as a whole.  An entry whose code unit is missing or
//! cannot be run is skipped and reported as a [`LoadDiagnostic`]; the rest
//! of the catalog stays usable.
//!
//! Every loaded capability is wrapped in [`CredentialInjecting`], which fills
//! in the `api_key` parameter when the descriptor asks for a credential and
//! the caller did not pass one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use intentgate_adapters::{
    CREDENTIAL_PARAM, Capability, CapabilityDescriptor, CapabilitySource, CredentialLookup,
    Interpreter, ProcessCapability,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::{CatalogEntry, validate_code_reference, validate_identifier, validate_name};
use crate::error::{RegistryError, Result};

// ---------------------------------------------------------------------------
// Unit loading
// ---------------------------------------------------------------------------

/// Turns one code unit into a capability.
pub trait UnitLoader: Send + Sync {
    fn load(
        &self,
        name: &str,
        entry: &CatalogEntry,
        program: &Path,
    ) -> Result<Arc<dyn Capability>>;
}

/// Runs each code unit as an isolated child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessUnitLoader;

impl UnitLoader for ProcessUnitLoader {
    fn load(
        &self,
        name: &str,
        entry: &CatalogEntry,
        program: &Path,
    ) -> Result<Arc<dyn Capability>> {
        if !program.is_file() {
            return Err(RegistryError::LoadFailed {
                name: name.to_owned(),
                reason: format!("code unit `{}` not found", program.display()),
            });
        }
        let interpreter =
            Interpreter::for_path(program).ok_or_else(|| RegistryError::LoadFailed {
                name: name.to_owned(),
                reason: format!("no interpreter for `{}`", entry.code_reference),
            })?;

        Ok(Arc::new(ProcessCapability::new(
            entry.descriptor(name),
            program,
            entry.entrypoint.clone(),
            interpreter,
        )))
    }
}

// ---------------------------------------------------------------------------
// Credential injection
// ---------------------------------------------------------------------------

/// Wraps a capability so a missing credential parameter is filled in.
///
/// The exposed descriptor is the inner one (optionally renamed), so callers
/// see the declared parameter list, never the injected one.
pub struct CredentialInjecting {
    inner: Arc<dyn Capability>,
    descriptor: CapabilityDescriptor,
    credential_name: String,
    lookup: CredentialLookup,
}

impl CredentialInjecting {
    pub fn new(inner: Arc<dyn Capability>, lookup: CredentialLookup) -> Self {
        let descriptor = inner.descriptor().clone();
        Self {
            credential_name: descriptor.name.clone(),
            descriptor,
            inner,
            lookup,
        }
    }

    /// Expose under `name`; credentials are still looked up under the
    /// registered name.
    pub fn renamed(mut self, name: &str) -> Self {
        self.descriptor = self.descriptor.renamed(name);
        self
    }
}

fn has_credential(params: &Value) -> bool {
    match params.get(CREDENTIAL_PARAM) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[async_trait]
impl Capability for CredentialInjecting {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn source(&self) -> CapabilitySource {
        self.inner.source()
    }

    fn credential_name(&self) -> &str {
        &self.credential_name
    }

    async fn invoke(
        &self,
        mut params: Value,
        credential: Option<&str>,
    ) -> intentgate_adapters::Result<Value> {
        if self.descriptor.requires_credential && !has_credential(&params) {
            let secret = credential
                .map(str::to_owned)
                .or_else(|| (self.lookup)(&self.credential_name, CREDENTIAL_PARAM));

            match secret {
                Some(secret) => {
                    if params.is_null() {
                        params = Value::Object(Map::new());
                    }
                    if let Some(map) = params.as_object_mut() {
                        map.insert(CREDENTIAL_PARAM.to_owned(), Value::String(secret));
                    }
                }
                None => {
                    tracing::debug!(tool = %self.descriptor.name, "no credential available to inject");
                }
            }
        }
        self.inner.invoke(params, credential).await
    }
}

// ---------------------------------------------------------------------------
// AdapterLoader
// ---------------------------------------------------------------------------

/// Why a catalog entry was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadDiagnostic {
    pub name: String,
    pub reason: String,
}

/// Result of loading a whole catalog.
pub struct LoadOutcome {
    pub loaded: Vec<CredentialInjecting>,
    pub diagnostics: Vec<LoadDiagnostic>,
}

/// Loads catalog entries from a fixed adapters directory.
pub struct AdapterLoader {
    adapters_dir: PathBuf,
    units: Arc<dyn UnitLoader>,
}

impl AdapterLoader {
    pub fn new(adapters_dir: impl Into<PathBuf>) -> Self {
        Self::with_unit_loader(adapters_dir, Arc::new(ProcessUnitLoader))
    }

    pub fn with_unit_loader(adapters_dir: impl Into<PathBuf>, units: Arc<dyn UnitLoader>) -> Self {
        Self {
            adapters_dir: adapters_dir.into(),
            units,
        }
    }

    pub fn adapters_dir(&self) -> &Path {
        &self.adapters_dir
    }

    /// Load every entry, wrapping each with credential injection.
    pub fn load_all(
        &self,
        entries: &BTreeMap<String, CatalogEntry>,
        lookup: &CredentialLookup,
    ) -> LoadOutcome {
        let mut loaded = Vec::with_capacity(entries.len());
        let mut diagnostics = Vec::new();

        for (name, entry) in entries {
            match self.load_one(name, entry) {
                Ok(capability) => {
                    tracing::info!(adapter = %name, entrypoint = %entry.entrypoint, "adapter loaded");
                    loaded.push(CredentialInjecting::new(capability, Arc::clone(lookup)));
                }
                Err(e) => {
                    tracing::warn!(adapter = %name, error = %e, "skipping adapter");
                    let reason = match e {
                        RegistryError::LoadFailed { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    diagnostics.push(LoadDiagnostic {
                        name: name.clone(),
                        reason,
                    });
                }
            }
        }

        LoadOutcome {
            loaded,
            diagnostics,
        }
    }

    fn load_one(&self, name: &str, entry: &CatalogEntry) -> Result<Arc<dyn Capability>> {
        // The catalog file may have been edited by hand.
        validate_name(name)?;
        validate_identifier("entrypoint", &entry.entrypoint)?;
        validate_code_reference(&entry.code_reference)?;

        let program = self.adapters_dir.join(&entry.code_reference);
        self.units.load(name, entry, &program)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
