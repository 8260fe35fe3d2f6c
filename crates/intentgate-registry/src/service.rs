//! The registry service: catalog, loader and resolved tool table in one
//! owned object.
//!
//! Native capabilities and dynamically registered adapters share one
//! namespace.  A dynamic adapter whose name is taken by a native one is
//! exposed as `custom_<name>` instead of shadowing it.
//!
//! The resolved table is rebuilt off to the side and swapped in with one
//! pointer assignment, so a dispatch that already holds the old table keeps
//! using it undisturbed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use intentgate_adapters::{Capability, CredentialLookup, ToolSchema};
use serde::Serialize;

use crate::catalog::{ALIAS_PREFIX, AdapterEntry, Catalog, Registration};
use crate::error::{RegistryError, Result};
use crate::loader::{AdapterLoader, LoadDiagnostic};

// ---------------------------------------------------------------------------
// ToolTable
// ---------------------------------------------------------------------------

/// An immutable snapshot of every resolvable tool.
pub struct ToolTable {
    tools: BTreeMap<String, Arc<dyn Capability>>,
    built_at: DateTime<Utc>,
}

impl ToolTable {
    fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
            built_at: Utc::now(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// What a reload produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Exposed names of the dynamic adapters now resolvable.
    pub loaded: Vec<String>,
    /// Entries that were skipped, and why.
    pub diagnostics: Vec<LoadDiagnostic>,
}

// ---------------------------------------------------------------------------
// RegistryService
// ---------------------------------------------------------------------------

pub struct RegistryService {
    catalog: Catalog,
    loader: AdapterLoader,
    lookup: CredentialLookup,
    natives: BTreeMap<String, Arc<dyn Capability>>,
    table: RwLock<Arc<ToolTable>>,
    stale: AtomicBool,
    reload_lock: Mutex<()>,
}

impl RegistryService {
    /// Create a service.  The table starts stale, so the first resolve
    /// loads the catalog.
    pub fn new(catalog: Catalog, loader: AdapterLoader, lookup: CredentialLookup) -> Self {
        Self {
            catalog,
            loader,
            lookup,
            natives: BTreeMap::new(),
            table: RwLock::new(Arc::new(ToolTable::empty())),
            stale: AtomicBool::new(true),
            reload_lock: Mutex::new(()),
        }
    }

    /// Add a native capability under its descriptor name.
    pub fn with_native(mut self, capability: Arc<dyn Capability>) -> Self {
        let name = capability.descriptor().name.clone();
        self.natives.insert(name, capability);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Persist a registration.  The next resolve picks it up.
    pub fn register(&self, registration: Registration) -> Result<AdapterEntry> {
        let entry = self.catalog.register(registration)?;
        self.stale.store(true, Ordering::Release);
        Ok(entry)
    }

    pub fn list(&self) -> Vec<AdapterEntry> {
        self.catalog.list()
    }

    /// Rebuild the resolved table from the catalog and swap it in.
    pub fn reload(&self) -> Result<LoadReport> {
        let _guard = self
            .reload_lock
            .lock()
            .map_err(|e| RegistryError::Internal(format!("reload lock poisoned: {e}")))?;
        // Cleared first so a registration during the rebuild marks it stale again.
        self.stale.store(false, Ordering::Release);

        let entries = self.catalog.load();
        let outcome = self.loader.load_all(&entries, &self.lookup);

        let mut tools = self.natives.clone();
        let mut report = LoadReport {
            loaded: Vec::with_capacity(outcome.loaded.len()),
            diagnostics: outcome.diagnostics,
        };

        for capability in outcome.loaded {
            let name = capability.descriptor().name.clone();
            let exposed = if self.natives.contains_key(&name) {
                format!("{ALIAS_PREFIX}{name}")
            } else {
                name.clone()
            };

            if tools.contains_key(&exposed) {
                tracing::warn!(adapter = %name, alias = %exposed, "alias already taken, skipping");
                report.diagnostics.push(LoadDiagnostic {
                    name,
                    reason: format!("name `{exposed}` is already in use"),
                });
                continue;
            }

            if exposed != name {
                tracing::info!(adapter = %name, alias = %exposed, "dynamic adapter aliased");
            }
            tools.insert(exposed.clone(), Arc::new(capability.renamed(&exposed)));
            report.loaded.push(exposed);
        }

        let table = Arc::new(ToolTable {
            tools,
            built_at: Utc::now(),
        });
        let total = table.len();
        *self
            .table
            .write()
            .map_err(|e| RegistryError::Internal(format!("tool table lock poisoned: {e}")))? =
            table;

        tracing::info!(
            tools = total,
            dynamic = report.loaded.len(),
            skipped = report.diagnostics.len(),
            "tool table reloaded"
        );
        Ok(report)
    }

    /// The current table, reloading first if registrations are pending.
    pub fn table(&self) -> Arc<ToolTable> {
        if self.stale.load(Ordering::Acquire) {
            if let Err(e) = self.reload() {
                tracing::warn!(error = %e, "reload failed, keeping previous tool table");
            }
        }
        match self.table.read() {
            Ok(table) => Arc::clone(&table),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.table().get(name)
    }

    /// Function-calling schemas for every resolvable tool.
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.table()
            .tools
            .values()
            .map(|capability| capability.descriptor().to_tool_schema())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use intentgate_adapters::{CapabilityDescriptor, CapabilitySource, FnCapability};
    use serde_json::json;

    fn native(name: &str) -> Arc<dyn Capability> {
        Arc::new(FnCapability::new(
            CapabilityDescriptor::new(name, "native"),
            |_, _| async { Ok(json!("native")) },
        ))
    }

    fn service(dir: &std::path::Path) -> RegistryService {
        RegistryService::new(
            Catalog::in_dir(dir),
            AdapterLoader::new(dir),
            Arc::new(|_: &str, _: &str| None),
        )
        .with_native(native("send_message"))
    }

    #[test]
    fn natives_resolve_without_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let table = service.table();
        assert_eq!(table.names().collect::<Vec<_>>(), ["send_message"]);
        assert!(service.resolve("missing").is_none());
    }

    #[test]
    fn registration_is_picked_up_on_next_resolve() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("weather.sh"), "").unwrap();
        let service = service(dir.path());
        assert!(service.resolve("weather").is_none());

        service
            .register(Registration::new("weather", "weather.sh", "run", "Weather"))
            .unwrap();

        let resolved = service.resolve("weather").unwrap();
        assert_eq!(resolved.source(), CapabilitySource::Dynamic);
    }

    #[test]
    fn collision_gets_alias() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("slack.sh"), "").unwrap();
        let service = service(dir.path());
        service
            .register(Registration::new("send_message", "slack.sh", "run", "Custom slack"))
            .unwrap();

        let report = service.reload().unwrap();
        assert_eq!(report.loaded, ["custom_send_message"]);
        assert_eq!(
            service.resolve("send_message").unwrap().source(),
            CapabilitySource::Native
        );
        let alias = service.resolve("custom_send_message").unwrap();
        assert_eq!(alias.descriptor().name, "custom_send_message");
    }

    #[test]
    fn held_table_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("weather.sh"), "").unwrap();
        let service = service(dir.path());

        let before = service.table();
        service
            .register(Registration::new("weather", "weather.sh", "run", ""))
            .unwrap();
        let after = service.table();

        assert!(!before.contains("weather"));
        assert!(after.contains("weather"));
        assert!(after.built_at() >= before.built_at());
    }

    #[test]
    fn schemas_cover_every_tool() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let schemas = service.tool_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "send_message");
    }
}
