//! Dynamic adapter registry for IntentGate.
//!
//! - [`catalog`]: the persisted registrations (`registry.json`) and
//!   identifier validation.
//! - [`loader`]: turns registrations into capabilities, wrapping each with
//!   credential injection; broken entries become diagnostics.
//! - [`service`]: [`RegistryService`], which owns the resolved tool table
//!   and swaps it atomically on reload.

pub mod catalog;
pub mod error;
pub mod loader;
pub mod service;

pub use catalog::{ALIAS_PREFIX, AdapterEntry, Catalog, CatalogEntry, Registration};
pub use error::{RegistryError, Result};
pub use loader::{
    AdapterLoader, CredentialInjecting, LoadDiagnostic, LoadOutcome, ProcessUnitLoader, UnitLoader,
};
pub use service::{LoadReport, RegistryService, ToolTable};
