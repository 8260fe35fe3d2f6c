//! Adapter contract for IntentGate.
//!
//! Every tool implements [`Capability`] and is described by a
//! [`CapabilityDescriptor`].  Native tools live in this process
//! ([`FnCapability`], [`HttpRequestCapability`]); dynamically registered
//! ones run out of process through [`ProcessCapability`].

pub mod error;
pub mod http_request;
pub mod native;
pub mod process;
pub mod traits;

pub use error::{AdapterError, Result};
pub use http_request::HttpRequestCapability;
pub use native::FnCapability;
pub use process::{Interpreter, ProcessCapability};
pub use traits::{
    CREDENTIAL_PARAM, Capability, CapabilityDescriptor, CapabilitySource, CredentialLookup,
    ParameterSpec, ToolSchema,
};
