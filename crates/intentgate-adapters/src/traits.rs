//! Core capability trait and supporting types.
//!
//! Every tool the dispatcher can run, whether compiled in or registered at
//! runtime, implements [`Capability`].  What a capability accepts is declared
//! up front in a [`CapabilityDescriptor`] rather than discovered by
//! inspecting code, so the credential convention is explicit: a descriptor
//! with `requires_credential` receives the vault secret as [`CREDENTIAL_PARAM`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;

/// The parameter name that conventionally carries an injected credential.
pub const CREDENTIAL_PARAM: &str = "api_key";

/// Looks up a single credential field: `(tool_name, field) -> secret`.
pub type CredentialLookup = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// One declared parameter of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Where a capability comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySource {
    /// Compiled into the binary.
    Native,
    /// Registered at runtime and run behind a process boundary.
    Dynamic,
}

impl std::fmt::Display for CapabilitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Static description of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Machine-readable tool name (e.g. `create_event`, `send_message`).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// Declared parameters, in declaration order.
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Whether the tool needs a credential from the vault.
    #[serde(default)]
    pub requires_credential: bool,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
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

    /// Copy of this descriptor exposed under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Function-calling schema for this tool.
    ///
    /// Only declared parameters appear; the injected credential never does.
    pub fn to_tool_schema(&self) -> ToolSchema {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({"type": "string", "description": param.description}),
            );
            if param.required {
                required.push(Value::from(param.name.clone()));
            }
        }

        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// A tool as presented to an LLM function-calling layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// An invocable tool.
///
/// Implementations report failures as typed [`AdapterError`](crate::AdapterError)s;
/// they never panic across this boundary.
#[async_trait]
pub trait Capability: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    fn source(&self) -> CapabilitySource {
        CapabilitySource::Native
    }

    /// Vault key the tool's credential is stored under.  Differs from the
    /// descriptor name only for aliased tools.
    fn credential_name(&self) -> &str {
        &self.descriptor().name
    }

    /// Run the tool with keyword-style `params` (a JSON object).
    ///
    /// `credential` is the secret resolved by the caller, if any.
    async fn invoke(&self, params: Value, credential: Option<&str>) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> CapabilityDescriptor {
        CapabilityDescriptor::new("create_event", "Create a calendar event")
            .with_parameter(ParameterSpec::required("title", "Event title"))
            .with_parameter(ParameterSpec::optional("start_time", "ISO-8601 start"))
            .with_credential()
    }

    #[test]
    fn tool_schema_lists_declared_parameters_only() {
        let schema = calendar().to_tool_schema();
        assert_eq!(schema.name, "create_event");

        let properties = schema.parameters["properties"].as_object().unwrap();
        assert!(properties.contains_key("title"));
        assert!(properties.contains_key("start_time"));
        assert!(!properties.contains_key(CREDENTIAL_PARAM));
        assert_eq!(schema.parameters["required"], json!(["title"]));
    }

    #[test]
    fn renamed_keeps_everything_else() {
        let original = calendar();
        let alias = original.renamed("custom_create_event");
        assert_eq!(alias.name, "custom_create_event");
        assert_eq!(alias.parameters, original.parameters);
        assert!(alias.requires_credential);
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let descriptor: CapabilityDescriptor = serde_json::from_value(json!({
            "name": "weather",
            "description": "Current weather",
            "parameters": [{"name": "city"}]
        }))
        .unwrap();
        assert!(!descriptor.requires_credential);
        assert!(descriptor.parameters[0].required);
        assert_eq!(descriptor.parameter_names().collect::<Vec<_>>(), ["city"]);
    }

    #[test]
    fn capability_source_display() {
        assert_eq!(CapabilitySource::Native.to_string(), "native");
        assert_eq!(CapabilitySource::Dynamic.to_string(), "dynamic");
    }
}
