//! Process worker adapter -- run a registered code unit as an isolated child
//! process.
//!
//! Dynamically registered adapters are never loaded into this process.  Each
//! invocation spawns the unit with an interpreter chosen by file extension,
//! writes one JSON request to its stdin and reads one JSON reply from stdout:
//!
//! ```text
//! request:  {"entrypoint": "create_event", "params": {...}}
//! reply:    {"ok": <any JSON>}
//!       or  {"error": "message", "status": 403}
//! ```
//!
//! The child runs with a cleared environment (only `PATH` is kept), in the
//! directory of its code unit, and is killed when the invocation future is
//! dropped, so a caller-side timeout also terminates the worker.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};
use crate::traits::{Capability, CapabilityDescriptor, CapabilitySource};

/// Maximum accepted size of a worker reply (1 MB).
const MAX_REPLY_BYTES: usize = 1024 * 1024;

/// Maximum stderr kept for an error message.
const MAX_STDERR_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Interpreter selection
// ---------------------------------------------------------------------------

/// How a code unit is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Shell,
    Python,
    Node,
    /// The file is executed directly (shebang or native binary).
    Direct,
}

impl Interpreter {
    /// Pick the interpreter for a code unit from its extension.
    ///
    /// Files without an extension run directly; unknown extensions are
    /// rejected.
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("sh") => Some(Self::Shell),
            Some("py") => Some(Self::Python),
            Some("js") | Some("mjs") => Some(Self::Node),
            None => Some(Self::Direct),
            Some(_) => None,
        }
    }

    fn command(&self, program: &Path) -> tokio::process::Command {
        let mut command = match self {
            Self::Shell => tokio::process::Command::new("sh"),
            Self::Python => tokio::process::Command::new("python3"),
            Self::Node => tokio::process::Command::new("node"),
            Self::Direct => return tokio::process::Command::new(program),
        };
        command.arg(program);
        command
    }
}

impl std::fmt::Display for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shell => write!(f, "sh"),
            Self::Python => write!(f, "python3"),
            Self::Node => write!(f, "node"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessCapability
// ---------------------------------------------------------------------------

/// A capability backed by an out-of-process code unit.
pub struct ProcessCapability {
    descriptor: CapabilityDescriptor,
    program: PathBuf,
    entrypoint: String,
    interpreter: Interpreter,
}

impl ProcessCapability {
    pub fn new(
        descriptor: CapabilityDescriptor,
        program: impl Into<PathBuf>,
        entrypoint: impl Into<String>,
        interpreter: Interpreter,
    ) -> Self {
        Self {
            descriptor,
            program: program.into(),
            entrypoint: entrypoint.into(),
            interpreter,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    fn failed(&self, reason: String) -> AdapterError {
        AdapterError::ExecutionFailed {
            tool_name: self.descriptor.name.clone(),
            reason,
        }
    }

    /// Interpret the worker's stdout, falling back to its exit status.
    fn parse_reply(&self, output: &std::process::Output) -> Result<Value> {
        let tool_name = &self.descriptor.name;

        if output.stdout.len() > MAX_REPLY_BYTES {
            return Err(AdapterError::MalformedResponse {
                tool_name: tool_name.clone(),
                reason: format!("reply exceeds {MAX_REPLY_BYTES} bytes"),
            });
        }

        let reply = serde_json::from_slice::<Value>(&output.stdout);
        match reply {
            Ok(Value::Object(mut reply)) => {
                if let Some(value) = reply.remove("ok") {
                    return Ok(value);
                }
                if let Some(error) = reply.remove("error") {
                    let message = match error {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    let status = reply
                        .get("status")
                        .and_then(Value::as_u64)
                        .and_then(|s| u16::try_from(s).ok());
                    return Err(AdapterError::Provider {
                        tool_name: tool_name.clone(),
                        status,
                        message,
                    });
                }
                Err(AdapterError::MalformedResponse {
                    tool_name: tool_name.clone(),
                    reason: "reply has neither `ok` nor `error`".into(),
                })
            }
            _ if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
                Err(self.failed(format!("worker exited with {}: {stderr}", output.status)))
            }
            Ok(_) => Err(AdapterError::MalformedResponse {
                tool_name: tool_name.clone(),
                reason: "reply is not a JSON object".into(),
            }),
            Err(e) => Err(AdapterError::MalformedResponse {
                tool_name: tool_name.clone(),
                reason: format!("reply is not JSON: {e}"),
            }),
        }
    }
}

#[async_trait]
impl Capability for ProcessCapability {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn source(&self) -> CapabilitySource {
        CapabilitySource::Dynamic
    }

    /// The credential reaches the worker through `params`, where the
    /// registry's injecting wrapper puts it.
    async fn invoke(&self, params: Value, _credential: Option<&str>) -> Result<Value> {
        let request = json!({
            "entrypoint": self.entrypoint,
            "params": params,
        });
        let mut body = serde_json::to_vec(&request)?;
        body.push(b'\n');

        debug!(
            tool = %self.descriptor.name,
            program = %self.program.display(),
            interpreter = %self.interpreter,
            "spawning adapter worker"
        );

        let mut command = self.interpreter.command(&self.program);
        command
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }
        if let Some(dir) = self.program.parent() {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| self.failed(format!("failed to spawn worker: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A worker may exit without reading its request.
            if let Err(e) = stdin.write_all(&body).await {
                warn!(tool = %self.descriptor.name, error = %e, "failed to write worker request");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.failed(format!("worker process error: {e}")))?;

        self.parse_reply(&output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
