//! CLI argument definitions for IntentGate.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! running subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// IntentGate -- credential vault and tool dispatcher.
#[derive(Parser)]
#[command(
    name = "intentgate",
    version,
    about = "IntentGate -- credential vault and tool dispatcher",
    long_about = "Stores service credentials encrypted at rest, registers tool adapters at \
                  runtime, and dispatches tool calls with the right credential injected."
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "intentgate.toml")]
    pub config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a dynamic adapter from the adapters directory.
    Register {
        /// Tool name the adapter is exposed under.
        name: String,
        /// File name of the code unit inside the adapters directory.
        code_reference: String,
        /// Function the worker should run.
        entrypoint: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Declared parameter as `name[=description]`; suffix the name with
        /// `?` to make it optional.  Repeatable.
        #[arg(long = "param", value_name = "NAME[=DESCRIPTION]")]
        params: Vec<String>,
        /// Inject the tool's vault credential as `api_key`.
        #[arg(long)]
        requires_credential: bool,
    },

    /// List registered dynamic adapters.
    List,

    /// Print the function-calling schema of every resolvable tool.
    Tools,

    /// Store a credential in the vault.
    SetCredential {
        /// Tool the credential belongs to.
        tool: String,
        /// JSON object with the secret fields, e.g. `{"api_key": "..."}`.
        payload: String,
        /// `static_key` or `oauth`.
        #[arg(long, default_value = "static_key")]
        kind: String,
        /// Store for this user instead of system-wide.
        #[arg(long)]
        user: Option<String>,
    },

    /// List tools with stored credentials (no secrets are printed).
    Credentials,

    /// Run the OAuth authorization flow for a tool.
    Authorize {
        tool: String,
        #[arg(long)]
        user: Option<String>,
    },

    /// Dispatch one tool call.
    Run {
        tool: String,
        /// JSON object of parameters.
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long)]
        user: Option<String>,
    },

    /// Plan a command with keyword rules and execute the plan.
    Plan {
        command: String,
        #[arg(long)]
        user: Option<String>,
        /// Print the plan without executing it.
        #[arg(long)]
        dry_run: bool,
    },
}
