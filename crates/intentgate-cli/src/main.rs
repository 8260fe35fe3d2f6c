//! CLI entry point for IntentGate.
//!
//! This binary provides the `intentgate` command: adapter registration,
//! credential management, the OAuth authorization flow, and tool dispatch.
//! Every subcommand prints JSON on stdout; logs go to stderr.

mod cli;
mod config;

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use intentgate_adapters::{CredentialLookup, HttpRequestCapability, ParameterSpec};
use intentgate_auth::AuthManager;
use intentgate_dispatch::{Dispatcher, KeywordPlanner};
use intentgate_registry::{ALIAS_PREFIX, AdapterLoader, Catalog, Registration, RegistryService};
use intentgate_vault::{CredentialKind, CredentialScope, LoadStatus, Payload, Vault};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::Config;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("info", cli.log_json);

    let config = Config::load(&cli.config)?;
    let runtime = Runtime::build(&config)?;

    match cli.command {
        Commands::Register {
            name,
            code_reference,
            entrypoint,
            description,
            params,
            requires_credential,
        } => {
            let mut registration = Registration::new(name, code_reference, entrypoint, description);
            for param in &params {
                registration = registration.with_parameter(parse_parameter(param)?);
            }
            registration.requires_credential = requires_credential;
            cmd_register(&runtime, registration)
        }
        Commands::List => print_json(&runtime.registry().list()),
        Commands::Tools => print_json(&runtime.registry().tool_schemas()),
        Commands::SetCredential {
            tool,
            payload,
            kind,
            user,
        } => cmd_set_credential(&runtime, &tool, &payload, &kind, user),
        Commands::Credentials => print_json(&runtime.vault.list_tools()?),
        Commands::Authorize { tool, user } => cmd_authorize(&runtime, &tool, user.as_deref()).await,
        Commands::Run { tool, params, user } => {
            let params: Value =
                serde_json::from_str(&params).context("--params must be a JSON object")?;
            if !params.is_object() {
                bail!("--params must be a JSON object");
            }
            let result = runtime.dispatcher.execute(&tool, params, user.as_deref()).await;
            tracing::debug!(stats = %runtime.dispatcher.stats(), "dispatch finished");
            print_json(&result)
        }
        Commands::Plan {
            command,
            user,
            dry_run,
        } => cmd_plan(&runtime, &config, &command, user.as_deref(), dry_run).await,
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Everything a subcommand may need, wired from the config.
struct Runtime {
    vault: Arc<Vault>,
    auth: Arc<AuthManager>,
    dispatcher: Dispatcher,
}

impl Runtime {
    fn build(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data directory {}", config.data_dir.display())
        })?;

        let vault = Arc::new(Vault::open(&config.data_dir).context("failed to open vault")?);
        if vault.load_status() == LoadStatus::Recovered {
            warn!(path = %vault.path().display(), "vault could not be decrypted, starting empty");
        }

        let auth = Arc::new(AuthManager::new(Arc::clone(&vault)));
        for (tool, provider) in &config.providers {
            if provider.client_id.is_empty() {
                warn!(tool = %tool, "oauth provider has no client_id, skipping");
                continue;
            }
            auth.register_provider(tool, provider.clone());
        }

        let lookup_vault = Arc::clone(&vault);
        let lookup: CredentialLookup =
            Arc::new(move |tool: &str, field: &str| lookup_vault.lookup_field(tool, field, None));
        let registry = RegistryService::new(
            Catalog::in_dir(&config.data_dir),
            AdapterLoader::new(config.adapters_dir.clone()),
            lookup,
        )
        .with_native(Arc::new(HttpRequestCapability::new()));

        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::clone(&auth),
            config.dispatcher_config(),
        );

        info!(
            data_dir = %config.data_dir.display(),
            adapters_dir = %config.adapters_dir.display(),
            "runtime ready"
        );
        Ok(Self {
            vault,
            auth,
            dispatcher,
        })
    }

    fn registry(&self) -> &RegistryService {
        self.dispatcher.registry()
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_register(runtime: &Runtime, registration: Registration) -> Result<()> {
    let registry = runtime.registry();
    let entry = registry.register(registration)?;

    // Load right away so a broken code unit is reported now, not at dispatch.
    let report = registry.reload()?;
    let load_error = report
        .diagnostics
        .iter()
        .find(|d| d.name == entry.name)
        .map(|d| d.reason.clone());
    let exposed_as = [entry.name.clone(), format!("{ALIAS_PREFIX}{}", entry.name)]
        .into_iter()
        .find(|name| report.loaded.contains(name));

    print_json(&json!({
        "registered": entry,
        "exposed_as": exposed_as,
        "load_error": load_error,
    }))
}

fn cmd_set_credential(
    runtime: &Runtime,
    tool: &str,
    payload: &str,
    kind: &str,
    user: Option<String>,
) -> Result<()> {
    let kind = CredentialKind::parse(kind)
        .ok_or_else(|| anyhow!("unknown credential kind `{kind}` (expected static_key or oauth)"))?;
    let payload: Payload =
        serde_json::from_str(payload).context("credential payload must be a JSON object")?;
    let scope = user.map_or(CredentialScope::System, CredentialScope::User);

    let record = runtime.vault.store(tool, kind, payload, scope)?;
    print_json(&json!({
        "tool_name": record.tool_name,
        "scope": record.scope.key(),
        "kind": record.kind,
        "updated_at": record.updated_at,
    }))
}

async fn cmd_authorize(runtime: &Runtime, tool: &str, user: Option<&str>) -> Result<()> {
    let (url, state) = runtime.auth.begin_authorization(tool, user)?;
    print_json(&json!({"authorization_url": url, "state": state}))?;

    eprintln!("Open the URL above, then paste the redirect URL (or just the code):");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read authorization code")?;
    let (code, returned_state) = parse_callback(&line, &state)?;

    let record = runtime
        .auth
        .complete_authorization(&code, &returned_state)
        .await?;
    print_json(&json!({
        "tool_name": record.tool_name,
        "scope": record.scope.key(),
        "status": "authorized",
    }))
}

async fn cmd_plan(
    runtime: &Runtime,
    config: &Config,
    command: &str,
    user: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let planner = if config.fallback_rules.is_empty() {
        KeywordPlanner::with_default_rules()
    } else {
        KeywordPlanner::new(config.fallback_rules.clone())
    };
    let plan = planner.plan(command);

    if dry_run {
        return print_json(&plan);
    }
    let report = runtime.dispatcher.execute_plan(&plan, user).await;
    print_json(&json!({
        "plan": plan,
        "results": report.results,
        "summary": report.summary(),
        "stats": runtime.dispatcher.stats().snapshot(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `name[=description]`; a trailing `?` on the name marks it optional.
fn parse_parameter(spec: &str) -> Result<ParameterSpec> {
    let (name, description) = spec.split_once('=').unwrap_or((spec, ""));
    let name = name.trim();
    let (name, required) = match name.strip_suffix('?') {
        Some(stripped) => (stripped, false),
        None => (name, true),
    };
    if name.is_empty() {
        bail!("empty parameter name in `{spec}`");
    }

    let description = description.trim();
    Ok(if required {
        ParameterSpec::required(name, description)
    } else {
        ParameterSpec::optional(name, description)
    })
}

/// Extract `(code, state)` from a pasted redirect URL or bare code.
fn parse_callback(input: &str, issued_state: &str) -> Result<(String, String)> {
    let input = input.trim();
    if input.is_empty() {
        bail!("no authorization code given");
    }

    let Ok(url) = url::Url::parse(input) else {
        return Ok((input.to_owned(), issued_state.to_owned()));
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => bail!("authorization denied: {value}"),
            _ => {}
        }
    }
    let code = code.ok_or_else(|| anyhow!("redirect URL has no `code` parameter"))?;
    Ok((code, state.unwrap_or_else(|| issued_state.to_owned())))
}
