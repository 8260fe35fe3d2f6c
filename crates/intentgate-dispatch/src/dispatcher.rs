//! The dispatcher: one tool call from name to normalized result.
//!
//! For every action the dispatcher
//!
//! 1. resolves the tool against the registry's current table,
//! 2. resolves a credential for the caller when the tool declares one,
//! 3. invokes the tool under the execution timeout,
//!
//! and folds every failure along the way into a [`DispatchResult`].  An
//! adapter that panics or hangs costs its own action and nothing else.

use std::sync::Arc;
use std::time::{Duration, Instant};

use intentgate_adapters::{AdapterError, Capability};
use intentgate_auth::{AuthError, AuthManager};
use intentgate_registry::RegistryService;
use serde_json::Value;

use crate::plan::{ExecutionPlan, PlanReport};
use crate::result::{DispatchResult, ErrorKind};
use crate::stats::DispatchStats;

/// Default per-invocation time limit.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub execution_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<RegistryService>,
    auth: Arc<AuthManager>,
    config: DispatcherConfig,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(registry: Arc<RegistryService>, auth: Arc<AuthManager>, config: DispatcherConfig) -> Self {
        Self {
            registry,
            auth,
            config,
            stats: DispatchStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<RegistryService> {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Run one tool call on behalf of `caller` (`None` for system scope).
    pub async fn execute(&self, tool_name: &str, parameters: Value, caller: Option<&str>) -> DispatchResult {
        let started = Instant::now();
        let result = self.dispatch(tool_name, parameters, caller).await;
        self.stats.record(&result, started.elapsed());
        result
    }

    /// Run every action of `plan` in order.  A failed action does not stop
    /// the ones after it.
    pub async fn execute_plan(&self, plan: &ExecutionPlan, caller: Option<&str>) -> PlanReport {
        let mut results = Vec::with_capacity(plan.actions.len());
        for action in &plan.actions {
            results.push(
                self.execute(&action.tool_name, action.parameters.clone(), caller)
                    .await,
            );
        }

        let report = PlanReport {
            reasoning: plan.reasoning.clone(),
            results,
        };
        tracing::info!(
            actions = report.results.len(),
            succeeded = report.succeeded(),
            "plan executed"
        );
        report
    }

    // -- Internal helpers ---------------------------------------------------

    async fn dispatch(&self, tool_name: &str, parameters: Value, caller: Option<&str>) -> DispatchResult {
        let Some(capability) = self.registry.resolve(tool_name) else {
            tracing::warn!(tool = %tool_name, "dispatch to unknown tool");
            return DispatchResult::failure(
                tool_name,
                ErrorKind::ToolNotFound,
                format!("tool `{tool_name}` not found"),
            );
        };

        let credential = if capability.descriptor().requires_credential {
            match self.credential_for(tool_name, capability.as_ref(), caller).await {
                Ok(secret) => Some(secret),
                Err(result) => return result,
            }
        } else {
            None
        };

        tracing::info!(tool = %tool_name, user = ?caller, source = %capability.source(), "dispatching");
        let result = self.invoke(tool_name, capability, parameters, credential).await;
        match &result.error {
            None => tracing::info!(tool = %tool_name, "dispatch succeeded"),
            Some(error) => {
                tracing::warn!(tool = %tool_name, kind = ?result.error_kind, error = %error, "dispatch failed");
            }
        }
        result
    }

    async fn credential_for(
        &self,
        tool_name: &str,
        capability: &dyn Capability,
        caller: Option<&str>,
    ) -> Result<String, DispatchResult> {
        let vault_key = capability.credential_name();
        self.auth
            .resolve_access_token(vault_key, caller)
            .await
            .map_err(|e| {
                let kind = credential_error_kind(&e);
                let message = match kind {
                    ErrorKind::CredentialNotFound => {
                        format!("no credentials configured for `{vault_key}`")
                    }
                    _ => e.to_string(),
                };
                DispatchResult::failure(tool_name, kind, message)
            })
    }

    async fn invoke(
        &self,
        tool_name: &str,
        capability: Arc<dyn Capability>,
        parameters: Value,
        credential: Option<String>,
    ) -> DispatchResult {
        let limit = self.config.execution_timeout;
        // Spawned so a panicking adapter surfaces as a join error.
        let mut task =
            tokio::spawn(async move { capability.invoke(parameters, credential.as_deref()).await });

        match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(Ok(details))) => DispatchResult::success(tool_name, details),
            Ok(Ok(Err(e))) => {
                let kind = match e {
                    AdapterError::Timeout { .. } => ErrorKind::Timeout,
                    _ => ErrorKind::InvocationFailed,
                };
                DispatchResult::failure(tool_name, kind, e.to_string())
            }
            Ok(Err(join_error)) => DispatchResult::failure(
                tool_name,
                ErrorKind::InvocationFailed,
                format!("adapter aborted: {join_error}"),
            ),
            Err(_) => {
                // Dropping the invocation kills any worker process behind it.
                task.abort();
                DispatchResult::failure(
                    tool_name,
                    ErrorKind::Timeout,
                    format!("no result within {}s", limit.as_secs_f64()),
                )
            }
        }
    }
}

fn credential_error_kind(error: &AuthError) -> ErrorKind {
    if error.is_not_found() {
        ErrorKind::CredentialNotFound
    } else if matches!(error, AuthError::ReauthorizationRequired { .. }) {
        ErrorKind::ReauthorizationRequired
    } else {
        ErrorKind::CredentialError
    }
}
