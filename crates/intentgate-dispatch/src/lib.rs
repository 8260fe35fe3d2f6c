//! Dispatch layer for IntentGate.
//!
//! The [`Dispatcher`] takes a tool name, parameters and caller, resolves the
//! tool through the registry and the credential through the auth manager,
//! and returns a normalized [`DispatchResult`] whatever happens.  Plans of
//! several actions run in declaration order via
//! [`Dispatcher::execute_plan`]; partial success is an ordinary outcome.
//!
//! Every call is counted in [`DispatchStats`].
//!
//! [`KeywordPlanner`] is the rule-based planner used when no language model
//! is available.

pub mod dispatcher;
pub mod fallback;
pub mod plan;
pub mod result;
pub mod stats;

pub use dispatcher::{DEFAULT_EXECUTION_TIMEOUT, Dispatcher, DispatcherConfig};
pub use fallback::{FALLBACK_REASONING, KeywordPlanner, KeywordRule};
pub use plan::{Action, ExecutionPlan, PlanReport};
pub use result::{DispatchResult, DispatchStatus, ErrorKind};
pub use stats::{DispatchStats, StatsSnapshot};
