//! Execution plans and their reports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::result::DispatchResult;

/// One tool call in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool_name: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Action {
    pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// An ordered list of actions plus the planner's explanation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub reasoning: String,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// One result per planned action, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub reasoning: String,
    pub results: Vec<DispatchResult>,
}

impl PlanReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.results.len()
    }

    /// A one-line, human-readable summary of the run.
    pub fn summary(&self) -> String {
        let total = self.results.len();
        let succeeded = self.succeeded();
        if succeeded == total {
            format!("Done! Executed {total} action(s) successfully.")
        } else {
            format!(
                "Executed {succeeded} of {total} action(s) successfully. Some actions may have failed."
            )
        }
    }
}
