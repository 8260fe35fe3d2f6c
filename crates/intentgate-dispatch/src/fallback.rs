//! Keyword fallback planner.
//!
//! When no language model is available, a command is planned by keyword
//! alone: each [`KeywordRule`] names a tool, its default parameters, and the
//! words that select it.  All keywords are matched in a single pass with an
//! Aho-Corasick automaton over the lowercased command.
//!
//! ```rust
//! # use intentgate_dispatch::KeywordPlanner;
//! let planner = KeywordPlanner::with_default_rules();
//! let plan = planner.plan("Schedule a meeting and tell the Slack channel");
//! let tools: Vec<_> = plan.actions.iter().map(|a| a.tool_name.as_str()).collect();
//! assert_eq!(tools, ["google_calendar", "slack"]);
//! ```

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::plan::{Action, ExecutionPlan};

/// Reasoning attached to every plan this planner produces.
pub const FALLBACK_REASONING: &str = "fallback keyword routing";

/// Keywords that select one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub tool_name: String,
    pub keywords: Vec<String>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    json!({})
}

impl KeywordRule {
    pub fn new(tool_name: impl Into<String>, keywords: &[&str], parameters: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
            parameters,
        }
    }
}

/// Maps commands to plans by keyword.
///
/// Each rule contributes at most one action, and actions follow rule order,
/// not the order in which keywords appear in the command.
pub struct KeywordPlanner {
    rules: Vec<KeywordRule>,
    /// Rule index for each automaton pattern.
    pattern_rules: Vec<usize>,
    automaton: Option<AhoCorasick>,
}

impl KeywordPlanner {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let mut patterns = Vec::new();
        let mut pattern_rules = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            for keyword in &rule.keywords {
                let keyword = keyword.trim().to_lowercase();
                if !keyword.is_empty() {
                    patterns.push(keyword);
                    pattern_rules.push(index);
                }
            }
        }

        let automaton = if patterns.is_empty() {
            None
        } else {
            match AhoCorasick::new(&patterns) {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::error!(error = %e, "failed to build keyword automaton");
                    None
                }
            }
        };

        tracing::debug!(rules = rules.len(), keywords = patterns.len(), "keyword planner built");
        Self {
            rules,
            pattern_rules,
            automaton,
        }
    }

    /// Calendar and Slack rules, in English and Portuguese.
    pub fn default_rules() -> Vec<KeywordRule> {
        vec![
            KeywordRule::new(
                "google_calendar",
                &["calendar", "event", "meeting", "evento", "reunião"],
                json!({"title": "Event", "start_time": "", "end_time": ""}),
            ),
            KeywordRule::new(
                "slack",
                &["slack", "channel", "canal"],
                json!({"channel": "#general", "message": ""}),
            ),
        ]
    }

    pub fn with_default_rules() -> Self {
        Self::new(Self::default_rules())
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Plan `command`.  No match yields an empty plan.
    pub fn plan(&self, command: &str) -> ExecutionPlan {
        let mut selected = vec![false; self.rules.len()];
        if let Some(ac) = &self.automaton {
            let lowered = command.to_lowercase();
            for mat in ac.find_overlapping_iter(&lowered) {
                if let Some(&rule) = self.pattern_rules.get(mat.pattern().as_usize()) {
                    selected[rule] = true;
                }
            }
        }

        let actions: Vec<Action> = self
            .rules
            .iter()
            .zip(&selected)
            .filter(|(_, hit)| **hit)
            .map(|(rule, _)| Action::new(rule.tool_name.clone(), rule.parameters.clone()))
            .collect();

        tracing::debug!(actions = actions.len(), "keyword plan");
        ExecutionPlan {
            actions,
            reasoning: FALLBACK_REASONING.to_owned(),
        }
    }
}

impl Default for KeywordPlanner {
    fn default() -> Self {
        Self::with_default_rules()
    }
}
