//! Rules, steps and conversation contexts
//!
//! A [`Rule`] is an immutable template. A [`Context`] is one conversation's
//! progress through a rule's steps, owning its own deep copy of those steps.

mod transition;

pub use transition::StepOutcome;

use crate::index::IndexKey;
use crate::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remote invocation stage of a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "url")]
    pub endpoint: String,
    #[serde(rename = "exit", default)]
    pub exit_criteria: Option<Query>,
}

/// Declarative definition of which messages a chain governs and its steps
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub criteria: Option<Query>,
    pub index_fields: Vec<String>,
    /// Never empty
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Initial,
    Current,
    Passed,
}

/// Per-conversation instance of a [`Step`]
#[derive(Debug, Clone)]
pub struct StepState {
    pub endpoint: String,
    pub exit_criteria: Option<Query>,
    pub status: StepStatus,
    pub invocation_count: u32,
    pub last_response: Option<Value>,
}

impl StepState {
    fn from_template(step: &Step) -> Self {
        Self {
            endpoint: step.endpoint.clone(),
            exit_criteria: step.exit_criteria.clone(),
            status: StepStatus::Initial,
            invocation_count: 0,
            last_response: None,
        }
    }
}

/// A conversation
#[derive(Debug, Clone)]
pub struct Context {
    /// Assigned by the store on first save
    pub id: Option<String>,
    pub rule_name: String,
    pub key: IndexKey,
    pub steps: Vec<StepState>,
}

impl Context {
    /// Fresh context for `rule`, positioned on its first step
    pub fn start(rule: &Rule, key: IndexKey) -> Self {
        let mut steps: Vec<StepState> = rule.steps.iter().map(StepState::from_template).collect();
        if let Some(first) = steps.first_mut() {
            first.status = StepStatus::Current;
        }
        Self {
            id: None,
            rule_name: rule.name.clone(),
            key,
            steps,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Active while some step awaits completion
    pub fn is_active(&self) -> bool {
        self.current_index().is_some()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Current)
    }

    /// Human-readable label for logs
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("<new>")
    }
}
