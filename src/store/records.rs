//! On-disk formats for rule sources and context records

use crate::context::{Context, Step, StepState, StepStatus};
use crate::index::IndexKey;
use crate::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One rule as declared in a rules file (before name qualification)
#[derive(Debug, Deserialize)]
pub struct RuleDocument {
    pub name: String,
    #[serde(default)]
    pub criteria: Option<Query>,
    #[serde(default)]
    pub index: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<Step>,
}

/// A persisted context
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub rule_name: String,
    pub index: IndexKey,
    pub nodes: Vec<NodeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub url: String,
    pub state: StepStatus,
    #[serde(default)]
    pub calls_count: u32,
    pub result: NodeResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeResult {
    #[serde(default)]
    pub criteria: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

impl ContextRecord {
    pub fn new(context: &Context, id: &str) -> Self {
        Self {
            id: id.to_string(),
            rule_name: context.rule_name.clone(),
            index: context.key.clone(),
            nodes: context
                .steps
                .iter()
                .map(|step| NodeRecord {
                    url: step.endpoint.clone(),
                    state: step.status,
                    calls_count: step.invocation_count,
                    result: NodeResult {
                        criteria: step.exit_criteria.clone(),
                        message: step.last_response.clone(),
                    },
                })
                .collect(),
        }
    }

    pub fn into_context(self) -> Context {
        Context {
            id: Some(self.id),
            rule_name: self.rule_name,
            key: self.index,
            steps: self
                .nodes
                .into_iter()
                .map(|node| StepState {
                    endpoint: node.url,
                    exit_criteria: node.result.criteria,
                    status: node.state,
                    invocation_count: node.calls_count,
                    last_response: node.result.message,
                })
                .collect(),
        }
    }
}
