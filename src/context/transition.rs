//! Step-cycle transitions
//!
//! Pure state changes applied around one remote invocation: count the
//! attempt, record the response, then advance or hold.

use super::{Context, StepStatus};
use crate::query;
use serde_json::Value;

/// Result of evaluating a step's response against its exit criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Exit criteria met and the next step is now current
    Advanced,
    /// Exit criteria not met; the same step stays current
    Held,
    /// Exit criteria met on the last step; the context is terminal
    Completed,
}

impl Context {
    /// Count an invocation attempt on the current step.
    ///
    /// Returns the endpoint to call, or `None` if the context is terminal.
    pub fn begin_invocation(&mut self) -> Option<String> {
        let index = self.current_index()?;
        let step = &mut self.steps[index];
        step.invocation_count += 1;
        Some(step.endpoint.clone())
    }

    /// Store `response` on the current step and move the chain forward if the
    /// step's exit criteria accept it.
    pub fn record_response(&mut self, response: Value) -> StepOutcome {
        let Some(index) = self.current_index() else {
            return StepOutcome::Completed;
        };

        let step = &mut self.steps[index];
        let passed = query::matches(&response, step.exit_criteria.as_ref());
        step.last_response = Some(response);
        if !passed {
            return StepOutcome::Held;
        }

        step.status = StepStatus::Passed;
        match self.steps.get_mut(index + 1) {
            Some(next) => {
                next.status = StepStatus::Current;
                StepOutcome::Advanced
            }
            None => StepOutcome::Completed,
        }
    }
}
