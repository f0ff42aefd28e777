//! Mock step invoker for engine tests

use crate::remote::{InvocationError, StepInvoker};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

// ============================================================================
// Mock Step Invoker
// ============================================================================

/// Returns queued responses per endpoint and records every call
#[derive(Default)]
pub struct MockInvoker {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, InvocationError>>>>,
    /// Record of all `(endpoint, message)` pairs received
    pub calls: Mutex<Vec<(String, Value)>>,
    delay: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Wait on `barrier` inside every call
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Queue a successful response for `endpoint`
    pub fn queue(&self, endpoint: &str, response: Value) {
        self.push(endpoint, Ok(response));
    }

    /// Queue a failure for `endpoint`
    pub fn queue_error(&self, endpoint: &str, error: InvocationError) {
        self.push(endpoint, Err(error));
    }

    fn push(&self, endpoint: &str, result: Result<Value, InvocationError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(result);
    }

    /// Messages sent to `endpoint`, in call order
    pub fn calls_to(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StepInvoker for MockInvoker {
    async fn invoke(&self, endpoint: &str, message: &Value) -> Result<Value, InvocationError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), message.clone()));

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(InvocationError::network(format!(
                    "No mock response queued for {endpoint}"
                )))
            })
    }
}
