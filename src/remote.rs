//! Remote step invocation
//!
//! Each step of a rule names an endpoint that receives the current message
//! and answers with a JSON document.

mod error;
mod http;

#[allow(unused_imports)] // Public API re-exports
pub use error::{InvocationError, InvocationErrorKind};
pub use http::HttpStepInvoker;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Calls a step's endpoint
#[async_trait]
pub trait StepInvoker: Send + Sync {
    async fn invoke(&self, endpoint: &str, message: &Value) -> Result<Value, InvocationError>;
}

#[async_trait]
impl<T: StepInvoker + ?Sized> StepInvoker for Arc<T> {
    async fn invoke(&self, endpoint: &str, message: &Value) -> Result<Value, InvocationError> {
        (**self).invoke(endpoint, message).await
    }
}

/// Logging wrapper for step invokers
pub struct LoggingInvoker {
    inner: Arc<dyn StepInvoker>,
}

impl LoggingInvoker {
    pub fn new(inner: Arc<dyn StepInvoker>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StepInvoker for LoggingInvoker {
    async fn invoke(&self, endpoint: &str, message: &Value) -> Result<Value, InvocationError> {
        let start = std::time::Instant::now();
        let result = self.inner.invoke(endpoint, message).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    endpoint = %endpoint,
                    duration_ms = %duration.as_millis(),
                    "Step invocation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    endpoint = %endpoint,
                    duration_ms = %duration.as_millis(),
                    kind = ?e.kind,
                    error = %e.message,
                    "Step invocation failed"
                );
            }
        }

        result
    }
}
