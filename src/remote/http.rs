//! HTTP step invoker: POST the message as JSON, read a JSON document back

use super::{InvocationError, StepInvoker};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub struct HttpStepInvoker {
    client: Client,
}

impl HttpStepInvoker {
    pub fn new(timeout: Duration) -> Result<Self, InvocationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvocationError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StepInvoker for HttpStepInvoker {
    async fn invoke(&self, endpoint: &str, message: &Value) -> Result<Value, InvocationError> {
        let response = self
            .client
            .post(endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvocationError::status(status.as_u16(), &body));
        }

        let body = response.bytes().await.map_err(|e| classify_transport_error(&e))?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| InvocationError::malformed_body(format!("Response is not JSON: {e}")))?;
        // Exit criteria and rule selection only make sense against a document
        if !value.is_object() {
            return Err(InvocationError::malformed_body("Response is not a JSON object"));
        }
        Ok(value)
    }
}

fn classify_transport_error(err: &reqwest::Error) -> InvocationError {
    if err.is_timeout() {
        InvocationError::timeout(format!("Request timed out: {err}"))
    } else {
        InvocationError::network(format!("Request failed: {err}"))
    }
}
