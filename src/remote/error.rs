//! Step invocation error types

use thiserror::Error;

/// Remote step failure with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InvocationError {
    pub kind: InvocationErrorKind,
    pub message: String,
}

impl InvocationError {
    pub fn new(kind: InvocationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(InvocationErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(InvocationErrorKind::Network, message)
    }

    pub fn status(code: u16, body: &str) -> Self {
        Self::new(
            InvocationErrorKind::Status(code),
            format!("Endpoint answered {code}: {}", body.trim()),
        )
    }

    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self::new(InvocationErrorKind::MalformedBody, message)
    }
}

/// Why a step invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationErrorKind {
    /// No answer within the configured timeout
    Timeout,
    /// Connection refused, DNS failure, invalid URL, ...
    Network,
    /// Non-2xx response
    Status(u16),
    /// 2xx response whose body is not JSON
    MalformedBody,
}

impl InvocationErrorKind {
    pub fn is_timeout(self) -> bool {
        matches!(self, Self::Timeout)
    }
}
