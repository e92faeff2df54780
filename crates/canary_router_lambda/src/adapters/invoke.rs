use std::sync::Arc;

use async_trait::async_trait;

/// Raw result of a synchronous function invocation, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResponse {
    pub status_code: i32,
    /// Set when the function ran and reported an error (`Unhandled`,
    /// `Handled`, ...).
    pub function_error: Option<String>,
    pub body: Vec<u8>,
}

impl InvokeResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code: 200,
            function_error: None,
            body: body.into(),
        }
    }
}

/// Transport-level failures: the function version never produced a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("target throttled the invocation: {0}")]
    Throttled(String),

    #[error("target unreachable: {0}")]
    Unreachable(String),

    #[error("invocation timed out in transport")]
    Timeout,

    #[error("invoke request failed: {0}")]
    Service(String),
}

#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, address: &str, payload: &[u8]) -> Result<InvokeResponse, InvokeError>;
}

#[async_trait]
impl<T: FunctionInvoker + ?Sized> FunctionInvoker for Arc<T> {
    async fn invoke(&self, address: &str, payload: &[u8]) -> Result<InvokeResponse, InvokeError> {
        (**self).invoke(address, payload).await
    }
}
