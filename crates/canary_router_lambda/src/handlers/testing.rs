use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::invoke::{FunctionInvoker, InvokeError, InvokeResponse};

/// Invoker whose behaviour is picked from markers in the payload:
/// `fail-invoke`, `fail-throttle`, `fail-timeout`, `fail-app`, `fail-status`,
/// `fail-panic` and `hang`.
/// Anything else succeeds. Every call is recorded.
#[derive(Default)]
pub(crate) struct ScriptedInvoker {
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedInvoker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<u8>)> {
        self.calls.lock().expect("poisoned mutex").clone()
    }
}

#[async_trait]
impl FunctionInvoker for ScriptedInvoker {
    async fn invoke(&self, address: &str, payload: &[u8]) -> Result<InvokeResponse, InvokeError> {
        self.calls
            .lock()
            .expect("poisoned mutex")
            .push((address.to_string(), payload.to_vec()));

        let text = String::from_utf8_lossy(payload);
        if text.contains("hang") {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        if text.contains("fail-panic") {
            panic!("invoker crashed on {address}");
        }
        if text.contains("fail-timeout") {
            return Err(InvokeError::Timeout);
        }
        if text.contains("fail-invoke") {
            return Err(InvokeError::Unreachable("connection refused".to_string()));
        }
        if text.contains("fail-throttle") {
            return Err(InvokeError::Throttled("rate exceeded".to_string()));
        }
        if text.contains("fail-app") {
            return Ok(InvokeResponse {
                status_code: 200,
                function_error: Some("Unhandled".to_string()),
                body: br#"{"errorMessage":"order rejected","errorType":"ValueError"}"#.to_vec(),
            });
        }
        if text.contains("fail-status") {
            return Ok(InvokeResponse {
                status_code: 500,
                function_error: None,
                body: Vec::new(),
            });
        }
        Ok(InvokeResponse::ok(br#"{"status":"processed"}"#.to_vec()))
    }
}
