use std::time::Duration;

use canary_router_core::contract::{DispatchError, InvocationOutcome, Message, Route};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::adapters::invoke::{FunctionInvoker, InvokeError, InvokeResponse};

/// Upper bound on one downstream call. Kept below the queue's 30 second
/// visibility window so a stuck call cannot burn a whole redelivery cycle.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(20);

const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Invokes the chosen function version and classifies what happened.
///
/// The dispatcher never touches the queue; acknowledging is left to the
/// batch coordinator.
pub struct Dispatcher<I> {
    invoker: I,
    invoke_timeout: Duration,
}

impl<I: FunctionInvoker> Dispatcher<I> {
    pub fn new(invoker: I, invoke_timeout: Duration) -> Self {
        Self {
            invoker,
            invoke_timeout,
        }
    }

    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout
    }

    pub async fn invoke(&self, route: &Route, message: &Message) -> InvocationOutcome {
        let started_at = Instant::now();
        let call = self.invoker.invoke(&route.address, &message.payload);
        let result = match tokio::time::timeout(self.invoke_timeout, call).await {
            Err(_) => Err(DispatchError::Timeout {
                after: self.invoke_timeout,
            }),
            Ok(Err(InvokeError::Timeout)) => Err(DispatchError::Timeout {
                after: started_at.elapsed(),
            }),
            Ok(Err(error)) => Err(DispatchError::invocation(error.to_string())),
            Ok(Ok(response)) => classify_response(response),
        };
        let latency = started_at.elapsed();

        match &result {
            Ok(()) => info!(
                message_id = %message.id,
                target = %route.target,
                address = %route.address,
                latency_ms = latency.as_millis() as u64,
                "invocation succeeded"
            ),
            Err(error) => warn!(
                message_id = %message.id,
                target = %route.target,
                address = %route.address,
                receive_count = message.receive_count,
                latency_ms = latency.as_millis() as u64,
                error_kind = %error.kind(),
                error = %error,
                "invocation failed"
            ),
        }

        InvocationOutcome {
            target: Some(route.target),
            result,
            latency,
        }
    }
}

fn classify_response(response: InvokeResponse) -> Result<(), DispatchError> {
    if let Some(function_error) = response.function_error {
        return Err(DispatchError::Application {
            function_error,
            message: error_message(&response.body),
        });
    }
    if !(200..300).contains(&response.status_code) {
        return Err(DispatchError::invocation(format!(
            "unexpected status code {}",
            response.status_code
        )));
    }
    Ok(())
}

/// Extracts `errorMessage` from a Lambda error body, falling back to the raw
/// body text.
fn error_message(body: &[u8]) -> String {
    let from_json = serde_json::from_slice::<Value>(body).ok().and_then(|value| {
        value
            .get("errorMessage")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let mut message = from_json.unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    if message.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}
