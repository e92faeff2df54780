use async_trait::async_trait;
use aws_sdk_lambda::error::{DisplayErrorContext, SdkError};
use aws_sdk_lambda::operation::invoke::InvokeError as SdkInvokeError;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use canary_router_core::contract::Message;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapters::invoke::{FunctionInvoker, InvokeError, InvokeResponse};
use crate::adapters::queue::{clamp_batch_size, MessageQueue, QueueError};

/// SQS long-poll wait used by [`SqsQueue::receive`].
const RECEIVE_WAIT_SECONDS: i32 = 20;

#[derive(Clone)]
pub struct AwsLambdaInvoker {
    lambda_client: aws_sdk_lambda::Client,
}

impl AwsLambdaInvoker {
    pub fn new(lambda_client: aws_sdk_lambda::Client) -> Self {
        Self { lambda_client }
    }
}

#[async_trait]
impl FunctionInvoker for AwsLambdaInvoker {
    async fn invoke(&self, address: &str, payload: &[u8]) -> Result<InvokeResponse, InvokeError> {
        let output = self
            .lambda_client
            .invoke()
            .function_name(address)
            .invocation_type(InvocationType::RequestResponse)
            .set_payload(Some(lambda_payload(payload).into()))
            .send()
            .await
            .map_err(classify_invoke_error)?;

        Ok(InvokeResponse {
            status_code: output.status_code(),
            function_error: output.function_error().map(str::to_string),
            body: output
                .payload()
                .map(|blob| blob.as_ref().to_vec())
                .unwrap_or_default(),
        })
    }
}

/// Lambda only accepts JSON payloads. JSON bodies pass through untouched;
/// anything else is forwarded as a JSON string.
pub fn lambda_payload(payload: &[u8]) -> Vec<u8> {
    if serde_json::from_slice::<Value>(payload).is_ok() {
        return payload.to_vec();
    }
    Value::String(String::from_utf8_lossy(payload).into_owned())
        .to_string()
        .into_bytes()
}

fn classify_invoke_error(error: SdkError<SdkInvokeError>) -> InvokeError {
    let message = DisplayErrorContext(&error).to_string();
    match &error {
        SdkError::TimeoutError(_) => InvokeError::Timeout,
        SdkError::DispatchFailure(failure) if failure.is_timeout() => InvokeError::Timeout,
        SdkError::DispatchFailure(_) => InvokeError::Unreachable(message),
        _ => match error.as_service_error() {
            Some(service_error) if service_error.is_too_many_requests_exception() => {
                InvokeError::Throttled(message)
            }
            _ => InvokeError::Service(message),
        },
    }
}

#[derive(Clone)]
pub struct SqsQueue {
    sqs_client: aws_sdk_sqs::Client,
    queue_url: String,
    release_visibility: Option<i32>,
}

impl SqsQueue {
    /// Released messages keep their visibility timeout and return once it
    /// elapses, as they do in event-source mode.
    pub fn new(sqs_client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            sqs_client,
            queue_url: queue_url.into(),
            release_visibility: None,
        }
    }

    /// Shortens the remaining visibility of released messages. Zero is
    /// ignored so a release never makes a message visible immediately.
    pub fn with_release_visibility(mut self, seconds: Option<i32>) -> Self {
        self.release_visibility = seconds.filter(|seconds| *seconds > 0);
        self
    }

    pub fn release_visibility(&self) -> Option<i32> {
        self.release_visibility
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(&self, max_messages: usize) -> Result<Vec<Message>, QueueError> {
        let max_messages = i32::try_from(clamp_batch_size(max_messages)).unwrap_or(1);
        let output = self
            .sqs_client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(RECEIVE_WAIT_SECONDS)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|error| QueueError::Receive(DisplayErrorContext(&error).to_string()))?;

        let mut messages = Vec::new();
        for received in output.messages() {
            let Some(receipt_handle) = received.receipt_handle() else {
                warn!(
                    message_id = received.message_id().unwrap_or("unknown"),
                    "skipping received message without receipt handle"
                );
                continue;
            };
            let receive_count: u32 = received
                .attributes()
                .and_then(|attributes| {
                    attributes.get(&MessageSystemAttributeName::ApproximateReceiveCount)
                })
                .and_then(|value| value.parse().ok())
                .unwrap_or(1);

            messages.push(
                Message::new(
                    received.message_id().unwrap_or(receipt_handle),
                    receipt_handle,
                    received.body().unwrap_or_default().as_bytes().to_vec(),
                )
                .with_receive_count(receive_count),
            );
        }
        Ok(messages)
    }

    async fn acknowledge(&self, handle: &str) -> Result<(), QueueError> {
        self.sqs_client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(handle)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| QueueError::Acknowledge(DisplayErrorContext(&error).to_string()))
    }

    async fn release(&self, handle: &str) -> Result<(), QueueError> {
        let Some(visibility) = self.release_visibility else {
            debug!("leaving released message to its visibility timeout");
            return Ok(());
        };
        self.sqs_client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(handle)
            .visibility_timeout(visibility)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| QueueError::Release(DisplayErrorContext(&error).to_string()))
    }
}
