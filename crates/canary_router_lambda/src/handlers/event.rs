use aws_lambda_events::event::sqs::{BatchItemFailure, SqsBatchResponse, SqsEvent};
use canary_router_core::config::ConfigSource;
use canary_router_core::contract::{BatchResult, Message};
use tracing::{error, info};

use crate::adapters::invoke::FunctionInvoker;
use crate::adapters::queue::QueueError;
use crate::handlers::batch::BatchCoordinator;

const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";

/// Converts SQS event records into router messages. The message id doubles
/// as the delivery handle because partial batch responses identify failed
/// items by message id.
///
/// A record without a message id cannot be reported back individually, so
/// the whole batch is treated as unreadable.
pub fn messages_from_sqs_event(event: &SqsEvent) -> Result<Vec<Message>, QueueError> {
    event
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| -> Result<Message, QueueError> {
            let message_id = record
                .message_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    QueueError::MalformedBatch(format!("SQS record {index} has no messageId"))
                })?;
            let receive_count: u32 = record
                .attributes
                .get(RECEIVE_COUNT_ATTRIBUTE)
                .and_then(|value| value.parse().ok())
                .unwrap_or(1);
            Ok(Message::new(
                message_id,
                message_id,
                record.body.as_deref().unwrap_or_default().as_bytes().to_vec(),
            )
            .with_receive_count(receive_count))
        })
        .collect()
}

/// Handles one Lambda invocation from an SQS event source mapping.
///
/// Messages left for redelivery are reported as batch item failures; the
/// mapping must enable `ReportBatchItemFailures` so only those are retried.
pub async fn handle_sqs_event<I: FunctionInvoker + 'static>(
    event: &SqsEvent,
    config_source: &dyn ConfigSource,
    coordinator: &BatchCoordinator<I>,
) -> Result<SqsBatchResponse, QueueError> {
    let batch = messages_from_sqs_event(event)?;
    info!(records = batch.len(), "received SQS batch");

    let result = match config_source.load() {
        Ok(config) => coordinator.process(batch, &config).await,
        Err(config_error) => {
            error!(
                error_kind = "configuration_error",
                error = %config_error,
                messages = batch.len(),
                "rollout configuration unreadable; leaving batch for redelivery"
            );
            BatchResult::rejected(&batch, config_error)
        }
    };

    Ok(batch_response(&result))
}

pub fn batch_response(result: &BatchResult) -> SqsBatchResponse {
    SqsBatchResponse {
        batch_item_failures: result
            .left_for_redelivery()
            .into_iter()
            .map(|handle| BatchItemFailure {
                item_identifier: handle.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use canary_router_core::config::{RolloutConfig, StaticConfigSource};
    use serde_json::{json, Value};

    use super::*;
    use crate::handlers::dispatch::{Dispatcher, DEFAULT_INVOKE_TIMEOUT};
    use crate::handlers::testing::ScriptedInvoker;

    fn record(message_id: Option<&str>, body: &str, receive_count: u32) -> Value {
        json!({
            "messageId": message_id,
            "receiptHandle": "AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a",
            "body": body,
            "attributes": {
                "ApproximateReceiveCount": receive_count.to_string(),
                "SentTimestamp": "1523232000000",
                "SenderId": "123456789012",
                "ApproximateFirstReceiveTimestamp": "1523232000001"
            },
            "messageAttributes": {},
            "md5OfBody": "7b270e59b47ff90a553787216d55d91d",
            "eventSource": "aws:sqs",
            "eventSourceARN": "arn:aws:sqs:ap-south-1:123456789012:MainQueue",
            "awsRegion": "ap-south-1"
        })
    }

    fn event(records: Vec<Value>) -> SqsEvent {
        serde_json::from_value(json!({ "Records": records })).expect("event should deserialize")
    }

    fn coordinator() -> (Arc<ScriptedInvoker>, BatchCoordinator<Arc<ScriptedInvoker>>) {
        let invoker = Arc::new(ScriptedInvoker::new());
        let coordinator =
            BatchCoordinator::new(Dispatcher::new(Arc::clone(&invoker), DEFAULT_INVOKE_TIMEOUT));
        (invoker, coordinator)
    }

    #[test]
    fn converts_records_to_messages() {
        let messages = messages_from_sqs_event(&event(vec![record(
            Some("059f36b4-87a3-44ab-83d2-661975830a7d"),
            r#"{"orderId": 42}"#,
            3,
        )]))
        .expect("records should convert");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].handle, "059f36b4-87a3-44ab-83d2-661975830a7d");
        assert_eq!(messages[0].payload, br#"{"orderId": 42}"#.to_vec());
        assert_eq!(messages[0].receive_count, 3);
    }

    #[test]
    fn record_without_message_id_rejects_batch() {
        let error = messages_from_sqs_event(&event(vec![
            record(Some("m-1"), "{}", 1),
            record(None, "{}", 1),
        ]))
        .expect_err("missing message id should fail");

        assert!(error.to_string().contains("SQS record 1 has no messageId"));
    }

    #[tokio::test]
    async fn reports_only_failed_messages() {
        let (_, coordinator) = coordinator();
        let source = StaticConfigSource::new(RolloutConfig::new("v-stable", "v-canary", 10));
        let event = event(vec![
            record(Some("m-1"), "{}", 1),
            record(Some("m-2"), r#"{"mode":"fail-app"}"#, 2),
            record(Some("m-3"), r#"{"mode":"fail-invoke"}"#, 1),
        ]);

        let response = handle_sqs_event(&event, &source, &coordinator)
            .await
            .expect("batch should be handled");

        let failed: Vec<_> = response
            .batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
            .collect();
        assert_eq!(failed, vec!["m-2", "m-3"]);
    }

    #[tokio::test]
    async fn single_message_scenario_invokes_one_version() {
        let (invoker, coordinator) = coordinator();
        let source = StaticConfigSource::new(RolloutConfig::new("v-stable", "v-canary", 10));
        let event = event(vec![record(Some("m-1"), r#"{"orderId": 42}"#, 1)]);

        let response = handle_sqs_event(&event, &source, &coordinator)
            .await
            .expect("batch should be handled");

        assert!(response.batch_item_failures.is_empty());
        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert!(["v-stable", "v-canary"].contains(&calls[0].0.as_str()));
    }

    #[tokio::test]
    async fn out_of_range_percent_reports_every_message() {
        let (invoker, coordinator) = coordinator();
        let source = StaticConfigSource::new(RolloutConfig::new("v-stable", "v-canary", 150));
        let event = event(vec![record(Some("m-1"), "{}", 1), record(Some("m-2"), "{}", 1)]);

        let response = handle_sqs_event(&event, &source, &coordinator)
            .await
            .expect("config errors are per message");

        assert_eq!(response.batch_item_failures.len(), 2);
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_event_reports_nothing() {
        let (_, coordinator) = coordinator();
        let source = StaticConfigSource::new(RolloutConfig::new("v-stable", "v-canary", 10));

        let response = handle_sqs_event(&event(Vec::new()), &source, &coordinator)
            .await
            .expect("empty batch should be handled");

        assert!(response.batch_item_failures.is_empty());
    }
}
