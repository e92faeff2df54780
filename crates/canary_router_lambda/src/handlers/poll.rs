use canary_router_core::config::ConfigSource;
use canary_router_core::contract::{BatchResult, MessageState};
use tracing::{error, warn};

use crate::adapters::invoke::FunctionInvoker;
use crate::adapters::queue::{MessageQueue, QueueError};
use crate::handlers::batch::BatchCoordinator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub received: usize,
    pub acknowledged: usize,
    pub released: usize,
    /// Ack or release calls that failed; those messages fall back to the
    /// queue's visibility timeout.
    pub queue_errors: usize,
}

/// One receive → process → settle cycle against a pull-based queue.
///
/// Only a failed receive is fatal for the cycle. The rollout snapshot is
/// loaded after the batch arrives so every cycle sees the latest settings.
pub async fn run_poll_cycle<Q, I>(
    queue: &Q,
    config_source: &dyn ConfigSource,
    coordinator: &BatchCoordinator<I>,
    batch_size: usize,
) -> Result<PollSummary, QueueError>
where
    Q: MessageQueue + ?Sized,
    I: FunctionInvoker + 'static,
{
    let batch = queue.receive(batch_size).await?;
    let mut summary = PollSummary {
        received: batch.len(),
        ..PollSummary::default()
    };
    if batch.is_empty() {
        return Ok(summary);
    }

    let result = match config_source.load() {
        Ok(config) => coordinator.process(batch, &config).await,
        Err(config_error) => {
            error!(
                error_kind = "configuration_error",
                error = %config_error,
                messages = batch.len(),
                "rollout configuration unreadable; releasing batch"
            );
            BatchResult::rejected(&batch, config_error)
        }
    };

    for (handle, outcome) in result.iter() {
        let settled = match outcome.disposition() {
            MessageState::Acked => queue.acknowledge(handle).await.map(|_| MessageState::Acked),
            _ => queue
                .release(handle)
                .await
                .map(|_| MessageState::LeftForRedelivery),
        };
        match settled {
            Ok(MessageState::Acked) => summary.acknowledged += 1,
            Ok(_) => summary.released += 1,
            Err(queue_error) => {
                warn!(error = %queue_error, "could not settle message with the queue");
                summary.queue_errors += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use canary_router_core::config::{ConfigError, RolloutConfig, StaticConfigSource};
    use canary_router_core::contract::Message;

    use super::*;
    use crate::handlers::dispatch::{Dispatcher, DEFAULT_INVOKE_TIMEOUT};
    use crate::handlers::testing::ScriptedInvoker;

    #[derive(Default)]
    struct FakeQueue {
        pending: Mutex<Vec<Message>>,
        acknowledged: Mutex<Vec<String>>,
        released: Mutex<Vec<String>>,
        fail_receive: bool,
        fail_release: bool,
    }

    impl FakeQueue {
        fn with_messages(messages: Vec<Message>) -> Self {
            Self {
                pending: Mutex::new(messages),
                ..Self::default()
            }
        }

        fn acknowledged(&self) -> Vec<String> {
            let mut handles = self.acknowledged.lock().expect("poisoned mutex").clone();
            handles.sort();
            handles
        }

        fn released(&self) -> Vec<String> {
            let mut handles = self.released.lock().expect("poisoned mutex").clone();
            handles.sort();
            handles
        }
    }

    #[async_trait]
    impl MessageQueue for FakeQueue {
        async fn receive(&self, max_messages: usize) -> Result<Vec<Message>, QueueError> {
            if self.fail_receive {
                return Err(QueueError::Receive("queue unreachable".to_string()));
            }
            let mut pending = self.pending.lock().expect("poisoned mutex");
            let take = max_messages.min(pending.len());
            Ok(pending.drain(..take).collect())
        }

        async fn acknowledge(&self, handle: &str) -> Result<(), QueueError> {
            self.acknowledged
                .lock()
                .expect("poisoned mutex")
                .push(handle.to_string());
            Ok(())
        }

        async fn release(&self, handle: &str) -> Result<(), QueueError> {
            if self.fail_release {
                return Err(QueueError::Release(format!("cannot release {handle}")));
            }
            self.released
                .lock()
                .expect("poisoned mutex")
                .push(handle.to_string());
            Ok(())
        }
    }

    struct BrokenConfigSource;

    impl ConfigSource for BrokenConfigSource {
        fn load(&self) -> Result<RolloutConfig, ConfigError> {
            Err(ConfigError::InvalidPercent {
                raw: "ten".to_string(),
            })
        }
    }

    fn coordinator() -> BatchCoordinator<Arc<ScriptedInvoker>> {
        BatchCoordinator::new(Dispatcher::new(
            Arc::new(ScriptedInvoker::new()),
            DEFAULT_INVOKE_TIMEOUT,
        ))
    }

    fn source() -> StaticConfigSource {
        StaticConfigSource::new(RolloutConfig::new("v-stable", "v-canary", 10))
    }

    fn message(id: &str, payload: &str) -> Message {
        Message::new(id, format!("receipt-{id}"), payload.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn acknowledges_successes_and_releases_failures() {
        let queue = FakeQueue::with_messages(vec![
            message("a", "{}"),
            message("b", r#"{"mode":"fail-app"}"#),
            message("c", "{}"),
        ]);

        let summary = run_poll_cycle(&queue, &source(), &coordinator(), 10)
            .await
            .expect("cycle should succeed");

        assert_eq!(
            summary,
            PollSummary {
                received: 3,
                acknowledged: 2,
                released: 1,
                queue_errors: 0,
            }
        );
        assert_eq!(queue.acknowledged(), vec!["receipt-a", "receipt-c"]);
        assert_eq!(queue.released(), vec!["receipt-b"]);
    }

    #[tokio::test]
    async fn respects_batch_size() {
        let queue = FakeQueue::with_messages(vec![message("a", "{}"), message("b", "{}")]);

        let summary = run_poll_cycle(&queue, &source(), &coordinator(), 1)
            .await
            .expect("cycle should succeed");

        assert_eq!(summary.received, 1);
        assert_eq!(queue.acknowledged(), vec!["receipt-a"]);
    }

    #[tokio::test]
    async fn receive_failure_is_fatal_for_the_cycle() {
        let queue = FakeQueue {
            fail_receive: true,
            ..FakeQueue::default()
        };

        let error = run_poll_cycle(&queue, &source(), &coordinator(), 1)
            .await
            .expect_err("receive failure should surface");

        assert_eq!(error, QueueError::Receive("queue unreachable".to_string()));
    }

    #[tokio::test]
    async fn unreadable_config_releases_every_message() {
        let queue = FakeQueue::with_messages(vec![message("a", "{}"), message("b", "{}")]);

        let summary = run_poll_cycle(&queue, &BrokenConfigSource, &coordinator(), 10)
            .await
            .expect("config errors are per message");

        assert_eq!(summary.released, 2);
        assert!(queue.acknowledged().is_empty());
    }

    #[tokio::test]
    async fn release_failure_is_counted_not_fatal() {
        let queue = FakeQueue {
            pending: Mutex::new(vec![message("a", r#"{"mode":"fail-invoke"}"#)]),
            fail_release: true,
            ..FakeQueue::default()
        };

        let summary = run_poll_cycle(&queue, &source(), &coordinator(), 10)
            .await
            .expect("cycle should succeed");

        assert_eq!(summary.queue_errors, 1);
        assert_eq!(summary.released, 0);
    }

    #[tokio::test]
    async fn empty_receive_is_a_quiet_cycle() {
        let queue = FakeQueue::default();

        let summary = run_poll_cycle(&queue, &source(), &coordinator(), 10)
            .await
            .expect("cycle should succeed");

        assert_eq!(summary, PollSummary::default());
    }
}
