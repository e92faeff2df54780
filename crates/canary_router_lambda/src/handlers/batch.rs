use std::sync::Arc;
use std::time::Duration;

use canary_router_core::config::{ConfigError, RolloutConfig};
use canary_router_core::contract::{
    BatchResult, DispatchError, InvocationOutcome, Message, MessageState, RoutingTarget,
};
use canary_router_core::routing;
use tracing::{debug, error, info, warn};

use crate::adapters::invoke::FunctionInvoker;
use crate::handlers::dispatch::Dispatcher;

/// Drives every message of a batch through routing and dispatch.
///
/// Messages run as independent tokio tasks. One message's failure, slowness
/// or panic never affects another, and nothing is retried here: anything
/// not successful is left for the queue to redeliver.
pub struct BatchCoordinator<I> {
    dispatcher: Arc<Dispatcher<I>>,
}

impl<I: FunctionInvoker + 'static> BatchCoordinator<I> {
    pub fn new(dispatcher: Dispatcher<I>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub async fn process(&self, batch: Vec<Message>, config: &RolloutConfig) -> BatchResult {
        let mut result = BatchResult::new();
        if batch.is_empty() {
            return result;
        }

        let config = Arc::new(config.clone());
        let mut tasks = Vec::with_capacity(batch.len());
        for message in batch {
            let handle = message.handle.clone();
            let message_id = message.id.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            let config = Arc::clone(&config);
            let task =
                tokio::spawn(async move { process_message(&dispatcher, &config, &message).await });
            tasks.push((handle, message_id, task));
        }

        // Tasks are already running; awaiting them in order only collects.
        for (handle, message_id, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(
                        message_id = %message_id,
                        error = %join_error,
                        "message task did not complete"
                    );
                    InvocationOutcome::failure(
                        None,
                        DispatchError::invocation(format!("message task failed: {join_error}")),
                        Duration::ZERO,
                    )
                }
            };
            debug!(
                message_id = %message_id,
                state = ?outcome.disposition(),
                "message settled"
            );
            result.record(handle, outcome);
        }

        let summary = result.summary();
        info!(
            total = summary.total,
            acknowledged = summary.acknowledged,
            left_for_redelivery = summary.left_for_redelivery,
            routed_stable = summary.routed_stable,
            routed_canary = summary.routed_canary,
            configuration_errors = summary.configuration_errors,
            invocation_errors = summary.invocation_errors,
            application_errors = summary.application_errors,
            timeouts = summary.timeouts,
            canary_percent = config.canary_percent,
            "batch processed"
        );
        result
    }
}

async fn process_message<I: FunctionInvoker>(
    dispatcher: &Dispatcher<I>,
    config: &RolloutConfig,
    message: &Message,
) -> InvocationOutcome {
    debug!(
        message_id = %message.id,
        receive_count = message.receive_count,
        state = ?MessageState::Received,
        "message received"
    );

    let target = match routing::decide(config) {
        Ok(target) => target,
        Err(error) => return configuration_failure(message, None, error),
    };
    let route = match config.resolve(target) {
        Ok(route) => route,
        Err(error) => return configuration_failure(message, Some(target), error),
    };
    debug!(
        message_id = %message.id,
        target = %route.target,
        state = ?MessageState::Routed,
        "message routed"
    );

    let outcome = dispatcher.invoke(&route, message).await;
    debug!(
        message_id = %message.id,
        target = %route.target,
        state = ?MessageState::Dispatched,
        "message dispatched"
    );
    outcome
}

fn configuration_failure(
    message: &Message,
    target: Option<RoutingTarget>,
    error: ConfigError,
) -> InvocationOutcome {
    warn!(
        message_id = %message.id,
        target = target.map(RoutingTarget::as_str).unwrap_or("undecided"),
        error_kind = "configuration_error",
        error = %error,
        "message left for redelivery until rollout configuration is fixed"
    );
    InvocationOutcome::configuration(target, error)
}
