use async_trait::async_trait;
use canary_router_core::contract::Message;

/// SQS accepts between 1 and 10 messages per receive call.
pub const MAX_RECEIVE_BATCH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("failed to receive messages: {0}")]
    Receive(String),

    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    #[error("failed to acknowledge message: {0}")]
    Acknowledge(String),

    #[error("failed to release message: {0}")]
    Release(String),
}

/// The queue as seen by the router. Redelivery, backoff and dead-lettering
/// stay inside the queue; the router only acknowledges or releases.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn receive(&self, max_messages: usize) -> Result<Vec<Message>, QueueError>;

    /// Removes the message from the queue.
    async fn acknowledge(&self, handle: &str) -> Result<(), QueueError>;

    /// Gives the message back for redelivery. The queue decides when it
    /// becomes visible again.
    async fn release(&self, handle: &str) -> Result<(), QueueError>;
}

pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(1, MAX_RECEIVE_BATCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped_to_receive_limits() {
        assert_eq!(clamp_batch_size(0), 1);
        assert_eq!(clamp_batch_size(1), 1);
        assert_eq!(clamp_batch_size(7), 7);
        assert_eq!(clamp_batch_size(50), MAX_RECEIVE_BATCH);
    }
}
