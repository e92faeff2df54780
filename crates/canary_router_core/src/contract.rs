use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::ConfigError;

/// A message held by the router for the duration of one processing attempt.
///
/// `id` identifies the message in logs. `handle` is what the queue needs to
/// acknowledge or release it; depending on the delivery path this is either
/// the message id (Lambda partial batch responses) or an SQS receipt handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub handle: String,
    pub payload: Vec<u8>,
    pub receive_count: u32,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        handle: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            payload: payload.into(),
            receive_count: 1,
        }
    }

    pub fn with_receive_count(mut self, receive_count: u32) -> Self {
        self.receive_count = receive_count;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTarget {
    Stable,
    Canary,
}

impl RoutingTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Canary => "canary",
        }
    }
}

impl fmt::Display for RoutingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routing target bound to the function version address that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target: RoutingTarget,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "configuration_error")]
    Configuration,
    #[serde(rename = "invocation_error")]
    Invocation,
    #[serde(rename = "application_error")]
    Application,
    #[serde(rename = "timeout")]
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Invocation => "invocation_error",
            Self::Application => "application_error",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single message was not processed successfully.
///
/// Every variant leads to the same queue action (leave for redelivery); the
/// distinction only exists so repeated failures can be diagnosed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("invocation failed: {message}")]
    Invocation { message: String },

    #[error("function reported {function_error}: {message}")]
    Application {
        function_error: String,
        message: String,
    },

    #[error("no response within {}ms", .after.as_millis())]
    Timeout { after: Duration },
}

impl DispatchError {
    pub fn invocation(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Invocation { .. } => ErrorKind::Invocation,
            Self::Application { .. } => ErrorKind::Application,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

/// Per-message lifecycle inside one batch. `Acked` and `LeftForRedelivery`
/// are terminal; retries belong to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Received,
    Routed,
    Dispatched,
    Acked,
    LeftForRedelivery,
}

impl MessageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acked | Self::LeftForRedelivery)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// `None` when configuration failed before a target could be chosen.
    pub target: Option<RoutingTarget>,
    pub result: Result<(), DispatchError>,
    pub latency: Duration,
}

impl InvocationOutcome {
    pub fn success(target: RoutingTarget, latency: Duration) -> Self {
        Self {
            target: Some(target),
            result: Ok(()),
            latency,
        }
    }

    pub fn failure(target: Option<RoutingTarget>, error: DispatchError, latency: Duration) -> Self {
        Self {
            target,
            result: Err(error),
            latency,
        }
    }

    pub fn configuration(target: Option<RoutingTarget>, error: ConfigError) -> Self {
        Self::failure(target, DispatchError::Configuration(error), Duration::ZERO)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&DispatchError> {
        self.result.as_ref().err()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(DispatchError::kind)
    }

    pub fn disposition(&self) -> MessageState {
        if self.is_success() {
            MessageState::Acked
        } else {
            MessageState::LeftForRedelivery
        }
    }
}

/// Outcome of every message in a batch, keyed by delivery handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    outcomes: BTreeMap<String, InvocationOutcome>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message in `batch` left for redelivery with the same
    /// configuration error.
    pub fn rejected(batch: &[Message], error: ConfigError) -> Self {
        let mut result = Self::new();
        for message in batch {
            result.record(
                message.handle.clone(),
                InvocationOutcome::configuration(None, error.clone()),
            );
        }
        result
    }

    /// Records an outcome. A handle delivered twice in one batch keeps its
    /// failure if either attempt failed, so it is never acknowledged early.
    pub fn record(&mut self, handle: impl Into<String>, outcome: InvocationOutcome) {
        let handle = handle.into();
        match self.outcomes.get(&handle) {
            Some(existing) if !existing.is_success() => {}
            _ => {
                self.outcomes.insert(handle, outcome);
            }
        }
    }

    pub fn get(&self, handle: &str) -> Option<&InvocationOutcome> {
        self.outcomes.get(handle)
    }

    pub fn disposition(&self, handle: &str) -> Option<MessageState> {
        self.get(handle).map(InvocationOutcome::disposition)
    }

    pub fn acknowledged(&self) -> Vec<&str> {
        self.handles_where(MessageState::Acked)
    }

    pub fn left_for_redelivery(&self) -> Vec<&str> {
        self.handles_where(MessageState::LeftForRedelivery)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InvocationOutcome)> {
        self.outcomes
            .iter()
            .map(|(handle, outcome)| (handle.as_str(), outcome))
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in self.outcomes.values() {
            match outcome.target {
                Some(RoutingTarget::Stable) => summary.routed_stable += 1,
                Some(RoutingTarget::Canary) => summary.routed_canary += 1,
                None => {}
            }
            match outcome.error_kind() {
                None => summary.acknowledged += 1,
                Some(kind) => {
                    summary.left_for_redelivery += 1;
                    match kind {
                        ErrorKind::Configuration => summary.configuration_errors += 1,
                        ErrorKind::Invocation => summary.invocation_errors += 1,
                        ErrorKind::Application => summary.application_errors += 1,
                        ErrorKind::Timeout => summary.timeouts += 1,
                    }
                }
            }
        }
        summary
    }

    fn handles_where(&self, state: MessageState) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.disposition() == state)
            .map(|(handle, _)| handle.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub acknowledged: usize,
    pub left_for_redelivery: usize,
    pub routed_stable: usize,
    pub routed_canary: usize,
    pub configuration_errors: usize,
    pub invocation_errors: usize,
    pub application_errors: usize,
    pub timeouts: usize,
}
