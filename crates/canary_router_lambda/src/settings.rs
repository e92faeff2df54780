use std::time::Duration;

use canary_router_core::config::ConfigError;

use crate::adapters::queue::clamp_batch_size;
use crate::handlers::dispatch::DEFAULT_INVOKE_TIMEOUT;

pub const INVOKE_TIMEOUT_VAR: &str = "INVOKE_TIMEOUT_MS";
pub const BATCH_SIZE_VAR: &str = "ROUTER_BATCH_SIZE";
pub const QUEUE_URL_VAR: &str = "ROUTER_QUEUE_URL";
pub const RELEASE_VISIBILITY_VAR: &str = "ROUTER_RELEASE_VISIBILITY_SECS";

/// SQS caps a visibility timeout at twelve hours.
pub const MAX_RELEASE_VISIBILITY_SECS: u64 = 43_200;

/// One message per batch keeps the blast radius of a slow downstream call
/// to a single message.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Process-level settings read once at startup. The rollout itself is read
/// per batch through `ConfigSource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    pub invoke_timeout: Duration,
    pub batch_size: usize,
    pub queue_url: Option<String>,
    /// Poller only. `None` leaves released messages to the queue's own
    /// visibility timeout.
    pub release_visibility_secs: Option<i32>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_url: None,
            release_visibility_secs: None,
        }
    }
}

impl RouterSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(raw) = lookup(INVOKE_TIMEOUT_VAR) {
            let millis = parse_positive(INVOKE_TIMEOUT_VAR, &raw)?;
            settings.invoke_timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup(BATCH_SIZE_VAR) {
            let requested = parse_positive(BATCH_SIZE_VAR, &raw)?;
            settings.batch_size =
                clamp_batch_size(usize::try_from(requested).unwrap_or(usize::MAX));
        }
        settings.queue_url = lookup(QUEUE_URL_VAR)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if let Some(raw) = lookup(RELEASE_VISIBILITY_VAR) {
            let seconds = parse_positive(RELEASE_VISIBILITY_VAR, &raw)?;
            let seconds = i32::try_from(seconds)
                .ok()
                .filter(|seconds| (*seconds as u64) <= MAX_RELEASE_VISIBILITY_SECS)
                .ok_or_else(|| ConfigError::InvalidSetting {
                    name: RELEASE_VISIBILITY_VAR.to_string(),
                    raw: raw.clone(),
                })?;
            settings.release_visibility_secs = Some(seconds);
        }

        Ok(settings)
    }

    pub fn require_queue_url(&self) -> Result<&str, ConfigError> {
        self.queue_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingSetting {
                name: QUEUE_URL_VAR.to_string(),
            })
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| ConfigError::InvalidSetting {
            name: name.to_string(),
            raw: raw.to_string(),
        })
}
