use serde::Serialize;

use crate::contract::{Route, RoutingTarget};

pub const STABLE_TARGET_VAR: &str = "STABLE_ALIAS_ARN";
pub const CANARY_TARGET_VAR: &str = "CANARY_ALIAS_ARN";
pub const CANARY_PERCENT_VAR: &str = "CANARY_PERCENT";
pub const DEFAULT_CANARY_PERCENT: i64 = 0;
pub const MAX_CANARY_PERCENT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("CANARY_PERCENT must be an integer between 0 and 100, got {raw:?}")]
    InvalidPercent { raw: String },

    #[error("canary percent {0} is outside [0, 100]")]
    PercentOutOfRange(i64),

    #[error("{0} target address is not configured")]
    TargetNotConfigured(RoutingTarget),

    #[error("{name} has invalid value {raw:?}")]
    InvalidSetting { name: String, raw: String },

    #[error("{name} must be configured")]
    MissingSetting { name: String },
}

/// Snapshot of the rollout state, read once per batch and never mutated
/// while the batch is in flight.
///
/// Unset or blank addresses are kept as `None`. That is only an error when
/// a decision actually routes to the missing target, so a stable-only
/// deployment with `canary_percent == 0` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutConfig {
    pub stable_target: Option<String>,
    pub canary_target: Option<String>,
    pub canary_percent: i64,
}

impl RolloutConfig {
    pub fn new(
        stable_target: impl Into<String>,
        canary_target: impl Into<String>,
        canary_percent: i64,
    ) -> Self {
        Self {
            stable_target: normalize_address(Some(stable_target.into())),
            canary_target: normalize_address(Some(canary_target.into())),
            canary_percent,
        }
    }

    /// Builds a snapshot from named settings. `lookup` returns `None` for
    /// unset names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let canary_percent = match lookup(CANARY_PERCENT_VAR) {
            Some(raw) => parse_percent(&raw)?,
            None => DEFAULT_CANARY_PERCENT,
        };

        Ok(Self {
            stable_target: normalize_address(lookup(STABLE_TARGET_VAR)),
            canary_target: normalize_address(lookup(CANARY_TARGET_VAR)),
            canary_percent,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_CANARY_PERCENT).contains(&self.canary_percent) {
            return Err(ConfigError::PercentOutOfRange(self.canary_percent));
        }
        Ok(())
    }

    pub fn address(&self, target: RoutingTarget) -> Option<&str> {
        match target {
            RoutingTarget::Stable => self.stable_target.as_deref(),
            RoutingTarget::Canary => self.canary_target.as_deref(),
        }
    }

    pub fn resolve(&self, target: RoutingTarget) -> Result<Route, ConfigError> {
        let address = self
            .address(target)
            .ok_or(ConfigError::TargetNotConfigured(target))?;
        Ok(Route {
            target,
            address: address.to_string(),
        })
    }
}

/// Parses a string-encoded integer percentage. Range is checked separately
/// by [`RolloutConfig::validate`] so an out-of-range value is reported as
/// such instead of as a parse failure.
pub fn parse_percent(raw: &str) -> Result<i64, ConfigError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidPercent {
            raw: raw.to_string(),
        })
}

fn normalize_address(value: Option<String>) -> Option<String> {
    value
        .map(|address| address.trim().to_string())
        .filter(|address| !address.is_empty())
}

/// Supplies a fresh rollout snapshot for each batch.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<RolloutConfig, ConfigError>;
}

/// Reads `STABLE_ALIAS_ARN`, `CANARY_ALIAS_ARN` and `CANARY_PERCENT` from the
/// process environment on every load, so a control-plane update to the
/// function configuration takes effect on the next batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self) -> Result<RolloutConfig, ConfigError> {
        RolloutConfig::from_lookup(|name| std::env::var(name).ok())
    }
}

#[derive(Debug, Clone)]
pub struct StaticConfigSource {
    config: RolloutConfig,
}

impl StaticConfigSource {
    pub fn new(config: RolloutConfig) -> Self {
        Self { config }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<RolloutConfig, ConfigError> {
        Ok(self.config.clone())
    }
}
