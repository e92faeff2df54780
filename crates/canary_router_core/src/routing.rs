use rand::Rng;

use crate::config::{ConfigError, RolloutConfig, MAX_CANARY_PERCENT};
use crate::contract::{Route, RoutingTarget};

/// Picks the target for one message using the calling thread's RNG.
///
/// Each call is an independent draw. The split is statistical; nothing is
/// remembered between messages.
pub fn decide(config: &RolloutConfig) -> Result<RoutingTarget, ConfigError> {
    decide_with(&mut rand::thread_rng(), config)
}

pub fn decide_with<R: Rng + ?Sized>(
    rng: &mut R,
    config: &RolloutConfig,
) -> Result<RoutingTarget, ConfigError> {
    config.validate()?;

    let target = match config.canary_percent {
        0 => RoutingTarget::Stable,
        MAX_CANARY_PERCENT => RoutingTarget::Canary,
        percent => {
            let draw: f64 = rng.gen_range(0.0..100.0);
            if draw < percent as f64 {
                RoutingTarget::Canary
            } else {
                RoutingTarget::Stable
            }
        }
    };
    Ok(target)
}

/// Decides a target and binds it to its configured address.
pub fn route(config: &RolloutConfig) -> Result<Route, ConfigError> {
    route_with(&mut rand::thread_rng(), config)
}

pub fn route_with<R: Rng + ?Sized>(
    rng: &mut R,
    config: &RolloutConfig,
) -> Result<Route, ConfigError> {
    let target = decide_with(rng, config)?;
    config.resolve(target)
}
