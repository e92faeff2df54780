//! Shared canary routing domain primitives.
//!
//! This crate owns the routing decision, rollout configuration, and the
//! message/outcome contracts exchanged with the queue. It intentionally
//! excludes AWS SDK and Lambda runtime concerns; those live in
//! `canary_router_lambda`.

pub mod config;
pub mod contract;
pub mod routing;
