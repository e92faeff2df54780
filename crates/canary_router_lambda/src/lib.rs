//! AWS-oriented adapters and handlers for canary queue routing.
//!
//! This crate owns runtime integration details (Lambda handlers, SQS and
//! Lambda invoke adapters, the dispatcher and batch coordinator) on top of
//! the routing primitives in `canary_router_core`.

pub mod adapters;
pub mod handlers;
pub mod settings;
