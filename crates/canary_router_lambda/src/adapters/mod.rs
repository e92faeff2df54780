pub mod aws;
pub mod invoke;
pub mod queue;
