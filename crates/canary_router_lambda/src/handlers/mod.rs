pub mod batch;
pub mod dispatch;
pub mod event;
pub mod poll;

#[cfg(test)]
pub(crate) mod testing;
