//! Stage-status reporting.
//!
//! Each validated invocation sends exactly one [`StatusUpdate`](crate::core::StatusUpdate)
//! through a [`StatusSink`].

mod sink;
mod webhook;

pub use sink::{NoOpStatusSink, StatusSink};
pub use webhook::WebhookStatusSink;
