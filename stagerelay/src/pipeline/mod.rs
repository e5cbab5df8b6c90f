//! Stage execution.
//!
//! - [`StageExecutor`] runs one stage invocation against its ports
//! - [`PipelineCoordinator`] hands a finished stage to the next one
//! - [`with_retry`] drives outbox redelivery

mod coordinator;
mod executor;
mod retry;

pub use coordinator::PipelineCoordinator;
pub use executor::StageExecutor;
pub use retry::{
    BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState, should_retry,
    with_retry,
};
