//! # Stagerelay
//!
//! A three-stage market analysis pipeline where every stage runs as its own
//! short-lived invocation.
//!
//! Each invocation:
//!
//! - validates its inputs before touching anything external
//! - asks one text-generation provider for its analysis
//! - stores the text under a run-scoped, collision-free key
//! - reports its status once to the caller's webhook
//! - hands everything the next stage needs to a dispatcher, as one event
//!
//! The final stage writes a combined artifact with all three outputs instead
//! of dispatching.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagerelay::prelude::*;
//!
//! let config = RelayConfig::load(Path::new("relay.toml"))?;
//! let request = StageRequest::new(
//!     WorkKey::new("BTCUSD")?,
//!     StageInput::FastAssessment { snapshot: MarketSnapshot::new(65000.0, 1.2, 1_000_000.0)? },
//!     "https://dash.example.com/hook",
//! )?;
//! let ports = StagePorts::new(provider_for_stage(&config, request.stage())?, Arc::new(FsResultStore::new("results")));
//! let outcome = StageExecutor::from_config(ports, &config).execute(&request).await?;
//! println!("{}", outcome.summary_line());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod stages;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ProviderKind, RelayConfig, StageModelConfig, StageSettings};
    pub use crate::context::{MarketSnapshot, StageInput, WorkKey};
    pub use crate::core::{
        ArtifactHandle, ArtifactSlot, CombinedArtifact, PipelineState, PipelineStatus, StageName,
        StageOutput, StageRequest, StatusUpdate, TriggerEvent,
    };
    pub use crate::dispatch::{DisabledDispatcher, Dispatcher, GitHubDispatcher, Outbox, OutboxDispatcher};
    pub use crate::errors::{
        DispatchError, ErrorKind, PersistenceError, ProviderError, RelayError, ReportError,
        ValidationError,
    };
    pub use crate::events::{NoOpStatusSink, StatusSink, WebhookStatusSink};
    pub use crate::pipeline::{PipelineCoordinator, RetryConfig, StageExecutor};
    pub use crate::providers::{provider_for_stage, AnalysisContext, AnalysisProvider};
    pub use crate::stages::{StageOutcome, StagePorts};
    pub use crate::store::{FsResultStore, ResultStore};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
