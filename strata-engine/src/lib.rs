//! Strata Engine
//!
//! The pipeline orchestration core:
//! - Configuration: engine settings from environment or defaults
//! - Ledger abstraction: step-run records and streamed log persistence
//! - Scheduler: dependency-ordered, concurrency-bounded step execution
//! - Run lifecycle: provision, trigger, refresh, cancel, teardown
//! - Events: broadcast of run/step transitions + outbound webhook reporter
//! - Recovery: startup reconciliation of crashed runs and orphaned contexts

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod ledger;
pub mod recovery;
pub mod run;
pub mod scheduler;

pub use config::EngineConfig;
pub use error::EngineError;
pub use events::EventBus;
pub use run::{PipelineRunner, RunSummary};
