//! # Orchestration
//!
//! Everything that decides what happens next during a run:
//!
//! - **BatchEngine**: the lifecycle driver and per-item loop
//! - **ComponentFactory**: builds and caches the engine's components from configuration
//! - **RetryExecutor**: bounded, cancellable retries of one transform call
//! - **EngineStateMachine**: guarded lifecycle transitions
//! - **ProcessingStrategy**: checkpoint cadence and retry budget presets
//! - **RunSummary**: the final report and its exit code

pub mod engine;
pub mod factory;
pub mod retry;
pub mod state;
pub mod strategy;
pub mod summary;

pub use engine::BatchEngine;
pub use factory::ComponentFactory;
pub use retry::{RetryExecutor, RetryOutcome};
pub use state::{EngineState, EngineStateMachine, StateTransition};
pub use strategy::{ProcessingStrategy, StrategyKind};
pub use summary::{exit_code_for, PauseReason, RunCounts, RunOutcome, RunSummary};
