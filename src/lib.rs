#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batch Engine
//!
//! Resilient, resumable execution of long-running generation jobs.
//!
//! ## Overview
//!
//! A job is an ordered list of work items, each sent through an external text
//! generation service and checked by a domain validator. Runs last hours and must
//! survive crashes, interrupts, rate limits, and bad output without losing or
//! duplicating work. The engine guarantees:
//!
//! - every processed item has exactly one durable record in an append-only result log
//! - a checkpoint never claims more progress than the log holds
//! - a restarted run continues from the exact next unattempted index
//! - a broken job profile is rejected before any budget is spent
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Lifecycle driver, retries, strategies, and run summaries
//! - [`persistence`] - Result log, checkpoint store, and progress side file
//! - [`recovery`] - Error classification, backoff, and checkpoint recovery
//! - [`preflight`] - Ordered validation gate run before any item
//! - [`config`] - Engine configuration and job profile resolution
//! - [`client`] - Collaborator traits and bundled sources and validators
//! - [`cost`] - Pluggable cost estimation
//! - [`models`] - Records exchanged between components
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_engine::client::{InMemorySource, Transformer};
//! use batch_engine::config::ConfigLoader;
//! use batch_engine::orchestration::{BatchEngine, ComponentFactory};
//! use batch_engine::signal::cancel_on_shutdown_signal;
//! use std::sync::Arc;
//!
//! # async fn example(transformer: Arc<dyn Transformer>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_file("config/engine.toml")?;
//! batch_engine::logging::init_structured_logging(config.logging.directory.as_deref());
//!
//! let factory = Arc::new(ComponentFactory::new(config)?);
//! let engine = BatchEngine::new(factory, transformer);
//!
//! let mut source = InMemorySource::new(vec![serde_json::json!("first topic")]);
//! let summary = engine.run(&mut source, &cancel_on_shutdown_signal()).await;
//! println!("{summary}");
//! std::process::exit(summary.exit_code());
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod cost;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod preflight;
pub mod recovery;
pub mod signal;

pub use client::{OutputValidator, Transformer, WorkSource};
pub use config::{ConfigLoader, EngineConfig};
pub use error::{BatchError, Result};
pub use models::{Checkpoint, ErrorKind, ResultRecord, ResultStatus, WorkItem};
pub use orchestration::{BatchEngine, ComponentFactory, RunOutcome, RunSummary};
