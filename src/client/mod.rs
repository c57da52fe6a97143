//! # External Collaborators
//!
//! Traits the engine drives ([`Transformer`], [`OutputValidator`], [`WorkSource`])
//! together with the default validator and the built-in work sources.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use batch_engine::client::{Transformer, TransformOutput};
//! use batch_engine::config::GenerationParameters;
//! use batch_engine::error::TransformError;
//! use serde_json::{json, Value};
//!
//! struct EchoTransformer;
//!
//! #[async_trait]
//! impl Transformer for EchoTransformer {
//!     async fn transform(
//!         &self,
//!         payload: &Value,
//!         _parameters: &GenerationParameters,
//!     ) -> Result<TransformOutput, TransformError> {
//!         Ok(TransformOutput::new(json!({ "items": [payload.clone()] })))
//!     }
//! }
//! ```

pub mod sources;
pub mod traits;
pub mod validator;

pub use sources::{InMemorySource, JsonLinesSource};
pub use traits::{
    OutputValidator, TokenUsage, TransformOutput, Transformer, ValidationOutcome, WorkSource,
};
pub use validator::ConstraintValidator;
