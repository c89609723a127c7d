//! Generation-service client boundary.
//!
//! All three pipeline stages talk to an external generation service
//! through the [`GenerationClient`] trait: prompt context in, raw JSON
//! out. Provider selection (OpenAI vs. DeepSeek) is a run-level value
//! resolved from the model name, never a per-call branch in the stages.

mod client;
mod error;
mod openai;

pub use client::{GenerationClient, GenerationRequest};
pub use error::{GenerationError, GenerationResult};
pub use openai::{resolve_provider, GenerationConfig, OpenAiCompatClient, Provider};
