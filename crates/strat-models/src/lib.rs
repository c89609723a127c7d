//! Shared data models for the strategy engine.
//!
//! This crate provides Serde-serializable types for:
//! - Pipeline runs and the run status state machine
//! - Stage outputs (intent, SEO/GEO strategy, topic cluster)
//! - The content blueprint payload sent to the production system

pub mod blueprint;
pub mod run;
pub mod stage;

// Re-export common types
pub use blueprint::{
    Blueprint, BlueprintError, ContentType, GeoIntent, GeoQuery, InternalLink, LinkType,
    SearchIntent, SeoMetadata, Tone, TopicBlueprint, TopicRole,
};
pub use run::{InvalidTransition, Run, RunId, RunStatus};
pub use stage::{IntentOutput, SeoMode, StrategyOutput};
