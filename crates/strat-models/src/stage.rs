//! Intermediate outputs passed between pipeline stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::blueprint::TopicBlueprint;

/// Strategy-quality classification computed by stage 2.
///
/// Advisory metadata for the approver; approval is never blocked by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeoMode {
    /// Measurable search volume found; full SEO + GEO strategy
    #[default]
    FullSeoGeo,
    /// No measurable search volume, but every topic has GEO queries;
    /// AI-search discovery is the distribution channel
    GeoOnly,
    /// No measurable search volume and at least one topic lacks GEO
    /// queries; flagged for mandatory human scrutiny
    HitlRequired,
}

impl SeoMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeoMode::FullSeoGeo => "full_seo_geo",
            SeoMode::GeoOnly => "geo_only",
            SeoMode::HitlRequired => "hitl_required",
        }
    }
}

impl fmt::Display for SeoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of stage 1: intent extraction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IntentOutput {
    /// Description of the target audience persona
    pub target_persona: String,
    /// Pain points extracted from the raw research
    pub core_pain_points: Vec<String>,
    /// Emotional drivers (frustration, fear, hope, ...)
    pub underlying_emotions: Vec<String>,
    /// Original raw text excerpt kept for the audit trail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input_snippet: Option<String>,
}

/// Output of stage 2: SEO/GEO strategy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StrategyOutput {
    /// Proposed hub/spoke topics with per-topic SEO metadata
    pub proposed_topics: Vec<TopicBlueprint>,
    /// Overarching keyword theme for the whole cluster
    pub cluster_primary_keyword: String,
    /// Combined monthly search volume across all keywords; `None` means
    /// no measurable demand was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_total_search_volume: Option<u64>,
    /// Strategy-quality classification (see [`SeoMode`])
    #[serde(default)]
    pub seo_mode: SeoMode,
    /// Operator-facing explanation of why this mode was chosen
    #[serde(default)]
    pub seo_mode_reason: String,
}
