//! Stage 2: SEO/GEO strategy.
//!
//! Turns the extracted intent into proposed hub/spoke topics with keyword
//! data, then classifies the strategy's quality (`seo_mode`). The
//! classification is advisory metadata surfaced to the approver; it never
//! blocks approval.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use strat_llm::{GenerationClient, GenerationRequest};
use strat_models::{IntentOutput, SeoMode, StrategyOutput, TopicBlueprint};

use crate::error::StageError;
use crate::stages::parse_stage_output;

const SYSTEM_PROMPT: &str = "\
You are an SEO and AI-search (GEO) strategist. From the persona and pain \
points you are given, propose one hub topic and 2-3 spoke topics for a \
content cluster, each with SEO metadata and conversational GEO queries.

Return ONLY a JSON object with this shape:
{
  \"proposed_topics\": [
    {
      \"topic_id\": \"stable id\",
      \"title\": \"content title\",
      \"slug\": \"url-safe-slug\",
      \"role\": \"hub\" | \"spoke\",
      \"hook\": \"opening angle\",
      \"key_points\": [\"point\", ...],
      \"seo\": {
        \"primary_keyword\": \"keyword\",
        \"secondary_keywords\": [\"keyword\", ...],
        \"search_volume\": 1200 | null,
        \"search_intent\": \"informational\" | \"commercial\" | \"transactional\" | \"navigational\"
      },
      \"geo_queries\": [
        {\"query_text\": \"conversational query\", \"intent\": \"informational\" | \"comparison\" | \"solution\", \"constraints\": [\"...\"]}
      ]
    }
  ],
  \"cluster_primary_keyword\": \"overarching keyword\",
  \"estimated_total_search_volume\": 5400 | null
}";

/// The shape the generation service returns; `seo_mode` is computed
/// locally, never trusted from the model.
#[derive(Debug, Deserialize)]
struct StrategyDraft {
    proposed_topics: Vec<TopicBlueprint>,
    cluster_primary_keyword: String,
    #[serde(default)]
    estimated_total_search_volume: Option<u64>,
}

/// Outcome of the SEO dead-end policy.
#[derive(Debug, Clone)]
pub struct SeoModeDecision {
    pub mode: SeoMode,
    pub reason: String,
}

/// Classify strategy quality from keyword signals.
///
/// - Measurable volume at or above `min_viable_volume` → full SEO + GEO.
/// - No measurable volume, but every topic carries GEO queries → the
///   cluster pivots to AI-search-only distribution.
/// - No measurable volume and at least one topic without GEO queries →
///   mandatory human scrutiny before dispatch.
pub fn evaluate_seo_mode(
    topics: &[TopicBlueprint],
    estimated_total_volume: Option<u64>,
    min_viable_volume: u64,
) -> SeoModeDecision {
    let cluster_keyword = topics
        .first()
        .map(|t| t.seo.primary_keyword.as_str())
        .unwrap_or("unknown");

    if let Some(volume) = estimated_total_volume {
        if volume >= min_viable_volume {
            return SeoModeDecision {
                mode: SeoMode::FullSeoGeo,
                reason: "SEO volume found - full strategy applied".to_string(),
            };
        }
    }

    let missing_geo: Vec<&str> = topics
        .iter()
        .filter(|t| t.geo_queries.is_empty())
        .map(|t| t.topic_id.as_str())
        .collect();

    if missing_geo.is_empty() {
        return SeoModeDecision {
            mode: SeoMode::GeoOnly,
            reason: format!(
                "No measurable SEO search volume for '{cluster_keyword}'. Strategy pivots to \
                 GEO (AI search engine) optimisation only; content remains discoverable via \
                 AI assistants."
            ),
        };
    }

    SeoModeDecision {
        mode: SeoMode::HitlRequired,
        reason: format!(
            "Critical gap: no SEO volume for '{cluster_keyword}' and topics [{}] have no GEO \
             queries. Human review required before this blueprint is sent to production.",
            missing_geo.join(", ")
        ),
    }
}

pub struct StrategyStage {
    llm: Arc<dyn GenerationClient>,
    min_viable_volume: u64,
}

impl StrategyStage {
    pub fn new(llm: Arc<dyn GenerationClient>, min_viable_volume: u64) -> Self {
        Self {
            llm,
            min_viable_volume,
        }
    }

    pub async fn run(&self, intent: &IntentOutput, model: &str) -> Result<StrategyOutput, StageError> {
        let user_prompt = format!(
            "## Target Persona\n{}\n\n## Pain Points\n{}\n\n## Underlying Emotions\n{}",
            intent.target_persona,
            bulleted(&intent.core_pain_points),
            bulleted(&intent.underlying_emotions),
        );

        let request = GenerationRequest::new(SYSTEM_PROMPT, user_prompt, model);
        let value = self.llm.generate(&request).await?;
        let draft: StrategyDraft = parse_stage_output(value, "SEO strategy")?;

        if draft.proposed_topics.len() < 2 {
            return Err(StageError::validation(format!(
                "SEO strategy returned {} topics, need a hub and at least one spoke",
                draft.proposed_topics.len()
            )));
        }
        if draft.cluster_primary_keyword.trim().is_empty() {
            return Err(StageError::validation(
                "SEO strategy returned an empty cluster keyword",
            ));
        }

        let decision = evaluate_seo_mode(
            &draft.proposed_topics,
            draft.estimated_total_search_volume,
            self.min_viable_volume,
        );
        match decision.mode {
            SeoMode::FullSeoGeo => info!(
                volume = ?draft.estimated_total_search_volume,
                keyword = %draft.cluster_primary_keyword,
                "SEO strategy healthy"
            ),
            mode => warn!(
                mode = %mode,
                keyword = %draft.cluster_primary_keyword,
                "SEO dead-end: {}",
                decision.reason
            ),
        }

        Ok(StrategyOutput {
            proposed_topics: draft.proposed_topics,
            cluster_primary_keyword: draft.cluster_primary_keyword,
            estimated_total_search_volume: draft.estimated_total_search_volume,
            seo_mode: decision.mode,
            seo_mode_reason: decision.reason,
        })
    }
}

fn bulleted(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}
