//! Stage 3: topic cluster assembly.
//!
//! Refines the proposed topics into the final hub & spoke cluster with an
//! internal linking map, then assembles the blueprint. Structural
//! violations after assembly (links to unknown topics, orphan spokes) are
//! programming faults and fail the run without retry.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use strat_llm::{GenerationClient, GenerationRequest};
use strat_models::{
    Blueprint, IntentOutput, InternalLink, StrategyOutput, TopicBlueprint, TopicRole,
};

use crate::error::StageError;
use crate::stages::parse_stage_output;

const SYSTEM_PROMPT: &str = "\
You are a content strategist finalizing a hub & spoke topic cluster. You \
receive proposed topics with SEO metadata; refine the titles, hooks, and \
key points, and build the internal linking map.

Linking rules: the hub links to every spoke, every spoke links back to the \
hub, adjacent spokes may cross-link. Keep the topic_id values from the \
input unchanged. Every spoke must keep at least one GEO query.

Return ONLY a JSON object with this shape:
{
  \"hub\": { ...topic... },
  \"spokes\": [ { ...topic... }, ... ],
  \"internal_links\": [
    {\"from_topic_id\": \"...\", \"to_topic_id\": \"...\", \"anchor_text\": \"...\", \"link_type\": \"contextual\" | \"cta\" | \"related\"}
  ],
  \"cannibalization_notes\": [\"...\"]
}";

/// The shape the generation service returns for the cluster build.
#[derive(Debug, Deserialize)]
struct ClusterDraft {
    hub: TopicBlueprint,
    spokes: Vec<TopicBlueprint>,
    internal_links: Vec<InternalLink>,
    #[serde(default)]
    cannibalization_notes: Vec<String>,
}

pub struct ClusterStage {
    llm: Arc<dyn GenerationClient>,
}

impl ClusterStage {
    pub fn new(llm: Arc<dyn GenerationClient>) -> Self {
        Self { llm }
    }

    pub async fn run(
        &self,
        run_id: &str,
        model: &str,
        intent: &IntentOutput,
        strategy: &StrategyOutput,
    ) -> Result<Blueprint, StageError> {
        let request = GenerationRequest::new(SYSTEM_PROMPT, build_context(intent, strategy), model)
            .with_temperature(0.6);
        let value = self.llm.generate(&request).await?;
        let mut draft: ClusterDraft = parse_stage_output(value, "topic cluster")?;

        if draft.spokes.is_empty() {
            return Err(StageError::validation(
                "topic cluster returned no spokes",
            ));
        }
        for spoke in &draft.spokes {
            if spoke.geo_queries.is_empty() {
                return Err(StageError::validation(format!(
                    "spoke '{}' lost its GEO queries during cluster refinement",
                    spoke.topic_id
                )));
            }
        }

        // Roles are authoritative here regardless of what the model set.
        draft.hub.role = TopicRole::Hub;
        for spoke in &mut draft.spokes {
            spoke.role = TopicRole::Spoke;
        }

        let blueprint = Blueprint {
            blueprint_id: Uuid::new_v4().to_string(),
            version: "1.0.0".to_string(),
            created_at: Utc::now(),
            approved_by: None,
            target_persona: intent.target_persona.clone(),
            core_pain_points: intent.core_pain_points.clone(),
            underlying_emotions: intent.underlying_emotions.clone(),
            raw_input_snippet: intent.raw_input_snippet.clone(),
            hub: draft.hub,
            spokes: draft.spokes,
            internal_links: draft.internal_links,
            cluster_primary_keyword: strategy.cluster_primary_keyword.clone(),
            estimated_total_search_volume: strategy.estimated_total_search_volume,
            pipeline_run_id: run_id.to_string(),
            generated_by_model: model.to_string(),
            cannibalization_checked: false,
            cannibalization_risks: draft.cannibalization_notes,
            existing_content_links: vec![],
        };

        // Structural invariants hold for every persisted blueprint; a
        // violation here is a fault in the assembly, not a transient
        // generation problem.
        blueprint
            .validate()
            .map_err(|e| StageError::fatal(format!("cluster invariant violated: {e}")))?;

        info!(
            hub = %blueprint.hub.title,
            spokes = blueprint.spokes.len(),
            links = blueprint.internal_links.len(),
            "Cluster assembled"
        );
        Ok(blueprint)
    }
}

fn build_context(intent: &IntentOutput, strategy: &StrategyOutput) -> String {
    let mut topics = String::new();
    for t in &strategy.proposed_topics {
        let role = match t.role {
            TopicRole::Hub => "hub",
            TopicRole::Spoke => "spoke",
        };
        topics.push_str(&format!(
            "- {} (id: {}): {}\n  slug: {}, keyword: {}, key points: {}\n",
            role,
            t.topic_id,
            t.title,
            t.slug,
            t.seo.primary_keyword,
            t.key_points.join(", "),
        ));
    }

    format!(
        "## Target Persona\n{}\n\n## Cluster Primary Keyword\n{}\n\n## Proposed Topics\n{}",
        intent.target_persona, strategy.cluster_primary_keyword, topics
    )
}
