//! Content blueprint payload.
//!
//! The [`Blueprint`] is the contract between the strategy engine and the
//! downstream production system: the exact JSON body delivered over the
//! webhook after human approval. Both systems must agree on this schema.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Supported output content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Video,
    Article,
    Short,
    Carousel,
}

/// SEO search intent classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    #[default]
    Informational,
    Commercial,
    Transactional,
    Navigational,
}

/// Intent type for AI-search (GEO) queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeoIntent {
    #[default]
    Informational,
    Comparison,
    Solution,
}

/// Tone of voice for content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Empathetic,
    Authoritative,
    Casual,
    Urgent,
}

/// Internal link relationship type.
///
/// Unknown strings from the generation service deserialize as
/// `contextual` instead of failing the whole cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    #[default]
    #[serde(other)]
    Contextual,
    Cta,
    Related,
}

/// Role of a topic in the hub & spoke model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopicRole {
    Hub,
    Spoke,
}

/// A conversational query for AI search engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoQuery {
    /// The natural-language conversational query
    pub query_text: String,
    /// Query intent type
    #[serde(default)]
    pub intent: GeoIntent,
    /// Budget, physical, or situational constraints embedded in the query
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Contextual elements the content must include to satisfy AI search
    #[serde(default)]
    pub mandatory_elements: Vec<String>,
}

/// SEO strategy for a single topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeoMetadata {
    /// Main target keyword
    pub primary_keyword: String,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    #[serde(default)]
    pub long_tail_keywords: Vec<String>,
    /// Monthly search volume; `None` means unverified / AI-estimated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_volume: Option<u64>,
    /// True when the volume comes from a real keyword API rather than an
    /// AI estimate
    #[serde(default)]
    pub search_volume_verified: bool,
    /// 0-100 difficulty score; `None` means unverified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_difficulty: Option<f32>,
    #[serde(default)]
    pub search_intent: SearchIntent,
}

/// A directed internal link between two content pieces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InternalLink {
    /// Source topic ID
    pub from_topic_id: String,
    /// Target topic ID
    pub to_topic_id: String,
    /// Anchor text for the hyperlink (user-facing)
    pub anchor_text: String,
    #[serde(default)]
    pub link_type: LinkType,
    /// URL if linking to already-published content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_url: Option<String>,
}

/// Blueprint for a single content piece (hub or spoke).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicBlueprint {
    #[serde(default = "generate_id")]
    pub topic_id: String,
    /// Proposed content title
    pub title: String,
    /// URL-safe slug
    pub slug: String,
    pub role: TopicRole,
    #[serde(default)]
    pub content_type: ContentType,

    /// Opening hook or angle
    pub hook: String,
    /// Key points to cover
    pub key_points: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_word_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_duration_seconds: Option<u32>,

    pub seo: SeoMetadata,
    #[serde(default)]
    pub geo_queries: Vec<GeoQuery>,

    #[serde(default)]
    pub tone: Tone,
    /// Call-to-action for this content piece
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta: Option<String>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Blueprint structural fault. These indicate a broken cluster, not a
/// transient generation error, and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlueprintError {
    #[error("blueprint has no spokes")]
    MissingSpokes,

    #[error("internal link references unknown topic '{topic_id}'")]
    UnknownLinkEndpoint { topic_id: String },

    #[error("spoke '{topic_id}' has no inbound or outbound internal link")]
    OrphanSpoke { topic_id: String },

    #[error("spoke '{topic_id}' has no GEO queries")]
    SpokeWithoutGeoQueries { topic_id: String },
}

/// The terminal artifact of a pipeline run: hub + spokes + linking map +
/// cluster-level SEO summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Blueprint {
    // --- Metadata ---
    #[serde(default = "generate_id")]
    pub blueprint_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub created_at: DateTime<Utc>,
    /// Username of the human who approved this blueprint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    // --- Persona & context ---
    pub target_persona: String,
    pub core_pain_points: Vec<String>,
    pub underlying_emotions: Vec<String>,
    /// Original raw text excerpt for the audit trail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input_snippet: Option<String>,

    // --- Topic cluster ---
    pub hub: TopicBlueprint,
    pub spokes: Vec<TopicBlueprint>,

    // --- Internal linking map ---
    pub internal_links: Vec<InternalLink>,

    // --- Cluster-level SEO summary ---
    pub cluster_primary_keyword: String,
    /// `None` signals no measurable demand
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_total_search_volume: Option<u64>,

    // --- Pipeline metadata ---
    pub pipeline_run_id: String,
    pub generated_by_model: String,
    #[serde(default)]
    pub cannibalization_checked: bool,
    #[serde(default)]
    pub cannibalization_risks: Vec<String>,
    #[serde(default)]
    pub existing_content_links: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Blueprint {
    /// All topic IDs in this blueprint (hub first).
    pub fn topic_ids(&self) -> HashSet<&str> {
        std::iter::once(self.hub.topic_id.as_str())
            .chain(self.spokes.iter().map(|s| s.topic_id.as_str()))
            .collect()
    }

    /// Check the structural invariants of the cluster:
    ///
    /// - at least one spoke exists;
    /// - every internal link references the hub or a spoke of this
    ///   blueprint;
    /// - every spoke participates in at least one link;
    /// - every spoke has at least one GEO query (spokes without GEO
    ///   queries lose persona constraints from the final payload).
    pub fn validate(&self) -> Result<(), BlueprintError> {
        if self.spokes.is_empty() {
            return Err(BlueprintError::MissingSpokes);
        }

        let ids = self.topic_ids();
        for link in &self.internal_links {
            for endpoint in [&link.from_topic_id, &link.to_topic_id] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(BlueprintError::UnknownLinkEndpoint {
                        topic_id: endpoint.clone(),
                    });
                }
            }
        }

        for spoke in &self.spokes {
            let linked = self.internal_links.iter().any(|l| {
                l.from_topic_id == spoke.topic_id || l.to_topic_id == spoke.topic_id
            });
            if !linked {
                return Err(BlueprintError::OrphanSpoke {
                    topic_id: spoke.topic_id.clone(),
                });
            }
            if spoke.geo_queries.is_empty() {
                return Err(BlueprintError::SpokeWithoutGeoQueries {
                    topic_id: spoke.topic_id.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: &str, role: TopicRole) -> TopicBlueprint {
        TopicBlueprint {
            topic_id: id.to_string(),
            title: format!("Title for {id}"),
            slug: id.to_string(),
            role,
            content_type: ContentType::Video,
            hook: "A compelling hook".to_string(),
            key_points: vec!["point one".to_string(), "point two".to_string()],
            target_word_count: None,
            target_duration_seconds: Some(300),
            seo: SeoMetadata {
                primary_keyword: format!("keyword {id}"),
                secondary_keywords: vec![],
                long_tail_keywords: vec![],
                search_volume: Some(1200),
                search_volume_verified: false,
                keyword_difficulty: None,
                search_intent: SearchIntent::Informational,
            },
            geo_queries: vec![GeoQuery {
                query_text: format!("what is the best option for {id}"),
                intent: GeoIntent::Solution,
                constraints: vec!["under 5000 THB".to_string()],
                mandatory_elements: vec![],
            }],
            tone: Tone::Empathetic,
            cta: None,
        }
    }

    fn link(from: &str, to: &str) -> InternalLink {
        InternalLink {
            from_topic_id: from.to_string(),
            to_topic_id: to.to_string(),
            anchor_text: "read more".to_string(),
            link_type: LinkType::Contextual,
            existing_url: None,
        }
    }

    fn blueprint() -> Blueprint {
        Blueprint {
            blueprint_id: "bp-1".to_string(),
            version: "1.0.0".to_string(),
            created_at: Utc::now(),
            approved_by: None,
            target_persona: "Office workers with back pain".to_string(),
            core_pain_points: vec!["chronic back pain".to_string()],
            underlying_emotions: vec!["frustration".to_string()],
            raw_input_snippet: None,
            hub: topic("hub", TopicRole::Hub),
            spokes: vec![topic("s1", TopicRole::Spoke), topic("s2", TopicRole::Spoke)],
            internal_links: vec![link("hub", "s1"), link("s1", "hub"), link("s2", "hub")],
            cluster_primary_keyword: "ergonomic chair".to_string(),
            estimated_total_search_volume: Some(5400),
            pipeline_run_id: "run-1".to_string(),
            generated_by_model: "deepseek-chat".to_string(),
            cannibalization_checked: true,
            cannibalization_risks: vec![],
            existing_content_links: vec![],
        }
    }

    #[test]
    fn test_valid_blueprint_passes() {
        blueprint().validate().unwrap();
    }

    #[test]
    fn test_link_to_unknown_topic_rejected() {
        let mut bp = blueprint();
        bp.internal_links.push(link("hub", "ghost"));
        assert_eq!(
            bp.validate().unwrap_err(),
            BlueprintError::UnknownLinkEndpoint {
                topic_id: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_orphan_spoke_rejected() {
        let mut bp = blueprint();
        bp.internal_links.retain(|l| l.from_topic_id != "s2" && l.to_topic_id != "s2");
        assert_eq!(
            bp.validate().unwrap_err(),
            BlueprintError::OrphanSpoke {
                topic_id: "s2".to_string()
            }
        );
    }

    #[test]
    fn test_spoke_without_geo_queries_rejected() {
        let mut bp = blueprint();
        bp.spokes[0].geo_queries.clear();
        assert_eq!(
            bp.validate().unwrap_err(),
            BlueprintError::SpokeWithoutGeoQueries {
                topic_id: "s1".to_string()
            }
        );
    }

    #[test]
    fn test_no_spokes_rejected() {
        let mut bp = blueprint();
        bp.spokes.clear();
        bp.internal_links.clear();
        assert_eq!(bp.validate().unwrap_err(), BlueprintError::MissingSpokes);
    }

    #[test]
    fn test_unknown_link_type_coerces_to_contextual() {
        let json = r#"{
            "from_topic_id": "a",
            "to_topic_id": "b",
            "anchor_text": "click here",
            "link_type": "sidebar"
        }"#;
        let l: InternalLink = serde_json::from_str(json).unwrap();
        assert_eq!(l.link_type, LinkType::Contextual);
    }
}
