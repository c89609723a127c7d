//! Webhook dispatcher with bounded retries and exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use strat_models::Blueprint;

use crate::correlation::sign_payload;
use crate::error::{DispatchError, DispatchResult};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Ingest endpoint of the production system
    pub webhook_url: Option<String>,
    /// Bearer token; also the HMAC signing secret
    pub webhook_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_token: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl DispatchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("PRODUCTION_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            webhook_token: std::env::var("PRODUCTION_WEBHOOK_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("WEBHOOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("WEBHOOK_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            base_delay: Duration::from_millis(
                std::env::var("WEBHOOK_BASE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            max_delay: Duration::from_millis(
                std::env::var("WEBHOOK_MAX_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30_000),
            ),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

/// Result of a successful delivery.
#[derive(Debug, Clone)]
pub struct DispatchAck {
    /// HTTP status of the ack
    pub status: u16,
    /// Job ID returned by the production system, if any
    pub production_job_id: Option<String>,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Delivery interface consumed by the run coordinator.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Deliver a blueprint. The correlation ID and idempotency key are
    /// injected into the payload body and mirrored in headers.
    async fn deliver(
        &self,
        blueprint: &Blueprint,
        correlation_id: &str,
        idempotency_key: &str,
    ) -> DispatchResult<DispatchAck>;
}

#[derive(Debug, Deserialize)]
struct AckBody {
    #[serde(alias = "job_id")]
    production_job_id: Option<String>,
}

/// HTTP dispatcher for the production system's ingest webhook.
pub struct WebhookDispatcher {
    http: Client,
    config: DispatchConfig,
}

impl WebhookDispatcher {
    pub fn new(config: DispatchConfig) -> DispatchResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DispatchError::Exhausted {
                attempts: 0,
                last_error: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> DispatchResult<Self> {
        Self::new(DispatchConfig::from_env())
    }

    async fn attempt(
        &self,
        url: &str,
        raw_body: &[u8],
        correlation_id: &str,
        idempotency_key: &str,
        signature: Option<&str>,
    ) -> Result<reqwest::Response, String> {
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("X-Correlation-ID", correlation_id)
            .header("Idempotency-Key", idempotency_key)
            .body(raw_body.to_vec());

        if let (Some(token), Some(signature)) = (&self.config.webhook_token, signature) {
            request = request
                .bearer_auth(token)
                .header("X-Signature-256", signature);
        }

        request.send().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Dispatch for WebhookDispatcher {
    async fn deliver(
        &self,
        blueprint: &Blueprint,
        correlation_id: &str,
        idempotency_key: &str,
    ) -> DispatchResult<DispatchAck> {
        let url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or(DispatchError::NotConfigured)?;

        // Build the payload once; every retry sends the identical bytes.
        let mut payload = serde_json::to_value(blueprint)?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("correlation_id".to_string(), correlation_id.into());
            obj.insert("idempotency_key".to_string(), idempotency_key.into());
        }
        let raw_body = serde_json::to_vec(&payload)?;

        // Signed once; the signature covers the exact raw body.
        let signature = match &self.config.webhook_token {
            Some(token) => Some(sign_payload(&raw_body, token)?),
            None => None,
        };

        let total_attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 0..total_attempts {
            info!(
                correlation_id,
                attempt = attempt + 1,
                total_attempts,
                "Dispatching blueprint"
            );

            match self
                .attempt(
                    url,
                    &raw_body,
                    correlation_id,
                    idempotency_key,
                    signature.as_deref(),
                )
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let production_job_id = response
                            .json::<AckBody>()
                            .await
                            .ok()
                            .and_then(|ack| ack.production_job_id);

                        info!(
                            correlation_id,
                            status = status.as_u16(),
                            job_id = ?production_job_id,
                            attempts = attempt + 1,
                            "Blueprint dispatched"
                        );
                        return Ok(DispatchAck {
                            status: status.as_u16(),
                            production_job_id,
                            attempts: attempt + 1,
                        });
                    }

                    let body = response.text().await.unwrap_or_default();

                    // 4xx (other than 429) cannot succeed on retry.
                    if status.is_client_error() && status.as_u16() != 429 {
                        return Err(DispatchError::NonRetryable {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    last_error = format!("production system returned {}: {}", status, body);
                    warn!(correlation_id, attempt = attempt + 1, "{}", last_error);
                }
                Err(e) => {
                    last_error = format!("delivery request failed: {e}");
                    warn!(correlation_id, attempt = attempt + 1, "{}", last_error);
                }
            }

            if attempt + 1 < total_attempts {
                tokio::time::sleep(self.config.delay_for_attempt(attempt)).await;
            }
        }

        Err(DispatchError::Exhausted {
            attempts: total_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use strat_models::{
        ContentType, GeoIntent, GeoQuery, InternalLink, LinkType, SearchIntent, SeoMetadata, Tone,
        TopicBlueprint, TopicRole,
    };
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn topic(id: &str, role: TopicRole) -> TopicBlueprint {
        TopicBlueprint {
            topic_id: id.to_string(),
            title: "title".to_string(),
            slug: id.to_string(),
            role,
            content_type: ContentType::Video,
            hook: "hook".to_string(),
            key_points: vec!["point".to_string()],
            target_word_count: None,
            target_duration_seconds: None,
            seo: SeoMetadata {
                primary_keyword: "kw".to_string(),
                secondary_keywords: vec![],
                long_tail_keywords: vec![],
                search_volume: None,
                search_volume_verified: false,
                keyword_difficulty: None,
                search_intent: SearchIntent::Informational,
            },
            geo_queries: vec![GeoQuery {
                query_text: "best option".to_string(),
                intent: GeoIntent::Informational,
                constraints: vec![],
                mandatory_elements: vec![],
            }],
            tone: Tone::Empathetic,
            cta: None,
        }
    }

    fn blueprint() -> Blueprint {
        Blueprint {
            blueprint_id: "bp-1".to_string(),
            version: "1.0.0".to_string(),
            created_at: Utc::now(),
            approved_by: Some("operator".to_string()),
            target_persona: "persona".to_string(),
            core_pain_points: vec!["pain".to_string()],
            underlying_emotions: vec!["hope".to_string()],
            raw_input_snippet: None,
            hub: topic("hub", TopicRole::Hub),
            spokes: vec![topic("s1", TopicRole::Spoke)],
            internal_links: vec![InternalLink {
                from_topic_id: "hub".to_string(),
                to_topic_id: "s1".to_string(),
                anchor_text: "anchor".to_string(),
                link_type: LinkType::Contextual,
                existing_url: None,
            }],
            cluster_primary_keyword: "kw".to_string(),
            estimated_total_search_volume: None,
            pipeline_run_id: "run-1".to_string(),
            generated_by_model: "deepseek-chat".to_string(),
            cannibalization_checked: false,
            cannibalization_risks: vec![],
            existing_content_links: vec![],
        }
    }

    fn config_for(server: &MockServer) -> DispatchConfig {
        DispatchConfig {
            webhook_url: Some(format!("{}/ingest", server.uri())),
            webhook_token: Some("shared-secret".to_string()),
            timeout: Duration::from_secs(5),
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_deliver_success_parses_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("Idempotency-Key", "idem-key"))
            .and(header("X-Correlation-ID", "corr-1"))
            .and(header("Authorization", "Bearer shared-secret"))
            .and(header_exists("X-Signature-256"))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(json!({"production_job_id": "pj-9"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(config_for(&server)).unwrap();
        let ack = dispatcher
            .deliver(&blueprint(), "corr-1", "idem-key")
            .await
            .unwrap();

        assert_eq!(ack.status, 202);
        assert_eq!(ack.production_job_id.as_deref(), Some("pj-9"));
        assert_eq!(ack.attempts, 1);
    }

    #[tokio::test]
    async fn test_deliver_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(config_for(&server)).unwrap();
        let ack = dispatcher
            .deliver(&blueprint(), "corr-1", "idem-key")
            .await
            .unwrap();

        assert_eq!(ack.attempts, 2);
        assert!(ack.production_job_id.is_none());
    }

    #[tokio::test]
    async fn test_signature_covers_delivered_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({})))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(config_for(&server)).unwrap();
        dispatcher
            .deliver(&blueprint(), "corr-1", "idem-key")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        // The signature must verify against the exact bytes on the wire.
        let sent_signature = request.headers["x-signature-256"].to_str().unwrap();
        let expected = crate::correlation::sign_payload(&request.body, "shared-secret").unwrap();
        assert_eq!(sent_signature, expected);

        // Correlation and idempotency identifiers ride in the body too.
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["correlation_id"], "corr-1");
        assert_eq!(body["idempotency_key"], "idem-key");
    }

    #[tokio::test]
    async fn test_deliver_retries_on_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(config_for(&server)).unwrap();
        let ack = dispatcher
            .deliver(&blueprint(), "corr-1", "idem-key")
            .await
            .unwrap();
        assert_eq!(ack.attempts, 2);
    }

    #[tokio::test]
    async fn test_deliver_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(422).set_body_string("schema mismatch"))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(config_for(&server)).unwrap();
        let err = dispatcher
            .deliver(&blueprint(), "corr-1", "idem-key")
            .await
            .unwrap_err();

        match err {
            DispatchError::NonRetryable { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "schema mismatch");
            }
            other => panic!("expected NonRetryable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deliver_exhaustion_keeps_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance window"))
            .expect(3)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(config_for(&server)).unwrap();
        let err = dispatcher
            .deliver(&blueprint(), "corr-1", "idem-key")
            .await
            .unwrap_err();

        match err {
            DispatchError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("maintenance window"), "{last_error}");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deliver_without_url_is_not_configured() {
        let dispatcher = WebhookDispatcher::new(DispatchConfig::default()).unwrap();
        let err = dispatcher
            .deliver(&blueprint(), "corr-1", "idem-key")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotConfigured));
    }
}
