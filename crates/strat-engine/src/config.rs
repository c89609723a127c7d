//! Engine configuration.
//!
//! Retry caps, backoff bounds, input thresholds, and timeouts are all
//! environment-driven rather than hardcoded.

use std::time::Duration;

/// Input guard thresholds.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Minimum characters of trimmed input
    pub min_chars: usize,
    /// Minimum meaningful words
    pub min_words: usize,
    /// Minimum unique-word ratio before input counts as spam
    pub min_unique_ratio: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_chars: 30,
            min_words: 5,
            min_unique_ratio: 0.3,
        }
    }
}

impl GuardConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_chars: std::env::var("GUARD_MIN_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_chars),
            min_words: std::env::var("GUARD_MIN_WORDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_words),
            min_unique_ratio: std::env::var("GUARD_MIN_UNIQUE_RATIO")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_unique_ratio),
        }
    }
}

/// Coordinator and stage-executor configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum `raw_text` length accepted by `start`; shorter input is an
    /// input-validation error and never creates a run. The deeper
    /// content-quality checks (which do create a run and reject it) live
    /// in [`crate::InputGuard`].
    pub min_input_chars: usize,
    /// Total attempts per stage for provider faults
    pub max_stage_attempts: u32,
    /// Base delay for stage retry backoff (doubles each attempt)
    pub stage_base_delay: Duration,
    /// Maximum delay between stage retries
    pub stage_max_delay: Duration,
    /// Search volume at or above which a keyword counts as viable SEO
    pub min_viable_volume: u64,
    /// Model used when the caller does not select one
    pub default_model: String,
    pub guard: GuardConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_input_chars: 1,
            max_stage_attempts: 3,
            stage_base_delay: Duration::from_secs(1),
            stage_max_delay: Duration::from_secs(30),
            min_viable_volume: 100,
            default_model: "deepseek-chat".to_string(),
            guard: GuardConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_input_chars: std::env::var("PIPELINE_MIN_INPUT_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_input_chars),
            max_stage_attempts: std::env::var("PIPELINE_MAX_STAGE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_stage_attempts),
            stage_base_delay: Duration::from_millis(
                std::env::var("PIPELINE_STAGE_BASE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            stage_max_delay: Duration::from_millis(
                std::env::var("PIPELINE_STAGE_MAX_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30_000),
            ),
            min_viable_volume: std::env::var("PIPELINE_MIN_VIABLE_VOLUME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_viable_volume),
            default_model: std::env::var("PIPELINE_DEFAULT_MODEL")
                .unwrap_or(defaults.default_model),
            guard: GuardConfig::from_env(),
        }
    }

    /// Backoff delay before the next stage attempt.
    pub fn stage_delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .stage_base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.stage_max_delay)
    }
}

/// Stuck-run reaper configuration.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Interval between scans
    pub interval: Duration,
    /// How long a run may sit in an in-flight stage before being forced
    /// to `failed`
    pub stage_timeout: Duration,
    pub enabled: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            stage_timeout: Duration::from_secs(600),
            enabled: true,
        }
    }
}

impl ReaperConfig {
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(
                std::env::var("REAPER_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            stage_timeout: Duration::from_secs(
                std::env::var("REAPER_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            enabled: std::env::var("REAPER_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}
