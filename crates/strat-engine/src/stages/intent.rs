//! Stage 1: intent extraction.
//!
//! Distills raw research text into a target persona, core pain points,
//! and underlying emotions. The input guard runs first so garbage input
//! rejects the run without spending generation quota.

use std::sync::Arc;

use tracing::info;

use strat_llm::{GenerationClient, GenerationRequest};
use strat_models::IntentOutput;

use crate::error::StageError;
use crate::guard::InputGuard;
use crate::stages::parse_stage_output;

const SYSTEM_PROMPT: &str = "\
You are a consumer research analyst. From the raw research text you are \
given (user comments, reviews, notes), extract the target audience and \
their motivations.

Return ONLY a JSON object with this shape:
{
  \"target_persona\": \"one-paragraph description of the audience\",
  \"core_pain_points\": [\"pain point\", ...],
  \"underlying_emotions\": [\"emotion\", ...]
}";

/// How much of the raw input is kept on the blueprint for the audit trail.
const SNIPPET_CHARS: usize = 200;

pub struct IntentStage {
    llm: Arc<dyn GenerationClient>,
    guard: InputGuard,
}

impl IntentStage {
    pub fn new(llm: Arc<dyn GenerationClient>, guard: InputGuard) -> Self {
        Self { llm, guard }
    }

    pub async fn run(&self, raw_input: &str, model: &str) -> Result<IntentOutput, StageError> {
        self.guard
            .check(raw_input)
            .map_err(|reason| StageError::Rejected { reason })?;

        let request = GenerationRequest::new(SYSTEM_PROMPT, raw_input, model);
        let value = self.llm.generate(&request).await?;
        let mut output: IntentOutput = parse_stage_output(value, "intent extraction")?;

        if output.target_persona.trim().is_empty() {
            return Err(StageError::validation(
                "intent extraction returned an empty persona",
            ));
        }
        if output.core_pain_points.is_empty() {
            return Err(StageError::validation(
                "intent extraction returned no pain points",
            ));
        }

        if output.raw_input_snippet.is_none() {
            output.raw_input_snippet = Some(raw_input.chars().take(SNIPPET_CHARS).collect());
        }

        info!(
            pain_points = output.core_pain_points.len(),
            emotions = output.underlying_emotions.len(),
            "Intent extracted"
        );
        Ok(output)
    }
}
