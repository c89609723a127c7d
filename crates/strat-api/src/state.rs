//! Application state.

use std::sync::Arc;

use strat_dispatch::{Dispatch, WebhookDispatcher};
use strat_engine::{Coordinator, PipelineConfig};
use strat_llm::{GenerationClient, OpenAiCompatClient};
use strat_store::{MemoryRunStore, RunStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn RunStore>,
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    /// Create state with environment-driven components.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
        let llm: Arc<dyn GenerationClient> = Arc::new(OpenAiCompatClient::from_env()?);
        let dispatcher: Arc<dyn Dispatch> = Arc::new(WebhookDispatcher::from_env()?);
        Ok(Self::with_components(
            config,
            store,
            llm,
            dispatcher,
            PipelineConfig::from_env(),
        ))
    }

    /// Create state from explicit components (used by tests to inject
    /// scripted generation and delivery backends).
    pub fn with_components(
        config: ApiConfig,
        store: Arc<dyn RunStore>,
        llm: Arc<dyn GenerationClient>,
        dispatcher: Arc<dyn Dispatch>,
        pipeline_config: PipelineConfig,
    ) -> Self {
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&store),
            llm,
            dispatcher,
            pipeline_config,
        ));
        Self {
            config,
            store,
            coordinator,
        }
    }
}
