//! Application state: the content store, usage ledger, course generator and
//! grading engine, wired from env + optional TOML config.
//!
//! Two gateways are built from OPENAI_API_KEY: a stronger model for content
//! generation and a faster one for grading. Without a key both are replaced by
//! `UnavailableGateway`; generation then fails with a terminal error while
//! grading falls back to exact matching.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::grading::GradingEngine;
use crate::openai::OpenAiGateway;
use crate::orchestrator::CourseGenerator;
use crate::ports::{LlmGateway, UnavailableGateway};
use crate::store::{InMemoryContentStore, InMemoryUsageLedger};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InMemoryContentStore>,
    pub ledger: Arc<InMemoryUsageLedger>,
    pub generator: CourseGenerator,
    pub grader: GradingEngine,
    pub llm_enabled: bool,
}

impl AppState {
    /// Build state from env: load config, init OpenAI gateways, create in-memory stores.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let generation = OpenAiGateway::from_env("OPENAI_GENERATION_MODEL", "gpt-4o");
        let grading = OpenAiGateway::from_env("OPENAI_GRADING_MODEL", "gpt-4o-mini");

        match (generation, grading) {
            (Some(gen), Some(grade)) => {
                info!(
                    target: "lessonforge_backend",
                    base_url = %gen.base_url,
                    generation_model = %gen.model,
                    grading_model = %grade.model,
                    "OpenAI enabled."
                );
                Self::with_gateways(cfg, Arc::new(gen), Arc::new(grade), true)
            }
            _ => {
                info!(target: "lessonforge_backend", "OpenAI disabled (no OPENAI_API_KEY). Grading uses exact match only.");
                Self::with_gateways(cfg, Arc::new(UnavailableGateway), Arc::new(UnavailableGateway), false)
            }
        }
    }

    pub fn with_gateways(
        cfg: AgentConfig,
        generation: Arc<dyn LlmGateway>,
        grading: Arc<dyn LlmGateway>,
        llm_enabled: bool,
    ) -> Self {
        let store = Arc::new(InMemoryContentStore::new());
        let ledger = Arc::new(InMemoryUsageLedger::new(cfg.quotas.clone()));
        let generator = CourseGenerator::new(generation, store.clone(), cfg.prompts.clone(), cfg.pipeline.clone());
        let grader = GradingEngine::new(grading, cfg.prompts, cfg.pipeline);
        Self { store, ledger, generator, grader, llm_enabled }
    }
}
