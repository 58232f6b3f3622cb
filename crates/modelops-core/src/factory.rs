//! Builds a ready-to-serve [`Orchestrator`] from a [`GatewayConfig`].
//!
//! All shared handles (LLM client, resource manager, retirement table) are
//! created here once and passed down explicitly.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::errors::AgentError;
use crate::llm::providers::create_llm_client;
use crate::llm::LLM;
use crate::management::{ArmClient, ResourceManager};
use crate::orchestrator::Orchestrator;
use crate::tools::{FoundryLinks, RetirementTable, ToolDispatcher};

pub struct GatewayFactory;

impl GatewayFactory {
    pub fn create_from_config(config: &GatewayConfig) -> Result<Orchestrator, AgentError> {
        let manager = Self::configure_manager(config)?;
        Self::create_with_manager(config, manager)
    }

    /// Same as [`create_from_config`](Self::create_from_config) with a caller-supplied
    /// resource manager.
    pub fn create_with_manager(
        config: &GatewayConfig,
        manager: Arc<dyn ResourceManager>,
    ) -> Result<Orchestrator, AgentError> {
        let llm = Self::configure_llm(config)?;
        let tools = Self::configure_tools(config, manager)?;
        let orchestrator_config = config.orchestrator.to_orchestrator_config();

        log::info!(
            "Gateway ready: model '{}', max_rounds {}, validation policy {:?}",
            config.llm.model,
            orchestrator_config.max_rounds,
            config.orchestrator.validation_policy
        );
        Ok(Orchestrator::new(llm, Arc::new(tools), orchestrator_config))
    }

    fn configure_llm(config: &GatewayConfig) -> Result<Arc<dyn LLM>, AgentError> {
        create_llm_client(&config.llm)
    }

    fn configure_manager(config: &GatewayConfig) -> Result<Arc<dyn ResourceManager>, AgentError> {
        Ok(Arc::new(ArmClient::from_config(&config.management)?))
    }

    fn configure_tools(
        config: &GatewayConfig,
        manager: Arc<dyn ResourceManager>,
    ) -> Result<ToolDispatcher, AgentError> {
        let retirement = RetirementTable::load(&config.retirement.table_path)?;
        let links = FoundryLinks {
            subscription_id: config.management.subscription_id.clone(),
            tenant_id: config.management.tenant_id.clone(),
            project: config.management.foundry_project.clone(),
        };

        Ok(ToolDispatcher::new(manager, Arc::new(retirement))
            .with_policy(config.orchestrator.validation_policy)
            .with_links(links))
    }
}
