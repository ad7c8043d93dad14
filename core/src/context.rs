use std::sync::Arc;

use crate::capability::{CapabilityCatalog, CapabilitySelector, ReasoningModel};
use crate::config::AppConfig;
use crate::store::{ContextStore, TaskStore};

/// Collaborators shared by every task a manager runs.
///
/// Every field except the catalog is optional; tasks degrade gracefully
/// (no persistence, no context side channel, no model-driven mode).
#[derive(Clone, Default)]
pub struct Services {
    pub catalog: Arc<CapabilityCatalog>,
    pub selector: Option<Arc<dyn CapabilitySelector>>,
    pub model: Option<Arc<dyn ReasoningModel>>,
    pub task_store: Option<Arc<dyn TaskStore>>,
    pub context_store: Option<Arc<dyn ContextStore>>,
}

impl Services {
    pub fn new(catalog: Arc<CapabilityCatalog>) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn CapabilitySelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ReasoningModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = Some(store);
        self
    }
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> anyhow::Result<Services>;
}
