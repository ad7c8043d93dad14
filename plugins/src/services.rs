//! `ServicesFactory` implementation: assembles the catalog, selector and stores
//! from configuration so the CLI (and embedders) share one wiring.
use async_trait::async_trait;
use taskwave_core::api::{AppConfig, Services, ServicesFactory};

use crate::factory;

/// Builds [`Services`] with the builtin capabilities and the configured stores.
///
/// No reasoning model is wired here; embedders add one with
/// [`Services::with_model`].
#[derive(Debug, Default)]
pub struct PluginServicesFactory {
    workdir: Option<std::path::PathBuf>,
}

impl PluginServicesFactory {
    /// Working directory for the `shell` capability.
    pub fn with_workdir(mut self, workdir: impl Into<std::path::PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }
}

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> anyhow::Result<Services> {
        let services = Services::new(factory::build_catalog(self.workdir.clone()))
            .with_selector(factory::build_selector())
            .with_task_store(factory::build_task_store(&cfg.store))
            .with_context_store(factory::build_context_store(&cfg.store));
        tracing::debug!(
            store = ?cfg.store.kind,
            capabilities = services.catalog.len(),
            "services built"
        );
        Ok(services)
    }
}
