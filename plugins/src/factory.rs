use std::path::PathBuf;
use std::sync::Arc;

use taskwave_core::api::{
    CapabilityCatalog, CapabilitySelector, ContextStore, InMemoryContextStore, InMemoryTaskStore,
    StoreConfig, StoreKind, TaskStore,
};

use crate::capability::builtin_capabilities;
use crate::selector::KeywordSelector;
use crate::store::{JsonFileTaskStore, JsonlContextStore};

pub fn build_task_store(cfg: &StoreConfig) -> Arc<dyn TaskStore> {
    match cfg.kind {
        StoreKind::Memory => Arc::new(InMemoryTaskStore::new()),
        StoreKind::File => Arc::new(JsonFileTaskStore::new(&cfg.path)),
    }
}

pub fn build_context_store(cfg: &StoreConfig) -> Arc<dyn ContextStore> {
    match cfg.kind {
        StoreKind::Memory => Arc::new(InMemoryContextStore::new()),
        StoreKind::File => Arc::new(JsonlContextStore::new(&cfg.context_path)),
    }
}

/// Catalog pre-populated with the builtin capabilities.
pub fn build_catalog(workdir: Option<PathBuf>) -> Arc<CapabilityCatalog> {
    Arc::new(CapabilityCatalog::with(builtin_capabilities(workdir)))
}

pub fn build_selector() -> Arc<dyn CapabilitySelector> {
    Arc::new(KeywordSelector::default())
}
