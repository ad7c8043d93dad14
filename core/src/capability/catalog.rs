use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::traits::Capability;

/// Explicit capability registry, owned by whoever builds the `Services`.
///
/// Registration order is preserved so `all()` is deterministic.
#[derive(Default)]
pub struct CapabilityCatalog {
    inner: RwLock<CatalogInner>,
}

#[derive(Default)]
struct CatalogInner {
    order: Vec<String>,
    by_name: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(capabilities: Vec<Arc<dyn Capability>>) -> Self {
        let catalog = Self::new();
        for cap in capabilities {
            catalog.register(cap);
        }
        catalog
    }

    /// Registers a capability, replacing any previous one with the same name.
    pub fn register(&self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.by_name.insert(name.clone(), capability).is_none() {
            inner.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_name.get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn Capability>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .filter_map(|name| inner.by_name.get(name).cloned())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
