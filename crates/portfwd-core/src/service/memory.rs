// # Memory Service Store
//
// In-memory implementation of ServiceStore.
//
// ## Purpose
//
// Holds services for embedders that feed the controller from their own
// watch loop, and for tests. Nothing persists across restarts, so
// finalizers recorded here vanish with the process.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Result;
use crate::service::{ServiceKey, ServiceResource};
use crate::traits::ServiceStore;

/// In-memory service store
///
/// Clones share the same services.
#[derive(Debug, Clone, Default)]
pub struct MemoryServiceStore {
    inner: Arc<RwLock<BTreeMap<ServiceKey, ServiceResource>>>,
}

impl MemoryServiceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `services`
    pub fn with_services(services: impl IntoIterator<Item = ServiceResource>) -> Self {
        let map = services
            .into_iter()
            .map(|service| (service.key(), service))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of services
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store holds no services
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ServiceStore for MemoryServiceStore {
    async fn get(&self, key: &ServiceKey) -> Result<Option<ServiceResource>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<ServiceKey>> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }

    async fn update(&self, service: &ServiceResource) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(service.key(), service.clone());
        Ok(())
    }

    async fn remove(&self, key: &ServiceKey) -> Result<()> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceType;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryServiceStore::new();
        assert!(store.is_empty().await);

        let svc = ServiceResource::new("default", "web", ServiceType::LoadBalancer);
        store.update(&svc).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&svc.key()).await.unwrap(), Some(svc.clone()));

        store.remove(&svc.key()).await.unwrap();
        store.remove(&svc.key()).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_services() {
        let store = MemoryServiceStore::new();
        let clone = store.clone();

        clone
            .update(&ServiceResource::new("a", "b", ServiceType::NodePort))
            .await
            .unwrap();
        assert_eq!(store.list().await.unwrap(), vec![ServiceKey::new("a", "b")]);
    }
}
