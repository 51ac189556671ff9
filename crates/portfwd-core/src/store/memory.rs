// # Memory Rule Store
//
// In-memory implementation of RuleStore.
//
// ## Purpose
//
// Behaves like a router rule table without a router: rules are kept per
// scope, unrestricted rules are stored with the `"any"` sentinel and
// deletes match on name, port and ip. Useful for embedding, local dry runs
// of the daemon and tests.
//
// ## Crash Behavior
//
// - All rules are lost on restart
// - The next reconciliation recreates every desired rule

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::address::{ANY_SOURCE, Address};
use crate::config::RouterConfig;
use crate::scope::Scope;
use crate::traits::{RuleStore, RuleStoreFactory};
use crate::{Error, Result};

/// In-memory rule store implementation
///
/// Clones share the same table.
///
/// # Example
///
/// ```rust,no_run
/// use portfwd_core::store::MemoryRuleStore;
/// use portfwd_core::{Address, RuleStore, Scope};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRuleStore::new();
///
///     store.create(&Address::new("pf-web-80", 80, "10.0.0.5")).await?;
///
///     let rules = store.list(&Scope::new()).await?;
///     assert_eq!(rules.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    inner: Arc<RwLock<Vec<Address>>>,
}

impl MemoryRuleStore {
    /// Create a new empty rule store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule exactly as given, bypassing create-time mapping
    ///
    /// Lets callers seed rules the way a router would report them,
    /// including the `"any"` sentinel or rules owned by other tools.
    pub async fn insert(&self, address: Address) {
        self.inner.write().await.push(address);
    }

    /// Every rule across all scopes, as stored
    pub async fn snapshot(&self) -> Vec<Address> {
        self.inner.read().await.clone()
    }

    /// Get the number of rules in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list(&self, scope: &Scope) -> Result<Vec<Address>> {
        let guard = self.inner.read().await;
        Ok(guard
            .iter()
            .filter(|rule| rule.scope() == scope)
            .cloned()
            .map(Address::normalized)
            .collect())
    }

    async fn create(&self, address: &Address) -> Result<()> {
        let stored = if address.is_unrestricted() {
            address.clone().with_source_range(ANY_SOURCE)
        } else {
            address.clone()
        };
        self.inner.write().await.push(stored);
        Ok(())
    }

    async fn delete(&self, address: &Address) -> Result<()> {
        let mut guard = self.inner.write().await;
        let position = guard.iter().position(|rule| {
            rule.scope() == address.scope()
                && rule.name() == address.name()
                && rule.port() == address.port()
                && rule.ip() == address.ip()
        });
        if let Some(index) = position {
            guard.remove(index);
        }
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for creating memory rule stores
pub struct MemoryRuleStoreFactory;

impl RuleStoreFactory for MemoryRuleStoreFactory {
    fn create(&self, config: &RouterConfig) -> Result<Box<dyn RuleStore>> {
        match config {
            RouterConfig::Memory => Ok(Box::new(MemoryRuleStore::new())),
            _ => Err(Error::config("Invalid config for memory rule store")),
        }
    }
}
