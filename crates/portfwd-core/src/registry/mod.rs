//! Plugin-based rule store registry
//!
//! Router integrations register a factory under their type name; the
//! daemon builds the configured store without knowing which crates are
//! linked in.
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In the portfwd-unifi crate
//! pub fn register(registry: &StoreRegistry) {
//!     registry.register_store("unifi", Box::new(UnifiFactory));
//! }
//! ```

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::store::MemoryRuleStoreFactory;
use crate::traits::{RuleStore, RuleStoreFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry of rule store factories keyed by router type name
///
/// Uses interior mutability, so registration works through a shared
/// reference.
#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Box<dyn RuleStoreFactory>>>,
}

impl StoreRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` store registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryRuleStoreFactory));
        registry
    }

    /// Register a factory, replacing any previous one of the same name
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use portfwd_core::registry::StoreRegistry;
    /// # use portfwd_core::store::MemoryRuleStoreFactory;
    /// let registry = StoreRegistry::new();
    /// registry.register_store("memory", Box::new(MemoryRuleStoreFactory));
    /// assert!(registry.has_store("memory"));
    /// ```
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn RuleStoreFactory>) {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), factory);
    }

    /// Build the rule store for `config`
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn RuleStore>)`: Created store
    /// - `Err(Error)`: Unknown router type, or the factory rejected the config
    pub fn create_store(&self, config: &RouterConfig) -> Result<Box<dyn RuleStore>> {
        let store_type = config.type_name();
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);

        let factory = stores
            .get(store_type)
            .ok_or_else(|| Error::config(format!("Unknown router type: {}", store_type)))?;

        factory.create(config)
    }

    /// Registered router type names, sorted
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a router type is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
