// # Service Store Trait
//
// Defines the interface to the set of network-service resources the
// controller watches.
//
// ## Purpose
//
// The service store is the controller's source of desired state and the
// place where the lifecycle marker (finalizer) is persisted:
// - Services to expose and their annotations
// - Finalizers recording that router rules may exist
// - Deletion requests that must tear rules down first
//
// ## Implementations
//
// - File-based: JSON file edited by operators or tooling
// - In-memory: embedding and tests

use async_trait::async_trait;

use crate::service::{ServiceKey, ServiceResource};

/// Trait for service store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Talk to routers (owned by `RuleStore`)
/// - ❌ Decide when a service is reconciled (owned by `ServiceController`)
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Fetch a single service
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ServiceResource))`: the service exists
    /// - `Ok(None)`: no such service
    /// - `Err(Error)`: storage error
    async fn get(&self, key: &ServiceKey) -> Result<Option<ServiceResource>, crate::Error>;

    /// List the keys of every known service
    async fn list(&self) -> Result<Vec<ServiceKey>, crate::Error>;

    /// Create or replace a service
    async fn update(&self, service: &ServiceResource) -> Result<(), crate::Error>;

    /// Remove a service (no-op when absent)
    async fn remove(&self, key: &ServiceKey) -> Result<(), crate::Error>;

    /// Pick up changes made outside this process
    ///
    /// Stores without an external backing copy have nothing to do.
    async fn reload(&self) -> Result<(), crate::Error> {
        Ok(())
    }
}
