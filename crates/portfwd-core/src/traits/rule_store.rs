// # Rule Store Trait
//
// Defines the interface to the router's port-forwarding table.
//
// ## Implementations
//
// - UniFi controller: `portfwd-unifi` crate
// - In-memory: `portfwd_core::store::MemoryRuleStore`
//
// ## Usage
//
// ```rust,ignore
// use portfwd_core::{Address, RuleStore, Scope};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* RuleStore implementation */;
//
//     let rules = store.list(&Scope::site("home")).await?;
//     store.create(&Address::new("pf-default-web-443", 443, "10.0.0.5")).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::address::Address;
use crate::scope::Scope;

/// Trait for router rule table implementations
///
/// # Trust Level: Untrusted
///
/// Rule stores talk to external routers and stay thin:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to the router they wrap
/// - ✅ Re-authenticate once when the router reports an expired session
/// - ✅ Translate router records into [`Address`] values and back
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off beyond the single re-login (owned by the caller)
/// - ❌ Cache rules between calls (the reconciler always re-lists)
/// - ❌ Decide which rules should exist (owned by `Reconciler`)
/// - ❌ Spawn tasks or threads
///
/// ## Record Conventions
///
/// - `list` normalizes the router's `"any"` source sentinel to `""` and
///   stamps every returned address with the requested scope.
/// - `create` maps an empty source range back to `"any"`.
/// - Names passed to `create`/`delete` are already fully qualified
///   (prefix and port suffix applied).
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// List every rule visible under `scope`
    ///
    /// Ordering is unspecified and must not be relied on.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Address>)`: all rules of the partition
    /// - `Err(Error::List)`: the round-trip failed
    /// - `Err(Error::MalformedRecord)`: a rule could not be parsed
    async fn list(&self, scope: &Scope) -> Result<Vec<Address>, crate::Error>;

    /// Create a single fully-qualified rule
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the rule was added
    /// - `Err(Error::Create)`: the call failed
    async fn create(&self, address: &Address) -> Result<(), crate::Error>;

    /// Delete a single fully-qualified rule
    ///
    /// Deleting a rule that is already gone is not an error.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the rule is absent afterwards
    /// - `Err(Error::Delete)`: the call failed
    async fn delete(&self, address: &Address) -> Result<(), crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing rule stores from configuration
pub trait RuleStoreFactory: Send + Sync {
    /// Create a RuleStore instance from configuration
    ///
    /// # Returns
    ///
    /// A boxed RuleStore trait object
    fn create(
        &self,
        config: &crate::config::RouterConfig,
    ) -> Result<Box<dyn RuleStore>, crate::Error>;
}
