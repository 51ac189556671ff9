//! Rule reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Qualifying desired addresses with the installation's rule prefix
//! - Listing the router's current rules for the batch's scope
//! - Deleting stale rules, then creating missing ones
//! - Returning the first collaborator error unchanged
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ ServiceController│─── desired addresses ───┐
//! └──────────────────┘                         │
//!                                              ▼
//!                                     ┌──────────────┐
//!                                     │  Reconciler  │
//!                                     └──────────────┘
//!                                              │
//!         ┌────────────────────────────────────┼───────────────────────┐
//!         │                                    │                       │
//!         ▼                                    ▼                       ▼
//! ┌─────────────┐                     ┌──────────────┐        ┌──────────────┐
//! │   Naming    │                     │  RuleStore   │        │ ChangeLogger │
//! │ (qualify)   │                     │ (list/apply) │        │  (notify)    │
//! └─────────────┘                     └──────────────┘        └──────────────┘
//! ```
//!
//! ## Call Flow
//!
//! 1. Validate the batch and qualify names
//! 2. List existing rules once and normalize them
//! 3. Compute the diff ([`diff`])
//! 4. Apply deletions, then creations, strictly one at a time
//!
//! The engine keeps no state between calls. Two calls for the same scope
//! must not overlap; serializing them is the caller's job.

pub mod diff;

use async_trait::async_trait;
use tracing::debug;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::naming::Naming;
use crate::scope::Scope;
use crate::traits::{ChangeLogger, RuleChange, RuleStore, TracingChangeLogger};

/// Mutations applied by a successful reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Rules removed, in the order they were deleted
    pub deleted: Vec<Address>,
    /// Rules added, in the order they were created
    pub created: Vec<Address>,
}

impl ReconcileSummary {
    /// Whether the router was left untouched
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.created.is_empty()
    }
}

/// Something that converges router rules on a desired set
///
/// Implemented by [`Reconciler`]; the service controller depends only on
/// this trait.
#[async_trait]
pub trait AddressReconciler: Send + Sync {
    /// Make the router hold exactly the desired rules for their names
    async fn create_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary>;

    /// Remove the rules of the given addresses
    async fn delete_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary>;
}

/// A validated, qualified batch of desired addresses
struct Batch {
    scope: Scope,
    qualified: Vec<Address>,
}

/// Core reconciliation engine
///
/// Holds only the immutable rule prefix and its collaborators.
pub struct Reconciler {
    /// Rule name derivation
    naming: Naming,

    /// Router rule table
    store: Box<dyn RuleStore>,

    /// Mutation hook
    logger: Box<dyn ChangeLogger>,
}

impl Reconciler {
    /// Create a reconciler logging changes through `tracing`
    ///
    /// # Parameters
    ///
    /// - `rule_prefix`: Prefix marking rules owned by this installation
    /// - `store`: Router rule table
    pub fn new(rule_prefix: impl Into<String>, store: Box<dyn RuleStore>) -> Self {
        Self {
            naming: Naming::new(rule_prefix),
            store,
            logger: Box::new(TracingChangeLogger),
        }
    }

    /// Replace the change logger
    pub fn with_logger(mut self, logger: Box<dyn ChangeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// The naming scheme in use
    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Converge the batch's scope on `desired`
    ///
    /// Stale rules (owned by a desired name but matching no desired record)
    /// are deleted first, then missing rules are created. A changed rule is
    /// therefore briefly absent.
    ///
    /// # Returns
    ///
    /// - `Ok(ReconcileSummary)`: everything applied
    /// - `Err(Error)`: the first failure; earlier mutations stay applied
    pub async fn create_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary> {
        let Some(batch) = self.prepare(desired)? else {
            debug!("No addresses to reconcile");
            return Ok(ReconcileSummary::default());
        };

        let existing = self.list_existing(&batch.scope).await?;
        let plan = diff::plan_create(&batch.qualified, &existing);

        debug!(
            "Scope {}: {} existing, {} stale, {} missing",
            batch.scope,
            existing.len(),
            plan.stale.len(),
            plan.missing.len()
        );

        let mut summary = ReconcileSummary::default();

        for address in plan.stale {
            self.logger.record(&RuleChange::StaleDeleted(address.clone()));
            self.store.delete(&address).await?;
            summary.deleted.push(address);
        }

        for address in plan.missing {
            self.logger.record(&RuleChange::Created(address.clone()));
            self.store.create(&address).await?;
            summary.created.push(address);
        }

        Ok(summary)
    }

    /// Remove exactly the rules of `desired`
    ///
    /// Addresses without a matching rule are skipped, so repeating a
    /// teardown is harmless.
    pub async fn delete_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary> {
        let Some(batch) = self.prepare(desired)? else {
            debug!("No addresses to delete");
            return Ok(ReconcileSummary::default());
        };

        let existing = self.list_existing(&batch.scope).await?;
        let mut summary = ReconcileSummary::default();

        for address in diff::rules_to_delete(&batch.qualified, &existing) {
            self.logger.record(&RuleChange::Deleted(address.clone()));
            self.store.delete(&address).await?;
            summary.deleted.push(address);
        }

        Ok(summary)
    }

    /// Validate and qualify a batch
    ///
    /// Returns `None` for an empty batch. Fails before any I/O when an
    /// address is invalid or the batch spans several scopes.
    fn prepare(&self, desired: &[Address]) -> Result<Option<Batch>> {
        let Some(first) = desired.first() else {
            return Ok(None);
        };

        for address in desired {
            address.validate()?;
            if address.scope() != first.scope() {
                return Err(Error::MixedScope {
                    first: first.scope().to_string(),
                    other: address.scope().to_string(),
                });
            }
        }

        Ok(Some(Batch {
            scope: first.scope().clone(),
            qualified: desired.iter().map(|a| self.naming.qualify(a)).collect(),
        }))
    }

    /// List rules of a scope with source ranges normalized
    async fn list_existing(&self, scope: &Scope) -> Result<Vec<Address>> {
        let rules = self.store.list(scope).await?;
        Ok(rules.into_iter().map(Address::normalized).collect())
    }
}

#[async_trait]
impl AddressReconciler for Reconciler {
    async fn create_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary> {
        Reconciler::create_addresses(self, desired).await
    }

    async fn delete_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary> {
        Reconciler::delete_addresses(self, desired).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRuleStore;

    #[tokio::test]
    async fn test_mixed_scope_fails_before_listing() {
        let store = MemoryRuleStore::new();
        store
            .insert(Address::new("test-a-80", 80, "1.1.1.1").with_scope(Scope::site("home")))
            .await;
        let reconciler = Reconciler::new("test-", Box::new(store.clone()));

        let desired = vec![
            Address::new("a", 80, "1.2.3.4").with_scope(Scope::site("home")),
            Address::new("a", 443, "1.2.3.4").with_scope(Scope::site("garage")),
        ];

        let err = reconciler.create_addresses(&desired).await.unwrap_err();
        assert!(matches!(err, Error::MixedScope { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let reconciler = Reconciler::new("test-", Box::new(MemoryRuleStore::new()));
        assert!(reconciler.create_addresses(&[]).await.unwrap().is_noop());
        assert!(reconciler.delete_addresses(&[]).await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_port_zero_rejected() {
        let reconciler = Reconciler::new("test-", Box::new(MemoryRuleStore::new()));
        let err = reconciler
            .create_addresses(&[Address::new("a", 0, "1.2.3.4")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
