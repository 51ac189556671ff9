// # Change Logger Trait
//
// Hook notified of every mutation the reconciler applies to a router.
//
// ## Implementations
//
// - `TracingChangeLogger`: structured `tracing` events (default)
// - `ChannelChangeLogger`: forwards changes over a bounded channel for
//   monitoring and tests

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::address::Address;

/// A mutation applied to a router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleChange {
    /// A rule no longer matching its desired address is being removed
    StaleDeleted(Address),
    /// A missing rule is being added
    Created(Address),
    /// A rule of a torn-down resource is being removed
    Deleted(Address),
}

impl RuleChange {
    /// The rule being changed
    pub fn address(&self) -> &Address {
        match self {
            RuleChange::StaleDeleted(a) | RuleChange::Created(a) | RuleChange::Deleted(a) => a,
        }
    }

    /// Human readable description of the change
    pub fn describe(&self) -> &'static str {
        match self {
            RuleChange::StaleDeleted(_) => "deleting stale port forwarding rule",
            RuleChange::Created(_) => "adding port forwarding rule",
            RuleChange::Deleted(_) => "deleting port forwarding rule",
        }
    }
}

/// Trait for change logger implementations
///
/// Called right before the corresponding store call is issued, so a change
/// reported here may still fail.
pub trait ChangeLogger: Send + Sync {
    /// Record a change about to be applied
    fn record(&self, change: &RuleChange);
}

/// Logs changes as structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChangeLogger;

impl ChangeLogger for TracingChangeLogger {
    fn record(&self, change: &RuleChange) {
        let address = change.address();
        info!(
            name = address.name(),
            port = address.port(),
            ip = address.ip(),
            "{}",
            change.describe()
        );
    }
}

/// Forwards changes over a bounded channel
///
/// When the receiver falls behind, changes are dropped with a warning
/// instead of blocking the reconciliation.
#[derive(Debug, Clone)]
pub struct ChannelChangeLogger {
    tx: mpsc::Sender<RuleChange>,
}

impl ChannelChangeLogger {
    /// Create a logger and the receiver yielding its changes
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RuleChange>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ChangeLogger for ChannelChangeLogger {
    fn record(&self, change: &RuleChange) {
        if self.tx.try_send(change.clone()).is_err() {
            warn!(
                "Change channel full or closed, dropping change for {}",
                change.address().name()
            );
        }
    }
}
