//! Core traits for the port-forwarding system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RuleStore`]: List, create and delete router rules
//! - [`ChangeLogger`]: Observe mutations applied by the reconciler
//! - [`ServiceStore`]: Source of services and their lifecycle markers

pub mod rule_store;
pub mod change_logger;
pub mod service_store;

pub use rule_store::{RuleStore, RuleStoreFactory};
pub use change_logger::{ChangeLogger, ChannelChangeLogger, RuleChange, TracingChangeLogger};
pub use service_store::ServiceStore;
