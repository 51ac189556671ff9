// # portfwd-core
//
// Core library for the port-forwarding controller.
//
// ## Architecture Overview
//
// This library keeps a router's port-forwarding table in line with a set of
// network services:
// - **Address**: One desired forwarding rule (name, port, IP, source, scope)
// - **Naming**: Rule names owned by this installation (prefix + port suffix)
// - **RuleStore**: Trait for listing/creating/deleting rules on a router
// - **Reconciler**: Diffs desired addresses against the router and applies changes
// - **ServiceController**: Derives addresses from services and guards teardown
//   with a finalizer
// - **StoreRegistry**: Plugin-based registry for router integrations
//
// ## Design Principles
//
// 1. **Stateless engine**: Every reconcile lists the router afresh
// 2. **Ownership by name**: Only rules carrying the prefix are ever touched
// 3. **Fail fast**: The first router error aborts a reconcile; resync retries
// 4. **Plugin-Based**: Router integrations register factories, no if-else chains
// 5. **Library-First**: All core functionality can be used as a library

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod naming;
pub mod registry;
pub mod scope;
pub mod service;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use address::Address;
pub use config::{
    AnnotationConfig, ControllerConfig, PortForwardConfig, RouterConfig, ServiceStoreConfig,
};
pub use engine::{AddressReconciler, ReconcileSummary, Reconciler};
pub use error::{Error, Result};
pub use naming::Naming;
pub use registry::StoreRegistry;
pub use scope::Scope;
pub use service::{
    ControllerEvent, FileServiceStore, MemoryServiceStore, ServiceController, ServiceKey,
    ServiceResource,
};
pub use store::MemoryRuleStore;
pub use traits::{ChangeLogger, RuleChange, RuleStore, RuleStoreFactory, ServiceStore};
