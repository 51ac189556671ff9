// # Rule Store Implementations
//
// Router-independent implementations of the RuleStore trait.

pub mod memory;

pub use memory::{MemoryRuleStore, MemoryRuleStoreFactory};
