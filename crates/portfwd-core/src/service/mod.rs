//! Network services and the controller that forwards ports to them
//!
//! - [`resource`]: service model, eligibility and address derivation
//! - [`controller`]: finalizer-guarded lifecycle and periodic resync
//! - [`memory`] / [`file`]: [`ServiceStore`](crate::traits::ServiceStore)
//!   implementations

pub mod controller;
pub mod file;
pub mod memory;
pub mod resource;

pub use controller::{ControllerEvent, ResyncReport, ServiceController, ServiceOutcome};
pub use file::FileServiceStore;
pub use memory::MemoryServiceStore;
pub use resource::{ServiceKey, ServicePort, ServiceResource, ServiceType};

use crate::config::ServiceStoreConfig;
use crate::error::Result;
use crate::traits::ServiceStore;
use std::sync::Arc;

/// Open the service store described by `config`
pub async fn open_store(config: &ServiceStoreConfig) -> Result<Arc<dyn ServiceStore>> {
    config.validate()?;
    Ok(match config {
        ServiceStoreConfig::File { path } => Arc::new(FileServiceStore::new(path).await?),
        ServiceStoreConfig::Memory => Arc::new(MemoryServiceStore::new()),
    })
}
