// # File Service Store
//
// File-based implementation of ServiceStore with crash recovery.
//
// ## Purpose
//
// Lets the daemon run against a JSON file of services instead of a cluster
// API. Operators (or tooling) edit the file; the controller reloads it on
// every resync and writes finalizer changes back.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Corruption detection: JSON is validated on load
// - Automatic backup: `.backup` holds the previous good copy
// - Recovery: at startup, falls back to the backup when the main file is corrupted
// - Reload: a corrupted file is left alone and the last good services stay loaded
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "services": [
//     {
//       "namespace": "default",
//       "name": "web",
//       "type": "LoadBalancer",
//       "ports": [{ "port": 443 }],
//       "loadBalancerIP": "192.168.1.50",
//       "annotations": { "port-forwarding.lylefranklin.com/enable": "true" }
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::service::{ServiceKey, ServiceResource};
use crate::traits::ServiceStore;
use crate::{Error, Result};

/// Services file format version
const SERVICES_FILE_VERSION: &str = "1.0";

type ServiceMap = BTreeMap<ServiceKey, ServiceResource>;

/// File-based service store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use portfwd_core::service::{FileServiceStore, ServiceKey};
/// use portfwd_core::ServiceStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileServiceStore::new("/var/lib/portfwd/services.json").await?;
///
///     for key in store.list().await? {
///         println!("{}", key);
///     }
///
///     let web = store.get(&ServiceKey::new("default", "web")).await?;
///     println!("{:?}", web);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileServiceStore {
    path: PathBuf,
    services: Arc<RwLock<ServiceMap>>,
}

/// Serializable services file
#[derive(Debug, Serialize, Deserialize)]
struct ServicesFile {
    version: String,
    #[serde(default)]
    services: Vec<ServiceResource>,
}

impl FileServiceStore {
    /// Create or load a file service store
    ///
    /// A missing file is an empty service set. Parent directories are
    /// created as needed.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create services directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let services = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            services: Arc::new(RwLock::new(services)),
        })
    }

    /// Path of the services file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load services, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<ServiceMap> {
        let err = match Self::load(path).await {
            Ok(services) => {
                tracing::debug!("Loaded {} services from {}", services.len(), path.display());
                return Ok(services);
            }
            Err(Error::Json(err)) => err,
            Err(other) => return Err(other),
        };

        tracing::warn!(
            "Services file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with no services.");
            return Ok(ServiceMap::new());
        }

        match Self::load(&backup_path).await {
            Ok(services) => {
                tracing::info!("Recovered {} services from backup", services.len());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!(
                        "Failed to restore services file from backup: {}",
                        restore_err
                    );
                }
                Ok(services)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with no services.",
                    backup_err
                );
                Ok(ServiceMap::new())
            }
        }
    }

    /// Parse a services file
    ///
    /// Parse failures surface as [`Error::Json`].
    async fn load(path: &Path) -> Result<ServiceMap> {
        if !path.exists() {
            tracing::debug!("Services file does not exist: {}", path.display());
            return Ok(ServiceMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::service_store(format!(
                "Failed to read services file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: ServicesFile = serde_json::from_str(&content)?;

        if file.version != SERVICES_FILE_VERSION {
            tracing::warn!(
                "Services file version mismatch: expected {}, got {}. Attempting to load anyway.",
                SERVICES_FILE_VERSION,
                file.version
            );
        }

        Ok(file
            .services
            .into_iter()
            .map(|service| (service.key(), service))
            .collect())
    }

    /// Write the current services atomically
    async fn write(&self, services: &ServiceMap) -> Result<()> {
        let file = ServicesFile {
            version: SERVICES_FILE_VERSION.to_string(),
            services: services.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::service_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await?;
            out.flush().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::service_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Services written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ServiceStore for FileServiceStore {
    async fn get(&self, key: &ServiceKey) -> Result<Option<ServiceResource>> {
        Ok(self.services.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<ServiceKey>> {
        Ok(self.services.read().await.keys().cloned().collect())
    }

    async fn update(&self, service: &ServiceResource) -> Result<()> {
        let mut guard = self.services.write().await;
        guard.insert(service.key(), service.clone());
        self.write(&guard).await
    }

    async fn remove(&self, key: &ServiceKey) -> Result<()> {
        let mut guard = self.services.write().await;
        if guard.remove(key).is_none() {
            return Ok(());
        }
        self.write(&guard).await
    }

    /// Pick up external edits
    ///
    /// A file that fails to parse is left untouched on disk and the services
    /// already in memory stay in effect until it is fixed.
    async fn reload(&self) -> Result<()> {
        let services = match Self::load(&self.path).await {
            Ok(services) => services,
            Err(Error::Json(err)) => {
                tracing::warn!(
                    "Services file {} is not valid JSON, keeping previous services: {}",
                    self.path.display(),
                    err
                );
                return Ok(());
            }
            Err(other) => return Err(other),
        };
        *self.services.write().await = services;
        Ok(())
    }
}
