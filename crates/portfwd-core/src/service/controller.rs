//! Service controller
//!
//! Turns network services into desired addresses and drives the reconciler.
//!
//! ## Lifecycle of a service
//!
//! 1. Eligible service, no finalizer: rules are converged, then the
//!    finalizer is recorded
//! 2. Eligible service with finalizer: rules are converged on every resync
//! 3. Deletion requested, finalizer present: rules are removed, then the
//!    finalizer is dropped; a service left without finalizers is purged
//! 4. Deletion requested, no finalizers at all: the service is purged
//!
//! Ineligible services are left alone. A failed reconcile keeps the
//! finalizer, so teardown is retried on the next resync.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

use crate::config::{AnnotationConfig, ControllerConfig};
use crate::engine::{AddressReconciler, ReconcileSummary};
use crate::error::Result;
use crate::service::{ServiceKey, ServiceResource};
use crate::traits::ServiceStore;

/// What a single reconcile did to a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// The service does not exist
    NotFound,
    /// Not eligible, or nothing of ours to tear down
    Skipped,
    /// Rules converged on the service's desired addresses
    Synced(ReconcileSummary),
    /// Rules removed and finalizer released
    TornDown(ReconcileSummary),
    /// Deleted service without finalizers removed from the store
    Purged,
}

/// Counts from one pass over every service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncReport {
    /// Services converged
    pub synced: usize,
    /// Services torn down
    pub torn_down: usize,
    /// Services skipped, missing or purged
    pub skipped: usize,
    /// Services whose reconcile failed
    pub failed: usize,
}

/// Controller events for external monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// Controller started
    Started {
        resync_interval_secs: u64,
    },

    /// A service's rules were converged
    ServiceSynced {
        service: String,
        created: usize,
        deleted: usize,
    },

    /// A service's rules were removed
    ServiceTornDown {
        service: String,
        deleted: usize,
    },

    /// Reconciling a service failed
    ServiceFailed {
        service: String,
        error: String,
    },

    /// A full resync finished
    ResyncCompleted {
        report: ResyncReport,
    },

    /// Controller stopped
    Stopped {
        reason: String,
    },
}

/// Drives services through their port-forwarding lifecycle
///
/// Services are processed one at a time, so two reconciles never touch the
/// router concurrently.
pub struct ServiceController {
    /// Rule reconciliation
    reconciler: Arc<dyn AddressReconciler>,

    /// Source of services and home of finalizers
    services: Arc<dyn ServiceStore>,

    /// Annotation keys
    annotations: AnnotationConfig,

    /// Time between full resyncs
    resync_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ControllerEvent>,
}

impl ServiceController {
    /// Create a new controller
    ///
    /// # Returns
    ///
    /// A tuple of (controller, event_receiver) where event_receiver yields
    /// controller events
    pub fn new(
        reconciler: Arc<dyn AddressReconciler>,
        services: Arc<dyn ServiceStore>,
        annotations: AnnotationConfig,
        config: &ControllerConfig,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>)> {
        annotations.validate()?;
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let controller = Self {
            reconciler,
            services,
            annotations,
            resync_interval: Duration::from_secs(config.resync_interval_secs),
            event_tx: tx,
        };

        Ok((controller, rx))
    }

    /// Annotation keys in use
    pub fn annotations(&self) -> &AnnotationConfig {
        &self.annotations
    }

    /// Reconcile one service
    pub async fn reconcile(&self, key: &ServiceKey) -> Result<ServiceOutcome> {
        let Some(mut service) = self.services.get(key).await? else {
            debug!("Service {} not found", key);
            return Ok(ServiceOutcome::NotFound);
        };

        let finalizer = self.annotations.finalizer_name();

        if service.is_being_deleted() {
            if service.has_finalizer(&finalizer) {
                return self.tear_down(service, &finalizer).await;
            }
            if service.finalizers.is_empty() {
                self.services.remove(key).await?;
                info!("Purged deleted service {}", key);
                return Ok(ServiceOutcome::Purged);
            }
            debug!("Service {} is deleting, waiting on other finalizers", key);
            return Ok(ServiceOutcome::Skipped);
        }

        if !service.is_eligible(&self.annotations) {
            debug!("Service {} is not eligible for port forwarding", key);
            return Ok(ServiceOutcome::Skipped);
        }

        let desired = service.desired_addresses(&self.annotations)?;
        let summary = self.reconciler.create_addresses(&desired).await?;

        if service.add_finalizer(&finalizer) {
            self.services.update(&service).await?;
            debug!("Added finalizer {} to {}", finalizer, key);
        }

        if !summary.is_noop() {
            info!(
                "Service {}: {} rules created, {} deleted",
                key,
                summary.created.len(),
                summary.deleted.len()
            );
        }

        Ok(ServiceOutcome::Synced(summary))
    }

    /// Remove a deleting service's rules, then release its finalizer
    async fn tear_down(&self, mut service: ServiceResource, finalizer: &str) -> Result<ServiceOutcome> {
        let key = service.key();
        let desired = service.teardown_addresses(&self.annotations);
        let summary = self.reconciler.delete_addresses(&desired).await?;

        service.remove_finalizer(finalizer);
        if service.finalizers.is_empty() {
            self.services.remove(&key).await?;
        } else {
            self.services.update(&service).await?;
        }

        info!(
            "Service {} torn down: {} rules deleted",
            key,
            summary.deleted.len()
        );
        Ok(ServiceOutcome::TornDown(summary))
    }

    /// Reconcile every service once
    ///
    /// Failures are logged and counted; the pass continues with the next
    /// service. Only a failure to read the service store aborts the pass.
    pub async fn resync(&self) -> Result<ResyncReport> {
        self.services.reload().await?;
        let keys = self.services.list().await?;
        let mut report = ResyncReport::default();

        for key in keys {
            match self.reconcile(&key).await {
                Ok(ServiceOutcome::Synced(summary)) => {
                    report.synced += 1;
                    self.emit_event(ControllerEvent::ServiceSynced {
                        service: key.to_string(),
                        created: summary.created.len(),
                        deleted: summary.deleted.len(),
                    });
                }
                Ok(ServiceOutcome::TornDown(summary)) => {
                    report.torn_down += 1;
                    self.emit_event(ControllerEvent::ServiceTornDown {
                        service: key.to_string(),
                        deleted: summary.deleted.len(),
                    });
                }
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("Failed to reconcile service {}: {}", key, e);
                    self.emit_event(ControllerEvent::ServiceFailed {
                        service: key.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!(
            "Resync finished: {} synced, {} torn down, {} skipped, {} failed",
            report.synced, report.torn_down, report.skipped, report.failed
        );
        self.emit_event(ControllerEvent::ResyncCompleted { report });

        Ok(report)
    }

    /// Run until SIGINT
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Run until the oneshot fires (or its sender is dropped)
    pub async fn run_with_shutdown(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_until(async {
            let _ = shutdown_rx.await;
        })
        .await
    }

    /// Resync immediately, then on every interval tick until `shutdown`
    /// completes
    ///
    /// A resync in progress finishes before shutdown is observed.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.emit_event(ControllerEvent::Started {
            resync_interval_secs: self.resync_interval.as_secs(),
        });
        info!(
            "Service controller started (resync every {}s)",
            self.resync_interval.as_secs()
        );

        let mut ticks = IntervalStream::new(tokio::time::interval(self.resync_interval));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    if let Err(e) = self.resync().await {
                        error!("Resync failed: {}", e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(ControllerEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        Ok(())
    }

    fn emit_event(&self, event: ControllerEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_event_serialization() {
        let event = ControllerEvent::ServiceSynced {
            service: "default/web".to_string(),
            created: 2,
            deleted: 1,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "service_synced");
        assert_eq!(json["service"], "default/web");

        let back: ControllerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_resync_report_default_is_zero() {
        assert_eq!(
            ResyncReport::default(),
            ResyncReport {
                synced: 0,
                torn_down: 0,
                skipped: 0,
                failed: 0
            }
        );
    }
}
