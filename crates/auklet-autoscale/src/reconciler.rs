//! Reconciler — keeps one monitor running per opted-in service.
//!
//! On startup the reconciler subscribes to service events, lists every
//! service, and starts a monitor for each that opts in. It then applies
//! events in arrival order:
//!
//! - `remove` stops the monitor
//! - `create` starts one if the service opts in
//! - `update` restarts the monitor, re-reading its labels
//!
//! An event stream failure is returned to the caller, which shuts the
//! process down. There is no reconnect.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use auklet_metrics::AutoscaleMetrics;
use auklet_prometheus::MetricSource;
use auklet_swarm::{
    EventAction, Orchestrator, OrchestratorError, ServiceEvent, ServiceRecord,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::descriptor::autoscale_enabled;
use crate::monitor::{supervise, MonitorContext};
use crate::registry::{MonitorHandle, Registry};

/// Fatal reconciler errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("can't list services: {0}")]
    ListServices(#[source] OrchestratorError),

    #[error("can't subscribe to service events: {0}")]
    Subscribe(#[source] OrchestratorError),

    #[error("service event stream failed: {0}")]
    EventStream(#[source] OrchestratorError),
}

pub struct Reconciler {
    ctx: MonitorContext,
    registry: Registry,
    root: CancellationToken,
}

impl Reconciler {
    /// `root` is the process lifetime token; every monitor gets a child.
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        source: Arc<dyn MetricSource>,
        metrics: Arc<AutoscaleMetrics>,
        root: CancellationToken,
    ) -> Self {
        let registry = Registry::new(metrics.clone());
        Self {
            ctx: MonitorContext {
                orchestrator,
                source,
                metrics,
            },
            registry,
            root,
        }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Start a monitor for `service` if it opts in and has none yet.
    pub async fn start_monitor(&self, service: ServiceRecord) -> bool {
        if !autoscale_enabled(&service.labels) {
            debug!(service_id = %service.id, service = %service.name, "autoscale not enabled");
            return false;
        }

        let service_id = service.id.clone();
        let ctx = self.ctx.clone();
        let registry = self.registry.clone();
        let cancel = self.root.child_token();

        let started = self
            .registry
            .insert_if_absent(&service_id, move |generation| {
                let task = tokio::spawn(supervise(
                    service,
                    ctx,
                    registry,
                    generation,
                    cancel.clone(),
                ));
                MonitorHandle {
                    generation,
                    cancel,
                    task,
                }
            })
            .await;
        if started {
            info!(%service_id, "monitoring service");
        }
        started
    }

    /// Cancel and deregister the monitor for `service_id`.
    pub async fn stop_monitor(&self, service_id: &str) -> bool {
        let stopped = self.registry.remove(service_id).await;
        if stopped {
            info!(service_id, "stopped monitoring service");
        }
        stopped
    }

    /// Fetch the service and start a monitor for it.
    async fn add_monitor(&self, service_id: &str) {
        match self.ctx.orchestrator.get_service(service_id).await {
            Ok(service) => {
                self.start_monitor(service).await;
            }
            Err(e) => warn!(service_id, error = %e, "can't inspect service"),
        }
    }

    /// Apply one service event.
    pub async fn handle_event(&self, event: ServiceEvent) {
        debug!(
            action = %event.action,
            service_id = %event.actor_id,
            service = event.service_name().unwrap_or(""),
            "service event"
        );
        match event.action {
            EventAction::Remove => {
                self.stop_monitor(&event.actor_id).await;
            }
            EventAction::Create => self.add_monitor(&event.actor_id).await,
            EventAction::Update => {
                self.stop_monitor(&event.actor_id).await;
                self.add_monitor(&event.actor_id).await;
            }
            EventAction::Other(_) => {}
        }
    }

    /// Start monitors for every opted-in service.
    pub async fn bootstrap(&self) -> Result<usize, ReconcileError> {
        let services = self
            .ctx
            .orchestrator
            .list_services()
            .await
            .map_err(ReconcileError::ListServices)?;

        let mut started = 0;
        for service in services {
            debug!(service_id = %service.id, service = %service.name, "found service");
            if self.start_monitor(service).await {
                started += 1;
            }
        }
        let monitored = self.registry.len().await;
        info!(started, monitored, "bootstrap complete");
        Ok(started)
    }

    /// Subscribe, bootstrap, and apply events until cancelled.
    ///
    /// Returns `Ok` when the root token is cancelled and an error when the
    /// event stream fails or closes.
    pub async fn run(&self) -> Result<(), ReconcileError> {
        // Subscribe first so no event between list and subscribe is lost.
        let mut events = self
            .ctx
            .orchestrator
            .events(SystemTime::now())
            .await
            .map_err(ReconcileError::Subscribe)?;

        self.bootstrap().await?;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.root.cancelled() => return Ok(()),
                next = events.recv() => next,
            };
            match next {
                Some(Ok(event)) => self.handle_event(event).await,
                Some(Err(e)) => {
                    error!(error = %e, "service event stream failed");
                    return Err(ReconcileError::EventStream(e));
                }
                None => {
                    error!("service event stream closed");
                    return Err(ReconcileError::EventStream(OrchestratorError::StreamClosed));
                }
            }
        }
    }

    /// Cancel every monitor and wait up to `grace` for them to exit.
    /// Monitors still running after that are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        self.root.cancel();
        let handles = self.registry.drain().await;
        let count = handles.len();
        info!(monitors = count, "stopping monitors");

        let mut tasks = Vec::with_capacity(count);
        for handle in handles {
            handle.cancel.cancel();
            tasks.push(handle.task);
        }

        let abort_handles: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        let joined = tokio::time::timeout(grace, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;

        if joined.is_err() {
            warn!(?grace, "monitors did not stop in time, aborting");
            for handle in abort_handles {
                handle.abort();
            }
        }
    }
}
