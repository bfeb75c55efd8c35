//! Monitor task — one per autoscaled service.
//!
//! Every poll interval the monitor evaluates the service's query, reads
//! the actual replica count, steps the service controller, and hands any
//! scale request to the executor. Each outbound call is raced against
//! the monitor's cancellation token, so a cancelled monitor stops without
//! waiting for a slow call to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use auklet_metrics::AutoscaleMetrics;
use auklet_prometheus::MetricSource;
use auklet_swarm::{Orchestrator, ServiceRecord};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::{Decision, ServiceController};
use crate::descriptor::ServiceConfig;
use crate::executor::{ScaleExecutor, ScaleOutcome};
use crate::registry::Registry;

/// Collaborators shared by all monitors.
#[derive(Clone)]
pub struct MonitorContext {
    pub orchestrator: Arc<dyn Orchestrator>,
    pub source: Arc<dyn MetricSource>,
    pub metrics: Arc<AutoscaleMetrics>,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Cancelled mid-cycle.
    Cancelled,
    /// The query failed; the controller was not stepped.
    MetricUnavailable,
    /// No replica count, fresh or cached.
    ReplicasUnavailable,
    /// Controller stepped; nothing sent to the executor.
    Evaluated(Decision),
    /// Executor ran.
    Scaled(ScaleOutcome),
    /// Executor failed.
    ScaleFailed,
}

pub struct Monitor {
    controller: ServiceController,
    executor: ScaleExecutor,
    ctx: MonitorContext,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(config: ServiceConfig, ctx: MonitorContext, cancel: CancellationToken) -> Self {
        let executor = ScaleExecutor::new(ctx.orchestrator.clone(), ctx.metrics.clone());
        Self {
            controller: ServiceController::new(config),
            executor,
            ctx,
            cancel,
        }
    }

    pub fn controller(&self) -> &ServiceController {
        &self.controller
    }

    /// Poll until cancelled. The first poll happens one interval in.
    pub async fn run(mut self) {
        let period = self.controller.config().poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            service_id = %self.controller.config().service_id,
            service = %self.controller.config().service_name,
            interval = ?period,
            "monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.poll_once().await == PollOutcome::Cancelled {
                break;
            }
        }

        info!(
            service_id = %self.controller.config().service_id,
            "monitor stopped"
        );
    }

    /// Run a single poll cycle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let config = self.controller.config().clone();
        let service_id = config.service_id.as_str();

        let metric = match self
            .cancellable(self.ctx.source.query(&config.query, SystemTime::now()))
            .await
        {
            None => return PollOutcome::Cancelled,
            Some(Ok(value)) => {
                self.ctx.metrics.record_query(true);
                value
            }
            Some(Err(e)) => {
                self.ctx.metrics.record_query(false);
                error!(service_id, query = %config.query, error = %e, "metric query failed");
                return PollOutcome::MetricUnavailable;
            }
        };

        let fresh = match self
            .cancellable(self.ctx.orchestrator.get_service(service_id))
            .await
        {
            None => return PollOutcome::Cancelled,
            Some(Ok(service)) => service.replicas,
            Some(Err(e)) => {
                warn!(service_id, error = %e, "can't read replica count");
                None
            }
        };
        let Some(replicas) = fresh.or(self.controller.replicas()) else {
            warn!(service_id, "no replica count available, skipping cycle");
            return PollOutcome::ReplicasUnavailable;
        };

        debug!(service_id, metric, replicas, "evaluating service");
        let decision = self
            .controller
            .evaluate(metric, replicas, Instant::now().into_std());

        let request = match decision {
            Decision::Scale(request) => request,
            other => return PollOutcome::Evaluated(other),
        };

        match self
            .cancellable(self.executor.scale(service_id, request.target))
            .await
        {
            None => PollOutcome::Cancelled,
            Some(Ok(outcome)) => PollOutcome::Scaled(outcome),
            Some(Err(e)) => {
                error!(service_id, target = request.target, error = %e, "scale failed");
                PollOutcome::ScaleFailed
            }
        }
    }

    async fn cancellable<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

/// Body of a spawned monitor task.
///
/// Validates the service's labels first. On failure the task removes its
/// own registry entry and exits without polling.
pub(crate) async fn supervise(
    service: ServiceRecord,
    ctx: MonitorContext,
    registry: Registry,
    generation: u64,
    cancel: CancellationToken,
) {
    let config = match ServiceConfig::from_service(&service) {
        Ok(config) => config,
        Err(e) => {
            error!(
                service_id = %service.id,
                service = %service.name,
                error = %e,
                "invalid autoscale configuration"
            );
            registry.remove_generation(&service.id, generation).await;
            return;
        }
    };

    ctx.metrics
        .register_service(&config.service_id, &config.service_name)
        .await;
    Monitor::new(config, ctx, cancel).run().await;
}
