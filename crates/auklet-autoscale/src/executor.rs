//! Scale executor — applies a target replica count to a service.
//!
//! The executor re-reads the service before every update. If a previous
//! rollout is still in flight and not all replicas are running, the
//! request is dropped; the next poll decides again with fresh data.

use std::sync::Arc;

use auklet_metrics::{AutoscaleMetrics, ScaleDirection};
use auklet_swarm::{Orchestrator, OrchestratorError, ServiceRecord, UpdateState};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from a scale attempt.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("can't inspect service {id}: {source}")]
    Inspect {
        id: String,
        #[source]
        source: OrchestratorError,
    },

    #[error("can't update service {id}: {source}")]
    Update {
        id: String,
        #[source]
        source: OrchestratorError,
    },
}

/// What a scale attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// The update was accepted by the orchestrator.
    Updated {
        from: u64,
        to: u64,
        warnings: Vec<String>,
    },
    /// A rollout is in progress; nothing was submitted.
    NotReady {
        state: Option<UpdateState>,
        message: Option<String>,
    },
    /// The service already runs the target count.
    Unchanged { replicas: u64 },
}

/// Submits replica updates through the orchestrator.
#[derive(Clone)]
pub struct ScaleExecutor {
    orchestrator: Arc<dyn Orchestrator>,
    metrics: Arc<AutoscaleMetrics>,
}

impl ScaleExecutor {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, metrics: Arc<AutoscaleMetrics>) -> Self {
        Self {
            orchestrator,
            metrics,
        }
    }

    /// Scale a service to `target` replicas.
    pub async fn scale(&self, service_id: &str, target: u64) -> Result<ScaleOutcome, ScaleError> {
        let service = self
            .orchestrator
            .get_service(service_id)
            .await
            .map_err(|source| ScaleError::Inspect {
                id: service_id.to_string(),
                source,
            })?;

        let current = service.replicas.unwrap_or(1);
        if current == target {
            debug!(service_id, replicas = current, "service already at target");
            return Ok(ScaleOutcome::Unchanged { replicas: current });
        }

        if !service.rollout_completed() && !self.is_ready(&service, current).await {
            let (state, message) = match &service.update_status {
                Some(status) => (Some(status.state.clone()), status.message.clone()),
                None => (None, None),
            };
            info!(
                service_id,
                service = %service.name,
                state = state.as_ref().map(UpdateState::as_str).unwrap_or("unknown"),
                message = message.as_deref().unwrap_or(""),
                "wait: service not ready to scale"
            );
            return Ok(ScaleOutcome::NotReady { state, message });
        }

        let spec = service
            .spec_with_replicas(target)
            .map_err(|source| ScaleError::Update {
                id: service_id.to_string(),
                source,
            })?;

        let result = self
            .orchestrator
            .update_service(service_id, service.version, &spec)
            .await
            .map_err(|source| ScaleError::Update {
                id: service_id.to_string(),
                source,
            })?;

        for warning in &result.warnings {
            warn!(service_id, service = %service.name, %warning, "service update warning");
        }

        self.metrics
            .record_scale(service_id, ScaleDirection::between(current, target))
            .await;
        info!(
            service_id,
            service = %service.name,
            from = current,
            to = target,
            "scaled service"
        );

        Ok(ScaleOutcome::Updated {
            from: current,
            to: target,
            warnings: result.warnings,
        })
    }

    /// All desired replicas are running the current spec.
    async fn is_ready(&self, service: &ServiceRecord, desired: u64) -> bool {
        match self.orchestrator.list_ready_tasks(&service.id).await {
            Ok(tasks) => tasks.len() as u64 == desired,
            Err(e) => {
                debug!(service_id = %service.id, error = %e, "can't list service tasks");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{labels, FakeOrchestrator};
    use auklet_swarm::UpdateStatus;

    fn setup(replicas: u64) -> (Arc<FakeOrchestrator>, Arc<AutoscaleMetrics>, ScaleExecutor) {
        let orch = Arc::new(FakeOrchestrator::new());
        orch.add_service(ServiceRecord::replicated("s1", "web", labels(&[]), replicas));
        let metrics = Arc::new(AutoscaleMetrics::new());
        let exec = ScaleExecutor::new(orch.clone(), metrics.clone());
        (orch, metrics, exec)
    }

    fn rolling(orch: &FakeOrchestrator) {
        orch.update_record("s1", |s| {
            s.update_status = Some(UpdateStatus {
                state: UpdateState::Updating,
                message: Some("update in progress".to_string()),
            });
        });
    }

    #[tokio::test]
    async fn scales_and_counts() {
        let (orch, metrics, exec) = setup(2);

        let outcome = exec.scale("s1", 4).await.unwrap();
        assert_eq!(
            outcome,
            ScaleOutcome::Updated {
                from: 2,
                to: 4,
                warnings: vec![],
            }
        );
        assert_eq!(orch.updates(), vec![("s1".to_string(), 4)]);
        assert_eq!(orch.replicas("s1"), Some(4));

        let snap = metrics.snapshot().await;
        assert_eq!(snap.scale_events_total, 1);
        assert_eq!(snap.services[0].scale_up_events, 1);
    }

    #[tokio::test]
    async fn submits_inspected_version() {
        let (orch, _, exec) = setup(3);
        orch.update_record("s1", |s| s.version = 42);

        exec.scale("s1", 2).await.unwrap();
        assert_eq!(orch.update_versions(), vec![42]);
    }

    #[tokio::test]
    async fn skips_when_already_at_target() {
        let (orch, metrics, exec) = setup(4);

        let outcome = exec.scale("s1", 4).await.unwrap();
        assert_eq!(outcome, ScaleOutcome::Unchanged { replicas: 4 });
        assert!(orch.updates().is_empty());
        assert_eq!(metrics.snapshot().await.scale_events_total, 0);
    }

    #[tokio::test]
    async fn waits_while_rollout_in_progress() {
        let (orch, metrics, exec) = setup(2);
        rolling(&orch);
        orch.set_ready_tasks("s1", 1);

        let outcome = exec.scale("s1", 4).await.unwrap();
        assert_eq!(
            outcome,
            ScaleOutcome::NotReady {
                state: Some(UpdateState::Updating),
                message: Some("update in progress".to_string()),
            }
        );
        assert!(orch.updates().is_empty());
        assert_eq!(metrics.snapshot().await.scale_events_total, 0);
    }

    #[tokio::test]
    async fn rollout_with_all_tasks_ready_proceeds() {
        let (orch, _, exec) = setup(2);
        rolling(&orch);
        orch.set_ready_tasks("s1", 2);

        let outcome = exec.scale("s1", 4).await.unwrap();
        assert!(matches!(outcome, ScaleOutcome::Updated { to: 4, .. }));
    }

    #[tokio::test]
    async fn task_listing_failure_means_not_ready() {
        let (orch, _, exec) = setup(2);
        rolling(&orch);
        orch.fail_tasks(true);

        let outcome = exec.scale("s1", 4).await.unwrap();
        assert!(matches!(outcome, ScaleOutcome::NotReady { .. }));
    }

    #[tokio::test]
    async fn update_warnings_are_returned() {
        let (orch, _, exec) = setup(2);
        orch.set_update_warnings(vec!["image digest unpinned".to_string()]);

        let outcome = exec.scale("s1", 1).await.unwrap();
        assert_eq!(
            outcome,
            ScaleOutcome::Updated {
                from: 2,
                to: 1,
                warnings: vec!["image digest unpinned".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn inspect_failure_is_an_error() {
        let (orch, _, exec) = setup(2);
        orch.fail_get(true);

        let err = exec.scale("s1", 4).await.unwrap_err();
        assert!(matches!(err, ScaleError::Inspect { .. }));
        assert!(orch.updates().is_empty());
    }

    #[tokio::test]
    async fn global_service_cannot_be_scaled() {
        let (orch, _, exec) = setup(2);
        orch.update_record("s1", |s| {
            s.replicas = None;
            s.spec = serde_json::json!({ "Name": "web", "Mode": { "Global": {} } });
        });

        let err = exec.scale("s1", 4).await.unwrap_err();
        assert!(matches!(
            err,
            ScaleError::Update {
                source: OrchestratorError::NotReplicated(_),
                ..
            }
        ));
    }
}
