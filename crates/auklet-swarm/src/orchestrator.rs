//! The orchestrator contract the autoscaler is written against.

use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{ServiceEvent, ServiceRecord, TaskRecord, UpdateResult};

/// Live sequence of service events.
///
/// Yields `Ok` items in emission order. A stream failure is delivered as
/// a single `Err` item, after which the channel closes.
pub type EventStream = mpsc::Receiver<Result<ServiceEvent, OrchestratorError>>;

/// Cluster orchestrator operations used by the autoscaler.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List every service in the cluster.
    async fn list_services(&self) -> OrchestratorResult<Vec<ServiceRecord>>;

    /// Inspect one service by ID.
    async fn get_service(&self, id: &str) -> OrchestratorResult<ServiceRecord>;

    /// Submit a full service spec at the given version.
    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &Value,
    ) -> OrchestratorResult<UpdateResult>;

    /// Running, up-to-date tasks of a service.
    async fn list_ready_tasks(&self, service_id: &str) -> OrchestratorResult<Vec<TaskRecord>>;

    /// Subscribe to service lifecycle events emitted after `since`.
    async fn events(&self, since: SystemTime) -> OrchestratorResult<EventStream>;
}
