//! Domain types exchanged with the orchestrator.
//!
//! These mirror the parts of Docker's service, task, and event objects
//! the autoscaler needs. `ServiceRecord` keeps the raw service spec so an
//! update can resubmit it unchanged apart from the replica count.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Unique identifier for a Swarm service.
pub type ServiceId = String;

// ── Services ───────────────────────────────────────────────────────

/// State of the most recent rolling update of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Updating,
    Paused,
    Completed,
    RollbackStarted,
    RollbackPaused,
    RollbackCompleted,
    #[serde(other)]
    Unknown,
}

impl UpdateState {
    /// Docker's wire name for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateState::Updating => "updating",
            UpdateState::Paused => "paused",
            UpdateState::Completed => "completed",
            UpdateState::RollbackStarted => "rollback_started",
            UpdateState::RollbackPaused => "rollback_paused",
            UpdateState::RollbackCompleted => "rollback_completed",
            UpdateState::Unknown => "unknown",
        }
    }
}

/// Rollout status attached to a service after its first update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStatus {
    pub state: UpdateState,
    pub message: Option<String>,
}

/// A service as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
    pub labels: HashMap<String, String>,
    /// Declared replica count; `None` for global-mode services.
    pub replicas: Option<u64>,
    /// Absent until the service has been updated at least once.
    pub update_status: Option<UpdateStatus>,
    /// Version index required by the update call.
    pub version: u64,
    /// The service spec exactly as returned by the orchestrator.
    pub spec: Value,
}

impl ServiceRecord {
    /// Build a replicated-mode record with a minimal spec.
    pub fn replicated(
        id: &str,
        name: &str,
        labels: HashMap<String, String>,
        replicas: u64,
    ) -> Self {
        let spec = json!({
            "Name": name,
            "Labels": labels,
            "Mode": { "Replicated": { "Replicas": replicas } },
        });
        Self {
            id: id.to_string(),
            name: name.to_string(),
            labels,
            replicas: Some(replicas),
            update_status: None,
            version: 1,
            spec,
        }
    }

    /// Whether the last rollout has finished (or never happened).
    pub fn rollout_completed(&self) -> bool {
        match &self.update_status {
            None => true,
            Some(status) => status.state == UpdateState::Completed,
        }
    }

    /// Copy of the spec with the replica count replaced.
    pub fn spec_with_replicas(&self, replicas: u64) -> OrchestratorResult<Value> {
        let mut spec = self.spec.clone();
        let replicated = spec
            .pointer_mut("/Mode/Replicated")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| OrchestratorError::NotReplicated(self.id.clone()))?;
        replicated.insert("Replicas".to_string(), Value::from(replicas));
        Ok(spec)
    }
}

/// Response of a service update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub warnings: Vec<String>,
}

// ── Tasks ──────────────────────────────────────────────────────────

/// A single task (container slot) of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: String,
    pub service_id: ServiceId,
    /// Observed task state, e.g. "running".
    pub state: String,
}

// ── Events ─────────────────────────────────────────────────────────

/// Lifecycle action carried by a service event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    Create,
    Update,
    Remove,
    Other(String),
}

impl EventAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "create" => EventAction::Create,
            "update" => EventAction::Update,
            "remove" => EventAction::Remove,
            other => EventAction::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Create => f.write_str("create"),
            EventAction::Update => f.write_str("update"),
            EventAction::Remove => f.write_str("remove"),
            EventAction::Other(s) => f.write_str(s),
        }
    }
}

/// A service lifecycle event from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub action: EventAction,
    /// ID of the service the event is about.
    pub actor_id: ServiceId,
    pub attributes: HashMap<String, String>,
}

impl ServiceEvent {
    /// The service name, when the orchestrator included it.
    pub fn service_name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }
}
