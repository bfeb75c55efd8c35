//! In-memory orchestrator and metric source for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use auklet_prometheus::{MetricSource, QueryError};
use auklet_swarm::{
    EventAction, EventStream, Orchestrator, OrchestratorError, OrchestratorResult, ServiceEvent,
    ServiceRecord, TaskRecord, UpdateResult,
};
use serde_json::Value;
use tokio::sync::mpsc;

pub fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Default)]
struct FakeState {
    services: HashMap<String, ServiceRecord>,
    ready_tasks: HashMap<String, usize>,
    /// (service_id, replicas, version) per accepted update.
    updates: Vec<(String, u64, u64)>,
    warnings: Vec<String>,
    fail_get: bool,
    fail_tasks: bool,
    fail_list: bool,
}

pub struct FakeOrchestrator {
    state: Mutex<FakeState>,
    get_calls: AtomicUsize,
    events_tx: Mutex<Option<mpsc::Sender<Result<ServiceEvent, OrchestratorError>>>>,
    events_rx: Mutex<Option<EventStream>>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            state: Mutex::new(FakeState::default()),
            get_calls: AtomicUsize::new(0),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
        }
    }

    pub fn add_service(&self, record: ServiceRecord) {
        let mut state = self.state.lock().unwrap();
        state.services.insert(record.id.clone(), record);
    }

    pub fn remove_service(&self, id: &str) {
        self.state.lock().unwrap().services.remove(id);
    }

    pub fn update_record(&self, id: &str, f: impl FnOnce(&mut ServiceRecord)) {
        let mut state = self.state.lock().unwrap();
        f(state.services.get_mut(id).expect("unknown service"));
    }

    pub fn replicas(&self, id: &str) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .services
            .get(id)
            .and_then(|s| s.replicas)
    }

    pub fn set_ready_tasks(&self, id: &str, count: usize) {
        self.state
            .lock()
            .unwrap()
            .ready_tasks
            .insert(id.to_string(), count);
    }

    pub fn set_update_warnings(&self, warnings: Vec<String>) {
        self.state.lock().unwrap().warnings = warnings;
    }

    pub fn fail_get(&self, fail: bool) {
        self.state.lock().unwrap().fail_get = fail;
    }

    pub fn fail_tasks(&self, fail: bool) {
        self.state.lock().unwrap().fail_tasks = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    /// Accepted updates as (service_id, replicas).
    pub fn updates(&self) -> Vec<(String, u64)> {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .map(|(id, r, _)| (id.clone(), *r))
            .collect()
    }

    pub fn update_versions(&self) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .map(|(_, _, v)| *v)
            .collect()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn emit(&self, action: EventAction, id: &str) {
        let event = ServiceEvent {
            action,
            actor_id: id.to_string(),
            attributes: HashMap::new(),
        };
        self.send(Ok(event));
    }

    pub fn fail_stream(&self) {
        self.send(Err(OrchestratorError::Stream("connection reset".to_string())));
    }

    pub fn close_stream(&self) {
        self.events_tx.lock().unwrap().take();
    }

    fn send(&self, item: Result<ServiceEvent, OrchestratorError>) {
        let tx = self.events_tx.lock().unwrap();
        tx.as_ref()
            .expect("event stream closed")
            .try_send(item)
            .expect("event channel full");
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list_services(&self) -> OrchestratorResult<Vec<ServiceRecord>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(OrchestratorError::Connect("refused".to_string()));
        }
        let mut services: Vec<_> = state.services.values().cloned().collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(services)
    }

    async fn get_service(&self, id: &str) -> OrchestratorResult<ServiceRecord> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.fail_get {
            return Err(OrchestratorError::Request("timed out".to_string()));
        }
        state
            .services
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &Value,
    ) -> OrchestratorResult<UpdateResult> {
        let mut state = self.state.lock().unwrap();
        let replicas = spec
            .pointer("/Mode/Replicated/Replicas")
            .and_then(Value::as_u64)
            .ok_or_else(|| OrchestratorError::Api {
                status: 400,
                message: "missing replicas".to_string(),
            })?;
        let service = state
            .services
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;
        service.replicas = Some(replicas);
        service.spec = spec.clone();
        service.version += 1;
        state.updates.push((id.to_string(), replicas, version));
        Ok(UpdateResult {
            warnings: state.warnings.clone(),
        })
    }

    async fn list_ready_tasks(&self, service_id: &str) -> OrchestratorResult<Vec<TaskRecord>> {
        let state = self.state.lock().unwrap();
        if state.fail_tasks {
            return Err(OrchestratorError::Request("timed out".to_string()));
        }
        let count = state.ready_tasks.get(service_id).copied().unwrap_or(0);
        Ok((0..count)
            .map(|i| TaskRecord {
                id: format!("{service_id}.task{i}"),
                service_id: service_id.to_string(),
                state: "running".to_string(),
            })
            .collect())
    }

    async fn events(&self, _since: SystemTime) -> OrchestratorResult<EventStream> {
        self.events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| OrchestratorError::Connect("already subscribed".to_string()))
    }
}

/// Metric source returning a settable value; `None` fails every query.
pub struct FakeSource {
    value: Mutex<Option<f64>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(value: Option<f64>) -> Self {
        Self {
            value: Mutex::new(value),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, value: Option<f64>) {
        *self.value.lock().unwrap() = value;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricSource for FakeSource {
    async fn query(&self, _expr: &str, _at: SystemTime) -> Result<f64, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (*self.value.lock().unwrap()).ok_or(QueryError::SeriesCount(2))
    }
}
