//! Monitor registry — service ID → running monitor task.
//!
//! The registry is the only state shared between the reconciler and the
//! monitor tasks. All mutation goes through one lock that is never held
//! across an orchestrator or metric call.
//!
//! Every entry carries a generation number. A monitor that fails
//! validation removes its own entry by generation, so a stale task can't
//! evict the replacement started by a later update event.

use std::collections::HashMap;
use std::sync::Arc;

use auklet_metrics::AutoscaleMetrics;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation capability for one running monitor task.
#[derive(Debug)]
pub struct MonitorHandle {
    pub generation: u64,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryInner {
    monitors: HashMap<String, MonitorHandle>,
    next_generation: u64,
}

/// Shared index of running monitors.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
    metrics: Arc<AutoscaleMetrics>,
}

impl Registry {
    pub fn new(metrics: Arc<AutoscaleMetrics>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            metrics,
        }
    }

    /// Register a monitor unless one already exists for `service_id`.
    ///
    /// `start` receives the new entry's generation and must return the
    /// handle of the task it spawned. It is not called when an entry is
    /// already present. Returns whether a monitor was started.
    pub async fn insert_if_absent<F>(&self, service_id: &str, start: F) -> bool
    where
        F: FnOnce(u64) -> MonitorHandle,
    {
        let mut inner = self.inner.lock().await;
        if inner.monitors.contains_key(service_id) {
            debug!(service_id, "monitor already registered");
            return false;
        }

        inner.next_generation += 1;
        let handle = start(inner.next_generation);
        inner.monitors.insert(service_id.to_string(), handle);
        self.metrics.set_services_monitored(inner.monitors.len());
        true
    }

    /// Cancel and deregister the monitor for `service_id`, if any.
    pub async fn remove(&self, service_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.monitors.remove(service_id) {
            Some(handle) => {
                handle.cancel.cancel();
                self.metrics.set_services_monitored(inner.monitors.len());
                true
            }
            None => false,
        }
    }

    /// Deregister `service_id` only if its entry is still `generation`.
    pub async fn remove_generation(&self, service_id: &str, generation: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let current = inner.monitors.get(service_id).map(|h| h.generation);
        if current != Some(generation) {
            return false;
        }
        if let Some(handle) = inner.monitors.remove(service_id) {
            handle.cancel.cancel();
        }
        self.metrics.set_services_monitored(inner.monitors.len());
        true
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, service_id: &str) -> bool {
        self.inner.lock().await.monitors.contains_key(service_id)
    }

    #[cfg(test)]
    pub(crate) async fn generation(&self, service_id: &str) -> Option<u64> {
        self.inner
            .lock()
            .await
            .monitors
            .get(service_id)
            .map(|h| h.generation)
    }

    /// Registered service IDs, sorted.
    #[cfg(test)]
    pub(crate) async fn ids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<String> = inner.monitors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of running monitors.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.monitors.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Take every handle out of the registry, leaving it empty.
    pub async fn drain(&self) -> Vec<MonitorHandle> {
        let mut inner = self.inner.lock().await;
        let handles: Vec<MonitorHandle> = inner.monitors.drain().map(|(_, h)| h).collect();
        self.metrics.set_services_monitored(0);
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(generation: u64) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { token.cancelled().await });
        MonitorHandle {
            generation,
            cancel,
            task,
        }
    }

    fn registry() -> (Registry, Arc<AutoscaleMetrics>) {
        let metrics = Arc::new(AutoscaleMetrics::new());
        (Registry::new(metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn insert_once_per_service() {
        let (reg, metrics) = registry();

        assert!(reg.insert_if_absent("s1", idle).await);
        let mut called = false;
        assert!(
            !reg.insert_if_absent("s1", |g| {
                called = true;
                idle(g)
            })
            .await
        );
        assert!(!called);
        assert_eq!(reg.len().await, 1);
        assert_eq!(metrics.snapshot().await.services_monitored, 1);
    }

    #[tokio::test]
    async fn remove_cancels_the_task() {
        let (reg, metrics) = registry();
        let mut token = None;
        reg.insert_if_absent("s1", |g| {
            let h = idle(g);
            token = Some(h.cancel.clone());
            h
        })
        .await;

        assert!(reg.remove("s1").await);
        assert!(token.unwrap().is_cancelled());
        assert!(!reg.contains("s1").await);
        assert_eq!(metrics.snapshot().await.services_monitored, 0);

        assert!(!reg.remove("s1").await);
    }

    #[tokio::test]
    async fn generations_increase() {
        let (reg, _) = registry();
        reg.insert_if_absent("s1", idle).await;
        let first = reg.generation("s1").await.unwrap();
        reg.remove("s1").await;
        reg.insert_if_absent("s1", idle).await;
        assert!(reg.generation("s1").await.unwrap() > first);
    }

    #[tokio::test]
    async fn stale_generation_does_not_evict() {
        let (reg, _) = registry();
        reg.insert_if_absent("s1", idle).await;
        let stale = reg.generation("s1").await.unwrap();
        reg.remove("s1").await;
        reg.insert_if_absent("s1", idle).await;

        assert!(!reg.remove_generation("s1", stale).await);
        assert!(reg.contains("s1").await);

        let current = reg.generation("s1").await.unwrap();
        assert!(reg.remove_generation("s1", current).await);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn drain_empties() {
        let (reg, metrics) = registry();
        reg.insert_if_absent("b", idle).await;
        reg.insert_if_absent("a", idle).await;
        assert_eq!(reg.ids().await, vec!["a".to_string(), "b".to_string()]);

        let handles = reg.drain().await;
        assert_eq!(handles.len(), 2);
        assert!(reg.is_empty().await);
        assert_eq!(metrics.snapshot().await.services_monitored, 0);

        for h in handles {
            h.cancel.cancel();
            h.task.await.unwrap();
        }
    }
}
