//! Metrics collector — counters and gauges updated by the autoscaler.
//!
//! Global values are plain atomics. Per-service scale counters live in a
//! map behind an async `RwLock`; the counters themselves are atomics so
//! recording only needs a read lock once a service is registered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

/// Direction of a scale event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    /// Direction implied by moving from `current` to `target` replicas.
    pub fn between(current: u64, target: u64) -> Self {
        if target > current {
            ScaleDirection::Up
        } else {
            ScaleDirection::Down
        }
    }
}

/// Per-service scale counters.
struct ServiceCounters {
    name: String,
    scale_up: AtomicU64,
    scale_down: AtomicU64,
}

impl ServiceCounters {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scale_up: AtomicU64::new(0),
            scale_down: AtomicU64::new(0),
        }
    }
}

/// Point-in-time copy of all autoscaler metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub services_monitored: u64,
    pub queries_total: u64,
    pub query_errors_total: u64,
    pub scale_events_total: u64,
    /// Sorted by service ID.
    pub services: Vec<ServiceSnapshot>,
}

/// Scale counters for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub service_id: String,
    pub service_name: String,
    pub scale_up_events: u64,
    pub scale_down_events: u64,
}

/// Autoscaler metrics shared between the registry, monitors, the scale
/// executor, and the HTTP endpoint.
#[derive(Default)]
pub struct AutoscaleMetrics {
    services_monitored: AtomicU64,
    queries_total: AtomicU64,
    query_errors_total: AtomicU64,
    scale_events_total: AtomicU64,
    /// service_id → counters.
    services: RwLock<HashMap<String, ServiceCounters>>,
}

impl AutoscaleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of currently monitored services.
    pub fn set_services_monitored(&self, count: usize) {
        self.services_monitored
            .store(count as u64, Ordering::Relaxed);
    }

    /// Count one metric query; `ok` is false when it failed.
    pub fn record_query(&self, ok: bool) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.query_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Create the per-service counters if they don't exist yet.
    ///
    /// Counters survive monitor restarts so they stay monotonic.
    pub async fn register_service(&self, service_id: &str, service_name: &str) {
        let mut services = self.services.write().await;
        services
            .entry(service_id.to_string())
            .or_insert_with(|| ServiceCounters::new(service_name));
        debug!(%service_id, %service_name, "registered service metrics");
    }

    /// Count a scale event for a service.
    pub async fn record_scale(&self, service_id: &str, direction: ScaleDirection) {
        self.scale_events_total.fetch_add(1, Ordering::Relaxed);

        {
            let services = self.services.read().await;
            if let Some(counters) = services.get(service_id) {
                bump(counters, direction);
                return;
            }
        }

        // Unregistered service: create counters on the fly.
        let mut services = self.services.write().await;
        let counters = services
            .entry(service_id.to_string())
            .or_insert_with(|| ServiceCounters::new(service_id));
        bump(counters, direction);
    }

    /// Copy the current values.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let services = self.services.read().await;
        let mut per_service: Vec<ServiceSnapshot> = services
            .iter()
            .map(|(id, c)| ServiceSnapshot {
                service_id: id.clone(),
                service_name: c.name.clone(),
                scale_up_events: c.scale_up.load(Ordering::Relaxed),
                scale_down_events: c.scale_down.load(Ordering::Relaxed),
            })
            .collect();
        per_service.sort_by(|a, b| a.service_id.cmp(&b.service_id));

        MetricsSnapshot {
            services_monitored: self.services_monitored.load(Ordering::Relaxed),
            queries_total: self.queries_total.load(Ordering::Relaxed),
            query_errors_total: self.query_errors_total.load(Ordering::Relaxed),
            scale_events_total: self.scale_events_total.load(Ordering::Relaxed),
            services: per_service,
        }
    }
}

fn bump(counters: &ServiceCounters, direction: ScaleDirection) {
    match direction {
        ScaleDirection::Up => counters.scale_up.fetch_add(1, Ordering::Relaxed),
        ScaleDirection::Down => counters.scale_down.fetch_add(1, Ordering::Relaxed),
    };
}
