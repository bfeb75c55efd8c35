//! auklet-autoscale — label-driven replica scaling for Swarm services.
//!
//! Services opt in with `auklet.autoscale=true` and describe their
//! scaling policy in labels. Auklet runs one monitor per opted-in
//! service, evaluates the configured query on every poll, and moves the
//! replica count by a fixed step once a threshold has been breached for
//! the configured grace period.
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   ├── events(since=now) → remove / create / update
//!   ├── list_services()   → start_monitor() for opted-in services
//!   └── Registry (service_id → MonitorHandle, one lock)
//!         └── Monitor task (child CancellationToken)
//!               ├── MetricSource::query()
//!               ├── Orchestrator::get_service() → replicas
//!               ├── ServiceController::evaluate() → Decision
//!               └── ScaleExecutor::scale() (skips mid-rollout)
//! ```
//!
//! # Decision Order
//!
//! ```text
//! replicas < min   → scale to min
//! replicas > max   → scale to max
//! metric < down    → after down grace: replicas - down_step (≥ min)
//! metric > up      → after up grace:   replicas + up_step   (≤ max)
//! otherwise        → stable
//! ```

pub mod controller;
pub mod descriptor;
pub mod duration;
pub mod executor;
pub mod monitor;
pub mod reconciler;
pub mod registry;

#[cfg(test)]
mod testing;

pub use controller::{Decision, ScaleReason, ScaleRequest, ServiceController, ServiceState};
pub use descriptor::{autoscale_enabled, DescriptorError, ServiceConfig};
pub use executor::{ScaleError, ScaleExecutor, ScaleOutcome};
pub use monitor::{Monitor, MonitorContext, PollOutcome};
pub use reconciler::{ReconcileError, Reconciler};
pub use registry::{MonitorHandle, Registry};
