//! auklet-metrics — observability for the autoscaler itself.
//!
//! Tracks how many services are monitored, how many metric queries ran,
//! and how many scale events were issued (globally and per service), and
//! renders them in the Prometheus text exposition format.
//!
//! # Architecture
//!
//! ```text
//! AutoscaleMetrics
//!   ├── set_services_monitored() ← registry insert/remove
//!   ├── record_query()           ← every monitor poll
//!   ├── record_scale()           ← scale executor after an update
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{AutoscaleMetrics, MetricsSnapshot, ScaleDirection, ServiceSnapshot};
pub use prometheus::render_prometheus;
