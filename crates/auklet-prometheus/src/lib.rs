//! auklet-prometheus — the metric source behind Auklet's scaling decisions.
//!
//! A monitored service carries a PromQL expression in its labels. Each
//! poll evaluates that expression as an instant query and expects a
//! single number back.
//!
//! # Accepted results
//!
//! ```text
//! resultType = "vector", 1 series  → that series' value
//! resultType = "scalar"            → the scalar value
//! anything else (0 or >1 series, matrix, string) → QueryError
//! ```

pub mod client;
pub mod error;

pub use client::{parse_query_response, MetricSource, PrometheusClient};
pub use error::QueryError;
