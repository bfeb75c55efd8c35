//! aukletd — the Auklet daemon.
//!
//! Wires the Docker client, the Prometheus client, and the reconciler
//! together, and serves `/metrics` and `/healthz`.
//!
//! # Usage
//!
//! ```text
//! aukletd --prometheus-url http://prometheus:9090 --listen 8080
//! ```

pub mod daemon;
pub mod logging;
pub mod server;
pub mod settings;

pub use server::build_router;
pub use settings::{Cli, Settings};
