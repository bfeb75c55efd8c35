//! auklet-swarm — the orchestrator side of Auklet.
//!
//! Defines the [`Orchestrator`] trait the autoscaler depends on and a
//! [`DockerClient`] implementation that talks to the Docker Engine API
//! over its Unix socket.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (trait)
//!   ├── list_services() / get_service()   → ServiceRecord
//!   ├── update_service(id, version, spec) → UpdateResult (warnings)
//!   ├── list_ready_tasks(service_id)      → TaskRecord
//!   └── events(since)                     → EventStream (ServiceEvent)
//!
//! DockerClient
//!   └── hyper http1 over /var/run/docker.sock, one connection per call
//! ```
//!
//! The event stream is a bounded channel fed by a background task that
//! decodes Docker's newline-delimited JSON. It ends with exactly one
//! error item when the underlying HTTP stream fails or closes.

pub mod docker;
pub mod error;
pub mod orchestrator;
pub mod types;

pub use docker::{DockerClient, DockerHost};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{EventStream, Orchestrator};
pub use types::*;
