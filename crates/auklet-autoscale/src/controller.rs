//! Service controller — the per-service scaling state machine.
//!
//! Given one metric sample and the actual replica count, decides whether
//! the service should be scaled. The controller performs no I/O; the
//! monitor forwards a [`Decision::Scale`] to the scale executor.
//!
//! ```text
//! r < min                → Scale(min)            (bypasses thresholds)
//! r > max                → Scale(max)
//! m < down_threshold     → UnderThreshold ─┐ elapsed ≥ down_grace → Scale(r - down_step ≥ min)
//! m > up_threshold       → OverThreshold  ─┘ elapsed ≥ up_grace   → Scale(r + up_step ≤ max)
//! otherwise              → Stable (anchor cleared)
//! ```
//!
//! `Scaling` is entered and left within a single evaluation. It marks the
//! moment a target was computed and is not a guard against overlapping
//! updates; the scale executor owns that check against live rollout
//! status.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::descriptor::ServiceConfig;

/// State of a service between evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stable,
    OverThreshold,
    UnderThreshold,
    Scaling,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stable => "stable",
            ServiceState::OverThreshold => "over_threshold",
            ServiceState::UnderThreshold => "under_threshold",
            ServiceState::Scaling => "scaling",
        };
        f.write_str(s)
    }
}

/// Why a scale target was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleReason {
    BelowMinimum,
    AboveMaximum,
    OverThreshold,
    UnderThreshold,
}

/// A request to move a service to `target` replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleRequest {
    pub current: u64,
    pub target: u64,
    pub reason: ScaleReason,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Metric within bounds.
    Stable,
    /// Threshold breached, grace period still running.
    Waiting {
        state: ServiceState,
        elapsed: Duration,
        grace_period: Duration,
    },
    /// The computed target equals the current count; nothing to do.
    Unchanged { replicas: u64, reason: ScaleReason },
    /// Forward to the scale executor.
    Scale(ScaleRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breach {
    Over,
    Under,
}

/// Runtime state of one monitored service.
#[derive(Debug)]
pub struct ServiceController {
    config: ServiceConfig,
    state: ServiceState,
    /// Last replica count seen from the orchestrator.
    replicas: Option<u64>,
    /// Set when a breach state is entered.
    grace_anchor: Option<Instant>,
}

impl ServiceController {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            state: ServiceState::Stable,
            replicas: None,
            grace_anchor: None,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Replica count from the last evaluation, if any.
    pub fn replicas(&self) -> Option<u64> {
        self.replicas
    }

    pub fn grace_anchor(&self) -> Option<Instant> {
        self.grace_anchor
    }

    /// Evaluate a metric sample against the actual replica count.
    pub fn evaluate(&mut self, metric: f64, replicas: u64, now: Instant) -> Decision {
        self.replicas = Some(replicas);
        let (min, max) = (self.config.min_replicas, self.config.max_replicas);

        if replicas < min {
            return self.scale(replicas, min, ScaleReason::BelowMinimum);
        }
        if replicas > max {
            return self.scale(replicas, max, ScaleReason::AboveMaximum);
        }
        if metric < self.config.down_threshold {
            return self.breach(Breach::Under, replicas, now);
        }
        if metric > self.config.up_threshold {
            return self.breach(Breach::Over, replicas, now);
        }

        self.stable();
        Decision::Stable
    }

    fn breach(&mut self, breach: Breach, replicas: u64, now: Instant) -> Decision {
        let (state, opposite, grace_period) = match breach {
            Breach::Over => (
                ServiceState::OverThreshold,
                ServiceState::UnderThreshold,
                self.config.up_grace_period,
            ),
            Breach::Under => (
                ServiceState::UnderThreshold,
                ServiceState::OverThreshold,
                self.config.down_grace_period,
            ),
        };

        // Only a fresh breach restarts the grace period.
        let anchor = match self.grace_anchor {
            Some(anchor) if self.state != ServiceState::Stable && self.state != opposite => anchor,
            _ => now,
        };
        self.grace_anchor = Some(anchor);
        self.state = state;

        let elapsed = now.saturating_duration_since(anchor);
        if elapsed < grace_period {
            debug!(
                service_id = %self.config.service_id,
                %state,
                ?elapsed,
                ?grace_period,
                "service in grace period"
            );
            return Decision::Waiting {
                state,
                elapsed,
                grace_period,
            };
        }

        match breach {
            Breach::Over => {
                let target = replicas
                    .saturating_add(self.config.up_step)
                    .min(self.config.max_replicas);
                self.scale(replicas, target, ScaleReason::OverThreshold)
            }
            Breach::Under => {
                let target = replicas
                    .saturating_sub(self.config.down_step)
                    .max(self.config.min_replicas);
                self.scale(replicas, target, ScaleReason::UnderThreshold)
            }
        }
    }

    fn scale(&mut self, current: u64, target: u64, reason: ScaleReason) -> Decision {
        self.state = ServiceState::Scaling;
        debug!(
            service_id = %self.config.service_id,
            current,
            target,
            ?reason,
            "service scaling"
        );

        let decision = if target != current {
            Decision::Scale(ScaleRequest {
                current,
                target,
                reason,
            })
        } else {
            Decision::Unchanged {
                replicas: current,
                reason,
            }
        };

        self.stable();
        decision
    }

    fn stable(&mut self) {
        self.state = ServiceState::Stable;
        self.grace_anchor = None;
    }
}
