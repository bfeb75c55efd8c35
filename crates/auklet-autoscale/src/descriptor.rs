//! Service descriptor — turns service labels into a validated config.
//!
//! Services opt in with `auklet.autoscale=true` and describe their
//! scaling policy in further `auklet.*` labels. Loading is pure: the
//! same labels always produce the same result.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use auklet_swarm::ServiceRecord;

use crate::duration::parse_duration;

/// Label keys read from a service.
pub mod keys {
    pub const AUTOSCALE: &str = "auklet.autoscale";
    pub const POLLING_INTERVAL: &str = "auklet.polling_interval";
    pub const SCALE_MIN: &str = "auklet.scale_min";
    pub const SCALE_MAX: &str = "auklet.scale_max";
    pub const UP_STEP: &str = "auklet.up_step";
    pub const DOWN_STEP: &str = "auklet.down_step";
    pub const QUERY: &str = "auklet.query";
    pub const UP_THRESHOLD: &str = "auklet.up_threshold";
    pub const DOWN_THRESHOLD: &str = "auklet.down_threshold";
    pub const UP_GRACE_PERIOD: &str = "auklet.up_graceperiod";
    pub const DOWN_GRACE_PERIOD: &str = "auklet.down_graceperiod";
}

/// Poll interval used when `auklet.polling_interval` is not set.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Why a service's labels could not be turned into a config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {label}: {value:?} ({reason})")]
    Invalid {
        label: &'static str,
        value: String,
        reason: String,
    },

    #[error("{label} must be at least 1")]
    ZeroStep { label: &'static str },

    #[error("auklet.scale_min ({min}) is greater than auklet.scale_max ({max})")]
    Bounds { min: u64, max: u64 },
}

/// Immutable scaling policy of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub service_id: String,
    pub service_name: String,
    pub poll_interval: Duration,
    pub min_replicas: u64,
    pub max_replicas: u64,
    pub up_step: u64,
    pub down_step: u64,
    /// PromQL expression evaluated every poll.
    pub query: String,
    pub up_threshold: f64,
    pub down_threshold: f64,
    /// Zero means act on the first breach.
    pub up_grace_period: Duration,
    pub down_grace_period: Duration,
}

impl ServiceConfig {
    /// Load the config of an orchestrator service.
    pub fn from_service(service: &ServiceRecord) -> Result<Self, DescriptorError> {
        Self::from_labels(&service.id, &service.name, &service.labels)
    }

    /// Load a config from a label map.
    ///
    /// Required labels fail closed. Malformed grace periods degrade to
    /// zero instead of failing.
    pub fn from_labels(
        service_id: &str,
        service_name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<Self, DescriptorError> {
        let poll_interval = match labels.get(keys::POLLING_INTERVAL) {
            None => DEFAULT_POLL_INTERVAL,
            Some(v) => match parse_duration(v) {
                Some(d) if !d.is_zero() => d,
                Some(_) => return Err(invalid(keys::POLLING_INTERVAL, v, "must be positive")),
                None => return Err(invalid(keys::POLLING_INTERVAL, v, "not a duration")),
            },
        };

        let min_replicas = int_label(labels, keys::SCALE_MIN, None)?;
        let max_replicas = int_label(labels, keys::SCALE_MAX, None)?;
        if min_replicas > max_replicas {
            return Err(DescriptorError::Bounds {
                min: min_replicas,
                max: max_replicas,
            });
        }

        let up_step = step_label(labels, keys::UP_STEP)?;
        let down_step = step_label(labels, keys::DOWN_STEP)?;

        let up_threshold = float_label(labels, keys::UP_THRESHOLD)?;
        let down_threshold = float_label(labels, keys::DOWN_THRESHOLD)?;

        let up_grace_period = grace_label(labels, keys::UP_GRACE_PERIOD);
        let down_grace_period = grace_label(labels, keys::DOWN_GRACE_PERIOD);

        let query = match labels.get(keys::QUERY) {
            None => return Err(DescriptorError::Missing(keys::QUERY)),
            Some(q) if q.trim().is_empty() => {
                return Err(invalid(keys::QUERY, q, "must not be empty"));
            }
            Some(q) => q.clone(),
        };

        let config = Self {
            service_id: service_id.to_string(),
            service_name: service_name.to_string(),
            poll_interval,
            min_replicas,
            max_replicas,
            up_step,
            down_step,
            query,
            up_threshold,
            down_threshold,
            up_grace_period,
            down_grace_period,
        };

        debug!(
            %service_id,
            poll_interval = ?config.poll_interval,
            min_replicas,
            max_replicas,
            up_step,
            down_step,
            query = %config.query,
            up_threshold,
            down_threshold,
            up_grace_period = ?config.up_grace_period,
            down_grace_period = ?config.down_grace_period,
            "loaded autoscale configuration"
        );

        Ok(config)
    }
}

/// Whether the labels opt the service into autoscaling.
pub fn autoscale_enabled(labels: &HashMap<String, String>) -> bool {
    labels
        .get(keys::AUTOSCALE)
        .and_then(|v| parse_bool(v))
        .unwrap_or(false)
}

/// Accepted boolean spellings.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn invalid(label: &'static str, value: &str, reason: &str) -> DescriptorError {
    DescriptorError::Invalid {
        label,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn int_label(
    labels: &HashMap<String, String>,
    label: &'static str,
    default: Option<u64>,
) -> Result<u64, DescriptorError> {
    match labels.get(label) {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(label, v, &e.to_string())),
        None => default.ok_or(DescriptorError::Missing(label)),
    }
}

fn step_label(
    labels: &HashMap<String, String>,
    label: &'static str,
) -> Result<u64, DescriptorError> {
    match int_label(labels, label, Some(1))? {
        0 => Err(DescriptorError::ZeroStep { label }),
        step => Ok(step),
    }
}

fn float_label(
    labels: &HashMap<String, String>,
    label: &'static str,
) -> Result<f64, DescriptorError> {
    let v = labels.get(label).ok_or(DescriptorError::Missing(label))?;
    v.trim()
        .parse::<f64>()
        .map_err(|e| invalid(label, v, &e.to_string()))
}

fn grace_label(labels: &HashMap<String, String>, label: &'static str) -> Duration {
    labels
        .get(label)
        .and_then(|v| parse_duration(v))
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_labels() -> HashMap<String, String> {
        [
            (keys::AUTOSCALE, "true"),
            (keys::SCALE_MIN, "2"),
            (keys::SCALE_MAX, "10"),
            (keys::QUERY, "avg(cpu_usage{service=\"web\"})"),
            (keys::UP_THRESHOLD, "80"),
            (keys::DOWN_THRESHOLD, "20.5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn with(mut labels: HashMap<String, String>, key: &str, value: &str) -> HashMap<String, String> {
        labels.insert(key.to_string(), value.to_string());
        labels
    }

    fn without(mut labels: HashMap<String, String>, key: &str) -> HashMap<String, String> {
        labels.remove(key);
        labels
    }

    #[test]
    fn defaults_applied() {
        let config = ServiceConfig::from_labels("s1", "web", &base_labels()).unwrap();
        assert_eq!(config.service_id, "s1");
        assert_eq!(config.service_name, "web");
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.min_replicas, 2);
        assert_eq!(config.max_replicas, 10);
        assert_eq!(config.up_step, 1);
        assert_eq!(config.down_step, 1);
        assert_eq!(config.up_threshold, 80.0);
        assert_eq!(config.down_threshold, 20.5);
        assert_eq!(config.up_grace_period, Duration::ZERO);
        assert_eq!(config.down_grace_period, Duration::ZERO);
    }

    #[test]
    fn all_labels_set() {
        let mut labels = base_labels();
        for (k, v) in [
            (keys::POLLING_INTERVAL, "15s"),
            (keys::UP_STEP, "2"),
            (keys::DOWN_STEP, "3"),
            (keys::UP_GRACE_PERIOD, "1m"),
            (keys::DOWN_GRACE_PERIOD, "5m30s"),
        ] {
            labels.insert(k.to_string(), v.to_string());
        }

        let config = ServiceConfig::from_labels("s1", "web", &labels).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.up_step, 2);
        assert_eq!(config.down_step, 3);
        assert_eq!(config.up_grace_period, Duration::from_secs(60));
        assert_eq!(config.down_grace_period, Duration::from_secs(330));
    }

    #[test]
    fn required_labels_fail_closed() {
        for label in [
            keys::SCALE_MIN,
            keys::SCALE_MAX,
            keys::QUERY,
            keys::UP_THRESHOLD,
            keys::DOWN_THRESHOLD,
        ] {
            let err = ServiceConfig::from_labels("s1", "web", &without(base_labels(), label))
                .unwrap_err();
            assert_eq!(err, DescriptorError::Missing(label), "label {label}");
        }
    }

    #[test]
    fn malformed_required_values_rejected() {
        let err = ServiceConfig::from_labels("s1", "web", &with(base_labels(), keys::SCALE_MIN, "two"))
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Invalid { label, .. } if label == keys::SCALE_MIN));

        let err = ServiceConfig::from_labels("s1", "web", &with(base_labels(), keys::SCALE_MAX, "-1"))
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Invalid { label, .. } if label == keys::SCALE_MAX));

        let err = ServiceConfig::from_labels("s1", "web", &with(base_labels(), keys::UP_THRESHOLD, "high"))
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Invalid { label, .. } if label == keys::UP_THRESHOLD));

        let err = ServiceConfig::from_labels("s1", "web", &with(base_labels(), keys::QUERY, "  "))
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Invalid { label, .. } if label == keys::QUERY));
    }

    #[test]
    fn malformed_grace_period_is_zero() {
        let labels = with(base_labels(), keys::UP_GRACE_PERIOD, "a while");
        let labels = with(labels, keys::DOWN_GRACE_PERIOD, "60");
        let config = ServiceConfig::from_labels("s1", "web", &labels).unwrap();
        assert_eq!(config.up_grace_period, Duration::ZERO);
        assert_eq!(config.down_grace_period, Duration::ZERO);
    }

    #[test]
    fn bad_polling_interval_rejected() {
        let err = ServiceConfig::from_labels("s1", "web", &with(base_labels(), keys::POLLING_INTERVAL, "often"))
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Invalid { label, .. } if label == keys::POLLING_INTERVAL));

        let err = ServiceConfig::from_labels("s1", "web", &with(base_labels(), keys::POLLING_INTERVAL, "0s"))
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Invalid { label, .. } if label == keys::POLLING_INTERVAL));
    }

    #[test]
    fn zero_step_rejected() {
        let err = ServiceConfig::from_labels("s1", "web", &with(base_labels(), keys::DOWN_STEP, "0"))
            .unwrap_err();
        assert_eq!(err, DescriptorError::ZeroStep { label: keys::DOWN_STEP });
    }

    #[test]
    fn inverted_bounds_rejected() {
        let labels = with(base_labels(), keys::SCALE_MIN, "5");
        let labels = with(labels, keys::SCALE_MAX, "3");
        let err = ServiceConfig::from_labels("s1", "web", &labels).unwrap_err();
        assert_eq!(err, DescriptorError::Bounds { min: 5, max: 3 });
    }

    #[test]
    fn inverted_thresholds_allowed() {
        let labels = with(base_labels(), keys::UP_THRESHOLD, "10");
        let labels = with(labels, keys::DOWN_THRESHOLD, "90");
        let config = ServiceConfig::from_labels("s1", "web", &labels).unwrap();
        assert!(config.down_threshold > config.up_threshold);
    }

    #[test]
    fn opt_in_flag() {
        assert!(autoscale_enabled(&base_labels()));
        assert!(autoscale_enabled(&with(base_labels(), keys::AUTOSCALE, "1")));
        assert!(autoscale_enabled(&with(base_labels(), keys::AUTOSCALE, "True")));
        assert!(!autoscale_enabled(&with(base_labels(), keys::AUTOSCALE, "false")));
        assert!(!autoscale_enabled(&with(base_labels(), keys::AUTOSCALE, "yes")));
        assert!(!autoscale_enabled(&without(base_labels(), keys::AUTOSCALE)));
    }

    #[test]
    fn from_service_uses_record_identity() {
        let record = ServiceRecord::replicated("9mnp", "api", base_labels(), 3);
        let config = ServiceConfig::from_service(&record).unwrap();
        assert_eq!(config.service_id, "9mnp");
        assert_eq!(config.service_name, "api");
    }
}
