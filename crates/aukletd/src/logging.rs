//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::settings::LogSettings;

/// Crates whose events `--debug` lowers to debug level.
const AUKLET_CRATES: &[&str] = &[
    "aukletd",
    "auklet_swarm",
    "auklet_prometheus",
    "auklet_metrics",
    "auklet_autoscale",
];

/// Filter used when `RUST_LOG` is unset.
fn default_directives(debug: bool) -> String {
    let mut directives = String::from("info");
    if debug {
        for krate in AUKLET_CRATES {
            directives.push_str(&format!(",{krate}=debug"));
        }
    }
    directives
}

/// Install the global subscriber. `RUST_LOG` overrides the level flags.
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(settings.debug)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.json {
        builder.json().init();
    } else {
        builder.with_ansi(settings.color).init();
    }
}
