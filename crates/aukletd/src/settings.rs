//! Daemon settings: command line, environment, and an optional TOML file.
//!
//! Precedence is flag/env over file over built-in default.
//!
//! ```toml
//! prometheus_url = "http://prometheus:9090"
//! listen = 8080
//! docker_host = "unix:///var/run/docker.sock"
//! debug = false
//! json = true
//! no_color = false
//! shutdown_grace = "5s"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use auklet_autoscale::duration::parse_duration;
use auklet_swarm::DockerClient;
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_LISTEN_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Config files tried, in order, when `--config` isn't given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["/etc/auklet/config.toml", "auklet.toml"];

#[derive(Debug, Default, Parser)]
#[command(name = "aukletd", version, about = "Autoscaler for Docker Swarm services")]
pub struct Cli {
    /// TOML config file.
    #[arg(short, long, env = "AUKLET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Prometheus base URL, e.g. http://prometheus:9090.
    #[arg(short, long, env = "AUKLET_PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    /// Port for the /metrics and /healthz endpoints [default: 8080].
    #[arg(short, long, env = "AUKLET_LISTEN")]
    pub listen: Option<u16>,

    /// Docker Engine endpoint, `unix://` or `tcp://` [default: unix:///var/run/docker.sock].
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Log at debug level.
    #[arg(short, long, env = "AUKLET_DEBUG")]
    pub debug: bool,

    /// Log JSON lines.
    #[arg(short, long, env = "AUKLET_JSON")]
    pub json: bool,

    /// Disable ANSI colors in text logs.
    #[arg(long, env = "AUKLET_NO_COLOR")]
    pub no_color: bool,

    /// How long to wait for monitors on shutdown, e.g. "2s" [default: 2s].
    #[arg(long, env = "AUKLET_SHUTDOWN_GRACE", value_parser = parse_grace)]
    pub shutdown_grace: Option<Duration>,
}

fn parse_grace(s: &str) -> Result<Duration, String> {
    parse_duration(s).ok_or_else(|| format!("invalid duration {s:?}"))
}

/// Contents of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub prometheus_url: Option<String>,
    pub listen: Option<u16>,
    pub docker_host: Option<String>,
    pub debug: Option<bool>,
    pub json: Option<bool>,
    pub no_color: Option<bool>,
    pub shutdown_grace: Option<String>,
}

impl FileSettings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("can't read config file {}", path.display()))?;
        let settings: FileSettings = toml::from_str(&content)
            .with_context(|| format!("can't parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Load `explicit` if given, else the first default path that exists.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Option<(PathBuf, Self)>> {
        if let Some(path) = explicit {
            return Ok(Some((path.to_path_buf(), Self::from_file(path)?)));
        }
        for candidate in DEFAULT_CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.is_file() {
                return Ok(Some((path.to_path_buf(), Self::from_file(path)?)));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub debug: bool,
    pub json: bool,
    pub color: bool,
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub prometheus_url: String,
    pub listen: u16,
    pub docker_host: String,
    pub log: LogSettings,
    pub shutdown_grace: Duration,
    /// The config file that was loaded, if any.
    pub config_path: Option<PathBuf>,
}

impl Settings {
    /// Resolve settings from the command line and any config file.
    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        let file = FileSettings::discover(cli.config.as_deref())?;
        Self::merge(cli, file)
    }

    pub fn merge(cli: Cli, file: Option<(PathBuf, FileSettings)>) -> anyhow::Result<Self> {
        let (config_path, file) = match file {
            Some((path, file)) => (Some(path), file),
            None => (None, FileSettings::default()),
        };

        let Some(prometheus_url) = cli.prometheus_url.or(file.prometheus_url) else {
            bail!(
                "no Prometheus URL configured: pass --prometheus-url, set \
                 AUKLET_PROMETHEUS_URL, or set prometheus_url in the config file"
            );
        };

        let shutdown_grace = match (cli.shutdown_grace, file.shutdown_grace) {
            (Some(grace), _) => grace,
            (None, Some(s)) => parse_duration(&s)
                .with_context(|| format!("invalid shutdown_grace {s:?} in config file"))?,
            (None, None) => DEFAULT_SHUTDOWN_GRACE,
        };

        Ok(Self {
            prometheus_url,
            listen: cli.listen.or(file.listen).unwrap_or(DEFAULT_LISTEN_PORT),
            docker_host: cli
                .docker_host
                .or(file.docker_host)
                .unwrap_or_else(|| DockerClient::DEFAULT_HOST.to_string()),
            log: LogSettings {
                debug: cli.debug || file.debug.unwrap_or(false),
                json: cli.json || file.json.unwrap_or(false),
                color: !(cli.no_color || file.no_color.unwrap_or(false)),
            },
            shutdown_grace,
            config_path,
        })
    }
}
