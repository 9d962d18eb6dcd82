use std::{env, fmt, fs, io, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::validation;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("Failed to write config file: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control_plane: ControlPlane,
    pub dispatch: Dispatch,
    pub schedule: Schedule,
    pub timeouts: Timeouts,
    pub http: HttpChecks,
    pub reporting: Reporting,
    pub status_server: StatusServer,
}

/// Where monitors come from and results go to, plus how this probe
/// identifies itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlane {
    pub server_url: String,
    pub probe_name: String,
    pub probe_key: String,
    pub cluster_key: String,
    pub request_timeout_ms: u64,
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3002/api".into(),
            probe_name: "probe-1".into(),
            probe_key: String::new(),
            cluster_key: String::new(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Dispatch {
    /// Batch size cap (`RESOURCES_LIMIT`); unset means no limit is sent
    pub resources_limit: Option<u32>,
    /// Monitors checked at the same time; 1 keeps fetch order
    pub concurrency: usize,
    pub idle_backoff_secs: u64,
    /// Wall-clock budget for one monitor, retries included
    pub monitor_budget_secs: u64,
    /// Extra attempts for a monitor whose check came back down
    pub check_retries: u32,
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            resources_limit: None,
            concurrency: 1,
            idle_backoff_secs: 30,
            monitor_budget_secs: 120,
            check_retries: 0,
        }
    }
}

impl Dispatch {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    pub fn monitor_budget(&self) -> Duration {
        Duration::from_secs(self.monitor_budget_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub cadence_minutes: u64,
    pub max_jitter_secs: u64,
    pub run_on_start: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self { cadence_minutes: 30, max_jitter_secs: 50, run_on_start: true }
    }
}

/// Per-checker bounds, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub http_ms: u64,
    pub ip_ms: u64,
    pub server_ms: u64,
    pub kubernetes_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { http_ms: 30_000, ip_ms: 10_000, server_ms: 30_000, kubernetes_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpChecks {
    pub degraded_threshold_ms: u64,
    pub body_excerpt_bytes: usize,
    pub user_agent: String,
}

impl Default for HttpChecks {
    fn default() -> Self {
        Self {
            degraded_threshold_ms: 5_000,
            body_excerpt_bytes: 1024,
            user_agent: format!("uppe-probe/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Reporting {
    /// Total tries per result, the first one included
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Reporting {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 250, max_backoff_ms: 5_000 }
    }
}

impl Reporting {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Never below the initial backoff
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusServer {
    pub bind: String,
    pub port: u16,
}

impl Default for StatusServer {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 3008 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/probe.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home_dir) = env::var("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uppe/probe.toml"))
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "********" }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let limit = self
            .dispatch
            .resources_limit
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "unbounded".into());

        writeln!(f, "Current Probe Configuration:")?;
        write_title_1(f, "Control Plane")?;
        write_1(f, "Server URL", &self.control_plane.server_url)?;
        write_1(f, "Probe Name", &self.control_plane.probe_name)?;
        write_1(f, "Probe Key", &mask(&self.control_plane.probe_key))?;
        write_1(f, "Cluster Key", &mask(&self.control_plane.cluster_key))?;
        write_title_1(f, "Dispatch")?;
        write_1(f, "Resources Limit", &limit)?;
        write_1(f, "Concurrency", &self.dispatch.concurrency)?;
        write_1(f, "Monitor Budget (s)", &self.dispatch.monitor_budget_secs)?;
        write_1(f, "Check Retries", &self.dispatch.check_retries)?;
        write_title_1(f, "Schedule")?;
        write_1(f, "Cadence (min)", &self.schedule.cadence_minutes)?;
        write_1(f, "Max Jitter (s)", &self.schedule.max_jitter_secs)?;
        write_title_1(f, "Timeouts (ms)")?;
        write_1(f, "HTTP", &self.timeouts.http_ms)?;
        write_1(f, "IP", &self.timeouts.ip_ms)?;
        write_1(f, "Server", &self.timeouts.server_ms)?;
        write_1(f, "Kubernetes", &self.timeouts.kubernetes_ms)?;
        write_title_1(f, "Status Server")?;
        write_1(f, "Bind Address", &self.status_server.bind)?;
        write_1(f, "Port", &self.status_server.port)?;

        Ok(())
    }
}

impl Config {
    /// Load, override from the environment, and validate.
    pub fn load(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let mut config = Self::from_config(optional_path)?;
        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/probe.toml
    ///  or the specified path if one does not exist. A read-only home is
    /// not fatal: the defaults are used and a warning is logged.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            if let Err(e) = config.write_config(&config_path) {
                tracing::warn!(
                    "Using default config, could not write {}: {}",
                    config_path.display(),
                    e
                );
            }
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Apply the deployment environment on top of the file.
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SERVER_URL") {
            self.control_plane.server_url = url;
        }
        if let Some(name) = lookup("PROBE_NAME") {
            self.control_plane.probe_name = name;
        }
        if let Some(key) = lookup("PROBE_KEY") {
            self.control_plane.probe_key = key;
        }
        if let Some(key) = lookup("CLUSTER_KEY") {
            self.control_plane.cluster_key = key;
        }
        if let Some(limit) = lookup("RESOURCES_LIMIT") {
            let limit = limit
                .trim()
                .parse::<u32>()
                .map_err(|_| {
                    Error::Invalid(format!("RESOURCES_LIMIT is not an integer: {limit}"))
                })?;
            self.dispatch.resources_limit = Some(limit);
        }
        if let Some(port) = lookup("PORT") {
            self.status_server.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Invalid(format!("PORT is not a valid port: {port}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |e: anyhow::Error| Error::Invalid(e.to_string());

        validation::validate_control_plane_url(&self.control_plane.server_url).map_err(invalid)?;
        validation::validate_timeout_ms(self.control_plane.request_timeout_ms).map_err(invalid)?;
        validation::validate_timeout_ms(self.timeouts.http_ms).map_err(invalid)?;
        validation::validate_timeout_ms(self.timeouts.ip_ms).map_err(invalid)?;
        validation::validate_timeout_ms(self.timeouts.server_ms).map_err(invalid)?;
        validation::validate_timeout_ms(self.timeouts.kubernetes_ms).map_err(invalid)?;
        validation::validate_cadence(self.schedule.cadence_minutes, self.schedule.max_jitter_secs)
            .map_err(invalid)?;

        if self.dispatch.concurrency == 0 {
            return Err(Error::Invalid("dispatch.concurrency must be at least 1".into()));
        }
        if self.dispatch.monitor_budget_secs == 0 {
            return Err(Error::Invalid("dispatch.monitor_budget_secs must be at least 1".into()));
        }
        if self.dispatch.resources_limit == Some(0) {
            return Err(Error::Invalid("dispatch.resources_limit must be at least 1".into()));
        }
        if self.reporting.max_attempts == 0 {
            return Err(Error::Invalid("reporting.max_attempts must be at least 1".into()));
        }

        Ok(())
    }
}
