//! Agentless server checks.
//!
//! The probe logs into the server over its configured transport, runs a
//! short read-only script and turns the output into a metric snapshot.
//! Servers with an installed agent report on their own and are skipped.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::CheckError;
use crate::models::monitor::Monitor;
use crate::monitoring::checker::Checker;
use crate::monitoring::types::{FailureReason, Observation, ResourceSnapshot, ServerMetrics};
use crate::monitoring::validation::{validate_host, validate_port};

/// Read-only script run on the remote host. Each line is tagged so the
/// parser does not depend on tool-specific formatting beyond its field.
pub const METRICS_SCRIPT: &str = "echo \"nproc $(nproc)\"; \
echo \"loadavg $(cat /proc/loadavg)\"; \
grep -E '^(MemTotal|MemAvailable):' /proc/meminfo; \
echo \"disk $(df -Pk / | awk 'NR==2 {print $2, $3}')\"";

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Authentication {
    #[default]
    IdentityFile,
    Password,
}

/// How to reach an agentless server
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentlessConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub authentication: Authentication,
    pub identity_file: Option<String>,
    pub password: Option<String>,
}

impl AgentlessConfig {
    fn validate(&self) -> Result<(), CheckError> {
        let invalid = |e: anyhow::Error| CheckError::InvalidConfig(e.to_string());
        validate_host(&self.host).map_err(invalid)?;
        validate_port(self.port).map_err(invalid)?;

        // Anything starting with '-' would be read as an ssh option
        if self.host.starts_with('-') || self.username.starts_with('-') {
            return Err(CheckError::InvalidConfig(
                "host and username must not start with '-'".into(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(CheckError::InvalidConfig("username must not be empty".into()));
        }
        if self.authentication == Authentication::Password {
            return Err(CheckError::InvalidConfig(
                "password authentication is not supported, configure an identity file".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Thresholds {
    cpu_percent: Option<f64>,
    memory_percent: Option<f64>,
    disk_percent: Option<f64>,
}

impl Thresholds {
    fn first_exceeded(&self, metrics: &ServerMetrics) -> Option<String> {
        let checks = [
            ("cpu", self.cpu_percent, metrics.cpu_load_percent),
            ("memory", self.memory_percent, metrics.memory_used_percent),
            ("disk", self.disk_percent, metrics.disk_used_percent),
        ];
        checks.into_iter().find_map(|(name, limit, value)| {
            limit
                .filter(|limit| value > *limit)
                .map(|limit| format!("{} usage {:.1}% above {:.1}%", name, value, limit))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerSettings {
    agentless_config: AgentlessConfig,
    #[serde(default)]
    thresholds: Thresholds,
}

/// Transport used to run the metrics script on a server
#[async_trait::async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `script` on the server and return its stdout
    async fn run(
        &self,
        target: &AgentlessConfig,
        script: &str,
        bound: Duration,
    ) -> Result<String, CheckError>;
}

/// Runs the system OpenSSH client in batch mode
#[derive(Debug, Default)]
pub struct OpenSsh;

#[async_trait::async_trait]
impl RemoteShell for OpenSsh {
    async fn run(
        &self,
        target: &AgentlessConfig,
        script: &str,
        bound: Duration,
    ) -> Result<String, CheckError> {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", bound.as_secs().max(1)))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-p")
            .arg(target.port.to_string());
        if let Some(identity) = &target.identity_file {
            command.arg("-i").arg(identity);
        }
        command
            .arg("--")
            .arg(format!("{}@{}", target.username, target.host))
            .arg(script)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(bound, command.output())
            .await
            .map_err(|_| CheckError::Timeout(bound.as_millis() as u64))?
            .map_err(|e| CheckError::Internal(format!("could not start ssh: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CheckError::Unreachable(format!(
                "ssh to {}:{} exited with {}: {}",
                target.host,
                target.port,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent(used: f64, total: f64) -> f64 {
    if total > 0.0 { round2(used / total * 100.0) } else { 0.0 }
}

/// Parse the tagged output of [`METRICS_SCRIPT`]
pub fn parse_metrics(output: &str) -> Result<ServerMetrics, CheckError> {
    let mut cores: Option<f64> = None;
    let mut load: Option<f64> = None;
    let mut mem_total_kb: Option<u64> = None;
    let mut mem_available_kb: Option<u64> = None;
    let mut disk: Option<(u64, u64)> = None;

    for line in output.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("nproc") => cores = fields.next().and_then(|v| v.parse().ok()),
            Some("loadavg") => load = fields.next().and_then(|v| v.parse().ok()),
            Some("MemTotal:") => mem_total_kb = fields.next().and_then(|v| v.parse().ok()),
            Some("MemAvailable:") => mem_available_kb = fields.next().and_then(|v| v.parse().ok()),
            Some("disk") => {
                let total = fields.next().and_then(|v| v.parse().ok());
                let used = fields.next().and_then(|v| v.parse().ok());
                disk = total.zip(used);
            }
            _ => {}
        }
    }

    let missing = |what: &str| CheckError::Internal(format!("server output missing {}", what));
    let cores = cores.filter(|c| *c > 0.0).ok_or_else(|| missing("cpu count"))?;
    let load = load.ok_or_else(|| missing("load average"))?;
    let mem_total_kb = mem_total_kb.ok_or_else(|| missing("MemTotal"))?;
    let mem_available_kb = mem_available_kb.ok_or_else(|| missing("MemAvailable"))?;
    let (disk_total_kb, disk_used_kb) = disk.ok_or_else(|| missing("disk usage"))?;

    let bytes = |kb: u64, what: &str| {
        kb.checked_mul(1024)
            .ok_or_else(|| CheckError::Internal(format!("{} of {} kB is out of range", what, kb)))
    };

    Ok(ServerMetrics {
        cpu_load_percent: round2(load / cores * 100.0),
        memory_used_percent: percent(
            mem_total_kb.saturating_sub(mem_available_kb) as f64,
            mem_total_kb as f64,
        ),
        disk_used_percent: percent(disk_used_kb as f64, disk_total_kb as f64),
        memory_total_bytes: bytes(mem_total_kb, "MemTotal")?,
        disk_total_bytes: bytes(disk_total_kb, "disk size")?,
    })
}

/// Checker for `server-monitor` monitors with agentless configuration
pub struct ServerChecker {
    shell: Arc<dyn RemoteShell>,
    timeout_ms: u64,
}

impl ServerChecker {
    pub fn openssh(timeout_ms: u64) -> Self {
        Self::with_shell(Arc::new(OpenSsh), timeout_ms)
    }

    pub fn with_shell(shell: Arc<dyn RemoteShell>, timeout_ms: u64) -> Self {
        Self { shell, timeout_ms }
    }
}

#[async_trait::async_trait]
impl Checker for ServerChecker {
    fn applies_to(&self, monitor: &Monitor) -> bool {
        monitor.settings.get("agentlessConfig").is_some_and(|config| !config.is_null())
    }

    async fn check(&self, monitor: &Monitor) -> Result<Observation, CheckError> {
        let settings: ServerSettings = monitor.settings()?;
        settings.agentless_config.validate()?;

        debug!(
            "Agentless check for monitor {} on {}:{}",
            monitor.id, settings.agentless_config.host, settings.agentless_config.port
        );

        let start = Instant::now();
        let output = self
            .shell
            .run(&settings.agentless_config, METRICS_SCRIPT, Duration::from_millis(self.timeout_ms))
            .await?;
        let latency = start.elapsed().as_millis() as u64;

        let metrics = parse_metrics(&output)?;
        let observation = match settings.thresholds.first_exceeded(&metrics) {
            Some(message) => Observation::down(FailureReason::CriteriaNotMet, message),
            None => Observation::up(),
        };

        Ok(observation.with_latency(latency).with_resources(ResourceSnapshot::Server(metrics)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::models::monitor::MonitorKind;
    use crate::monitoring::types::MonitorStatus;

    const SAMPLE_OUTPUT: &str = "nproc 4\n\
loadavg 2.00 1.50 1.00 2/345 6789\n\
MemTotal:       16000000 kB\n\
MemAvailable:    4000000 kB\n\
disk 100000000 25000000\n";

    /// Returns canned output and records what it was asked to run
    struct CannedShell {
        output: Result<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl CannedShell {
        fn ok(output: &str) -> Arc<Self> {
            Arc::new(Self { output: Ok(output.to_string()), calls: Mutex::new(Vec::new()) })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self { output: Err(message.to_string()), calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait::async_trait]
    impl RemoteShell for CannedShell {
        async fn run(
            &self,
            target: &AgentlessConfig,
            _script: &str,
            _bound: Duration,
        ) -> Result<String, CheckError> {
            self.calls.lock().unwrap().push(format!("{}@{}", target.username, target.host));
            self.output.clone().map_err(CheckError::Unreachable)
        }
    }

    fn server_monitor(thresholds: serde_json::Value) -> Monitor {
        Monitor::new("srv", MonitorKind::Server)
            .with_setting(
                "agentlessConfig",
                json!({"host": "10.0.0.5", "username": "monitor", "identityFile": "/keys/id"}),
            )
            .with_setting("thresholds", thresholds)
    }

    #[test]
    fn test_parse_metrics() {
        let metrics = parse_metrics(SAMPLE_OUTPUT).unwrap();
        assert_eq!(metrics.cpu_load_percent, 50.0);
        assert_eq!(metrics.memory_used_percent, 75.0);
        assert_eq!(metrics.disk_used_percent, 25.0);
        assert_eq!(metrics.memory_total_bytes, 16_000_000 * 1024);
    }

    #[test]
    fn test_parse_metrics_missing_line() {
        let result = parse_metrics("nproc 4\nloadavg 1 1 1 1/1 1\n");
        assert!(matches!(result, Err(CheckError::Internal(_))));
    }

    #[test]
    fn test_parse_metrics_rejects_oversized_totals() {
        let output = SAMPLE_OUTPUT.replace("16000000 kB", "18446744073709551615 kB");
        assert_ne!(output, SAMPLE_OUTPUT);

        let result = parse_metrics(&output);
        assert!(matches!(result, Err(CheckError::Internal(ref m)) if m.contains("MemTotal")));
    }

    #[test]
    fn test_applies_only_with_agentless_config() {
        let checker = ServerChecker::with_shell(CannedShell::ok(SAMPLE_OUTPUT), 1_000);
        assert!(checker.applies_to(&server_monitor(json!({}))));
        assert!(!checker.applies_to(&Monitor::new("agent", MonitorKind::Server)));
        assert!(!checker.applies_to(
            &Monitor::new("agent", MonitorKind::Server).with_setting("agentlessConfig", json!(null))
        ));
    }

    #[tokio::test]
    async fn test_metrics_within_thresholds_are_up() {
        let shell = CannedShell::ok(SAMPLE_OUTPUT);
        let checker = ServerChecker::with_shell(shell.clone(), 1_000);

        let observation =
            checker.check(&server_monitor(json!({"cpuPercent": 90.0}))).await.unwrap();

        assert_eq!(observation.status, MonitorStatus::Up);
        assert!(matches!(observation.resources, Some(ResourceSnapshot::Server(_))));
        assert_eq!(shell.calls.lock().unwrap().as_slice(), ["monitor@10.0.0.5"]);
    }

    #[tokio::test]
    async fn test_exceeded_threshold_is_down_with_snapshot() {
        let checker = ServerChecker::with_shell(CannedShell::ok(SAMPLE_OUTPUT), 1_000);

        let observation =
            checker.check(&server_monitor(json!({"memoryPercent": 70.0}))).await.unwrap();

        assert_eq!(observation.status, MonitorStatus::Down);
        let (reason, message) = observation.failure.clone().unwrap();
        assert_eq!(reason, FailureReason::CriteriaNotMet);
        assert!(message.starts_with("memory usage 75.0%"));
        assert!(observation.resources.is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let checker = ServerChecker::with_shell(CannedShell::failing("connection refused"), 1_000);
        let result = checker.check(&server_monitor(json!({}))).await;
        assert!(matches!(result, Err(CheckError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_password_and_option_injection_rejected() {
        let shell = CannedShell::ok(SAMPLE_OUTPUT);
        let checker = ServerChecker::with_shell(shell.clone(), 1_000);

        let password = Monitor::new("p", MonitorKind::Server).with_setting(
            "agentlessConfig",
            json!({"host": "h", "username": "u", "authentication": "password", "password": "x"}),
        );
        assert!(matches!(checker.check(&password).await, Err(CheckError::InvalidConfig(_))));

        let injected = Monitor::new("i", MonitorKind::Server).with_setting(
            "agentlessConfig",
            json!({"host": "-oProxyCommand=sh", "username": "u"}),
        );
        assert!(matches!(checker.check(&injected).await, Err(CheckError::InvalidConfig(_))));

        assert!(shell.calls.lock().unwrap().is_empty());
    }
}
