use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::time::timeout;

use crate::error::CheckError;
use crate::models::monitor::Monitor;
use crate::monitoring::checker::Checker;
use crate::monitoring::types::Observation;
use crate::monitoring::validation::{validate_host, validate_port};

fn default_port() -> u16 {
    80
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpSettings {
    #[serde(alias = "ip", alias = "ipAddress")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

/// Reachability checker for `ip` monitors.
///
/// ICMP needs raw sockets and elevated privileges, so reachability is a
/// TCP connect to `host:port` within the configured bound.
pub struct IpChecker {
    timeout_duration: Duration,
    timeout_ms: u64,
}

impl IpChecker {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_duration: Duration::from_millis(timeout_ms), timeout_ms }
    }
}

#[async_trait::async_trait]
impl Checker for IpChecker {
    async fn check(&self, monitor: &Monitor) -> Result<Observation, CheckError> {
        let settings: IpSettings = monitor.settings()?;
        validate_host(&settings.host).map_err(|e| CheckError::InvalidConfig(e.to_string()))?;
        validate_port(settings.port).map_err(|e| CheckError::InvalidConfig(e.to_string()))?;

        let start = Instant::now();

        // DNS resolution counts against the same bound
        let connect = tokio::net::TcpStream::connect((settings.host.trim(), settings.port));

        timeout(self.timeout_duration, connect)
            .await
            .map_err(|_| CheckError::Timeout(self.timeout_ms))?
            .map_err(|e| {
                CheckError::Unreachable(format!("{}:{}: {}", settings.host, settings.port, e))
            })?;

        let latency = start.elapsed().as_millis() as u64;
        Ok(Observation::up().with_latency(latency))
    }
}
