use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CheckError;
use crate::models::monitor::{Monitor, MonitorKind};

/// Status of a monitoring check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Degraded,
    Down,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Degraded => write!(f, "degraded"),
            MonitorStatus::Down => write!(f, "down"),
        }
    }
}

/// Why a check was marked down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    Timeout,
    Unreachable,
    CriteriaNotMet,
    InvalidConfig,
    Internal,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Unreachable => "unreachable",
            FailureReason::CriteriaNotMet => "criteria-not-met",
            FailureReason::InvalidConfig => "invalid-config",
            FailureReason::Internal => "internal",
        };
        f.write_str(tag)
    }
}

/// Response metadata captured by HTTP checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub status_code: Option<u16>,
    pub headers: Vec<(String, String)>,
    /// First bytes of the body, truncated on a char boundary
    pub body_excerpt: Option<String>,
}

/// Resource usage read from an agentless server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetrics {
    pub cpu_load_percent: f64,
    pub memory_used_percent: f64,
    pub disk_used_percent: f64,
    pub memory_total_bytes: u64,
    pub disk_total_bytes: u64,
}

/// Health of one workload kind inside a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadHealth {
    pub healthy: usize,
    pub unhealthy: Vec<String>,
}

/// Workload summary for a Kubernetes namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealth {
    pub namespace: String,
    pub pods: WorkloadHealth,
    pub deployments: WorkloadHealth,
    pub stateful_sets: WorkloadHealth,
    pub jobs: WorkloadHealth,
}

impl ClusterHealth {
    fn kinds(&self) -> [&WorkloadHealth; 4] {
        [&self.pods, &self.deployments, &self.stateful_sets, &self.jobs]
    }

    pub fn healthy_count(&self) -> usize {
        self.kinds().iter().map(|k| k.healthy).sum()
    }

    pub fn unhealthy_count(&self) -> usize {
        self.kinds().iter().map(|k| k.unhealthy.len()).sum()
    }
}

/// Snapshot of resources attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResourceSnapshot {
    Server(ServerMetrics),
    Kubernetes(ClusterHealth),
}

/// What a checker observed when the probe itself succeeded.
///
/// The checker decides the status; a down observation carries the reason
/// and message so the snapshot survives alongside the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub status: MonitorStatus,
    pub latency_ms: Option<u64>,
    pub response: Option<ResponseMeta>,
    pub resources: Option<ResourceSnapshot>,
    pub failure: Option<(FailureReason, String)>,
}

impl Observation {
    pub fn up() -> Self {
        Self {
            status: MonitorStatus::Up,
            latency_ms: None,
            response: None,
            resources: None,
            failure: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: MonitorStatus::Degraded,
            failure: Some((FailureReason::CriteriaNotMet, message.into())),
            ..Self::up()
        }
    }

    pub fn down(reason: FailureReason, message: impl Into<String>) -> Self {
        Self { status: MonitorStatus::Down, failure: Some((reason, message.into())), ..Self::up() }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_response(mut self, response: ResponseMeta) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_resources(mut self, resources: ResourceSnapshot) -> Self {
        self.resources = Some(resources);
        self
    }
}

/// Result of a monitoring check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Id of the monitor that was checked
    pub monitor_id: String,

    /// Type tag of the monitor
    pub monitor_type: MonitorKind,

    /// Timestamp when the check was performed
    pub timestamp: DateTime<Utc>,

    /// Status of the check (up/degraded/down)
    pub status: MonitorStatus,

    /// Failure classification, set whenever the status is not up
    pub reason: Option<FailureReason>,

    /// Response time in milliseconds
    pub latency_ms: Option<u64>,

    /// HTTP response metadata (if applicable)
    pub response: Option<ResponseMeta>,

    /// Error message (if check failed)
    pub error_message: Option<String>,

    /// Server metrics or cluster summary
    pub resources: Option<ResourceSnapshot>,

    /// Name of the probe that performed this check
    pub probe_name: String,

    /// How many times the checker ran for this result
    pub attempts: u32,
}

impl CheckResult {
    /// Create a new check result. The status starts as down until an
    /// observation is applied.
    pub fn new(monitor: &Monitor, probe_name: String) -> Self {
        Self {
            monitor_id: monitor.id.clone(),
            monitor_type: monitor.kind.clone(),
            timestamp: Utc::now(),
            status: MonitorStatus::Down,
            reason: None,
            latency_ms: None,
            response: None,
            error_message: None,
            resources: None,
            probe_name,
            attempts: 1,
        }
    }

    /// Apply what the checker observed
    pub fn observed(mut self, observation: Observation) -> Self {
        self.status = observation.status;
        self.latency_ms = observation.latency_ms;
        self.response = observation.response;
        self.resources = observation.resources;
        match observation.failure {
            Some((reason, message)) => {
                self.reason = Some(reason);
                self.error_message = Some(message);
            }
            None => {
                self.reason = None;
                self.error_message = None;
            }
        }
        self
    }

    /// Mark the check as failed with error
    pub fn failure(mut self, error: &CheckError) -> Self {
        self.status = MonitorStatus::Down;
        self.reason = Some(error.reason());
        self.error_message = Some(error.to_string());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_down(&self) -> bool {
        self.status == MonitorStatus::Down
    }
}
