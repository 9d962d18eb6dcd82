use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::CheckError;
use crate::models::monitor::Monitor;
use crate::monitoring::checker::Checker;
use crate::monitoring::types::{FailureReason, Observation};

fn default_window_minutes() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingSettings {
    last_ping_time: Option<DateTime<Utc>>,
    #[serde(default = "default_window_minutes")]
    window_minutes: u64,
}

/// Heartbeat checker for `incomingHttpRequest` monitors.
///
/// Nothing is probed: the control plane records when the monitored system
/// last called in, and this decides whether that is recent enough.
#[derive(Debug, Default)]
pub struct IncomingRequestChecker;

impl IncomingRequestChecker {
    pub fn new() -> Self {
        Self
    }

    fn evaluate(
        settings: &IncomingSettings,
        now: DateTime<Utc>,
    ) -> Result<Observation, CheckError> {
        let window = i64::try_from(settings.window_minutes)
            .ok()
            .filter(|minutes| *minutes > 0)
            .and_then(Duration::try_minutes)
            .ok_or_else(|| {
                CheckError::InvalidConfig(format!(
                    "windowMinutes out of range: {}",
                    settings.window_minutes
                ))
            })?;

        let Some(last_seen) = settings.last_ping_time else {
            return Ok(Observation::down(
                FailureReason::CriteriaNotMet,
                "no heartbeat received yet",
            ));
        };

        // A timestamp ahead of our clock is skew, not staleness
        let age = (now - last_seen).max(Duration::zero());
        if age <= window {
            Ok(Observation::up())
        } else {
            Ok(Observation::down(
                FailureReason::CriteriaNotMet,
                format!(
                    "last heartbeat {} s ago, window is {} min",
                    age.num_seconds(),
                    settings.window_minutes
                ),
            ))
        }
    }
}

#[async_trait::async_trait]
impl Checker for IncomingRequestChecker {
    async fn check(&self, monitor: &Monitor) -> Result<Observation, CheckError> {
        let settings: IncomingSettings = monitor.settings()?;
        Self::evaluate(&settings, Utc::now())
    }
}
