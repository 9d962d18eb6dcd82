use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use super::checker::Checker;
use super::types::CheckResult;
use crate::error::CheckError;
use crate::models::monitor::Monitor;

/// Monitoring executor - turns one checker run into a `CheckResult`
pub struct MonitoringExecutor {
    probe_name: String,
    monitor_budget: Duration,
    check_retries: u32,
}

impl MonitoringExecutor {
    /// Create a new monitoring executor
    pub fn new(probe_name: String, monitor_budget: Duration, check_retries: u32) -> Self {
        Self { probe_name, monitor_budget, check_retries }
    }

    /// Execute a monitoring check.
    ///
    /// Never fails: checker errors and an exhausted budget both come back as
    /// down results. Down results are re-checked up to `check_retries`
    /// times while the budget lasts.
    pub async fn execute_check(&self, checker: Arc<dyn Checker>, monitor: &Monitor) -> CheckResult {
        let budget_ms = self.monitor_budget.as_millis() as u64;
        // Lives outside the timed future so an expired budget still knows
        // how many attempts were started.
        let started = AtomicU32::new(0);

        let attempts = async {
            loop {
                let attempt = started.fetch_add(1, Ordering::SeqCst) + 1;
                let result = self.attempt(checker.as_ref(), monitor).await.with_attempts(attempt);
                if !result.is_down() || attempt > self.check_retries {
                    return result;
                }
                debug!(
                    "Monitor {} down ({}), retrying ({}/{})",
                    monitor.id,
                    result.reason.map(|r| r.to_string()).unwrap_or_default(),
                    attempt,
                    self.check_retries
                );
            }
        };

        match timeout(self.monitor_budget, attempts).await {
            Ok(result) => result,
            Err(_) => CheckResult::new(monitor, self.probe_name.clone())
                .failure(&CheckError::Timeout(budget_ms))
                .with_attempts(started.load(Ordering::SeqCst).max(1)),
        }
    }

    async fn attempt(&self, checker: &dyn Checker, monitor: &Monitor) -> CheckResult {
        let result = CheckResult::new(monitor, self.probe_name.clone());
        match checker.check(monitor).await {
            Ok(observation) => result.observed(observation),
            Err(e) => result.failure(&e),
        }
    }
}
