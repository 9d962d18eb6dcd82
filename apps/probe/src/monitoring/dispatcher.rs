//! One dispatch cycle: fetch the due monitors, check each one, report back.
//!
//! Every monitor is processed in its own task so a checker that errors,
//! hangs past its budget or panics only costs that monitor's result.

use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, error, info, warn};

use super::checker::CheckerRegistry;
use super::executor::MonitoringExecutor;
use super::types::{CheckResult, MonitorStatus};
use crate::config::{Config, Dispatch};
use crate::control_plane::ControlPlane;
use crate::error::CheckError;
use crate::metrics::ProbeMetrics;
use crate::models::monitor::Monitor;

/// What happened to a single monitor within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Skipped,
    Checked { status: MonitorStatus, reported: bool },
}

/// Counts for one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub processed: usize,
    pub up: usize,
    pub degraded: usize,
    pub down: usize,
    pub skipped: usize,
    pub report_failures: usize,
}

impl CycleSummary {
    fn record(mut self, disposition: Disposition) -> Self {
        match disposition {
            Disposition::Skipped => self.skipped += 1,
            Disposition::Checked { status, reported } => {
                self.processed += 1;
                match status {
                    MonitorStatus::Up => self.up += 1,
                    MonitorStatus::Degraded => self.degraded += 1,
                    MonitorStatus::Down => self.down += 1,
                }
                if !reported {
                    self.report_failures += 1;
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The control plane had nothing due
    Idle,
    /// The batch could not be fetched; nothing was checked
    FetchFailed,
    Completed(CycleSummary),
}

pub struct Dispatcher {
    control_plane: Arc<dyn ControlPlane>,
    registry: Arc<CheckerRegistry>,
    executor: MonitoringExecutor,
    metrics: Arc<ProbeMetrics>,
    probe_name: String,
    config: Dispatch,
}

impl Dispatcher {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        registry: Arc<CheckerRegistry>,
        metrics: Arc<ProbeMetrics>,
        config: &Config,
    ) -> Self {
        let probe_name = config.control_plane.probe_name.clone();
        Self {
            executor: MonitoringExecutor::new(
                probe_name.clone(),
                config.dispatch.monitor_budget(),
                config.dispatch.check_retries,
            ),
            control_plane,
            registry,
            metrics,
            probe_name,
            config: config.dispatch.clone(),
        }
    }

    /// Run one cycle over the batch of monitors the control plane hands out.
    pub async fn run_cycle(self: &Arc<Self>) -> CycleOutcome {
        self.metrics.cycle_started();

        let monitors = match self.control_plane.fetch_monitors(self.config.resources_limit).await {
            Ok(monitors) => monitors,
            Err(e) => {
                error!("Failed to fetch monitors: {}", e);
                self.metrics.fetch_failed();
                return CycleOutcome::FetchFailed;
            }
        };

        if monitors.is_empty() {
            debug!(
                "No monitors due, backing off for {}s",
                self.config.idle_backoff_secs
            );
            self.metrics.cycle_idle();
            tokio::time::sleep(self.config.idle_backoff()).await;
            return CycleOutcome::Idle;
        }

        info!("Dispatching {} monitors", monitors.len());

        let summary = stream::iter(monitors)
            .map(|monitor| self.process_isolated(monitor))
            .buffer_unordered(self.config.concurrency.max(1))
            .fold(CycleSummary::default(), |summary, disposition| async move {
                summary.record(disposition)
            })
            .await;

        info!(
            "Cycle completed: {} checked ({} up, {} degraded, {} down), {} skipped, {} unreported",
            summary.processed,
            summary.up,
            summary.degraded,
            summary.down,
            summary.skipped,
            summary.report_failures
        );

        CycleOutcome::Completed(summary)
    }

    /// Process `monitor` on its own task. A panic inside the checker is
    /// reported as an internal failure for that monitor.
    async fn process_isolated(self: &Arc<Self>, monitor: Monitor) -> Disposition {
        let fallback = CheckResult::new(&monitor, self.probe_name.clone());
        let this = Arc::clone(self);

        match tokio::spawn(async move { this.process(monitor).await }).await {
            Ok(disposition) => disposition,
            Err(e) => {
                error!("Check task for monitor {} aborted: {}", fallback.monitor_id, e);
                let result = fallback.failure(&CheckError::Internal(format!("check aborted: {e}")));
                self.deliver(result).await
            }
        }
    }

    async fn process(&self, monitor: Monitor) -> Disposition {
        if !monitor.enabled {
            debug!("Monitor {} is disabled, skipping", monitor.label());
            return Disposition::Skipped;
        }

        let Some(checker) = self.registry.get(&monitor.kind) else {
            if monitor.kind.is_known() {
                debug!("No {} checker configured, skipping {}", monitor.kind, monitor.label());
            } else {
                warn!(
                    "Unknown type '{}' for monitor {}, skipping",
                    monitor.kind,
                    monitor.label()
                );
                self.metrics.unknown_type_skipped();
            }
            return Disposition::Skipped;
        };

        if !checker.applies_to(&monitor) {
            debug!("Monitor {} is not checked by this probe, skipping", monitor.label());
            return Disposition::Skipped;
        }

        let result = self.executor.execute_check(checker, &monitor).await;
        debug!("Checked {} in {} attempt(s)", monitor.label(), result.attempts);
        self.deliver(result).await
    }

    async fn deliver(&self, result: CheckResult) -> Disposition {
        let status = result.status;
        self.metrics.check_completed(status);

        match &result.error_message {
            Some(message) => debug!("Monitor {} is {}: {}", result.monitor_id, status, message),
            None => debug!("Monitor {} is {}", result.monitor_id, status),
        }

        let reported = match self.control_plane.report(&result).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to report result for monitor {}: {}", result.monitor_id, e);
                self.metrics.report_failed();
                false
            }
        };

        Disposition::Checked { status, reported }
    }
}
