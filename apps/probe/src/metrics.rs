use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::monitoring::types::MonitorStatus;

/// Process-wide counters, shared by every cycle and read by the status route.
///
/// Counters only ever increase; cycles keep all other state to themselves.
#[derive(Debug, Default)]
pub struct ProbeMetrics {
    cycles_started: AtomicU64,
    cycles_idle: AtomicU64,
    fetch_failures: AtomicU64,
    checks_run: AtomicU64,
    checks_up: AtomicU64,
    checks_degraded: AtomicU64,
    checks_down: AtomicU64,
    skipped_unknown: AtomicU64,
    report_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_idle: u64,
    pub fetch_failures: u64,
    pub checks_run: u64,
    pub checks_up: u64,
    pub checks_degraded: u64,
    pub checks_down: u64,
    pub skipped_unknown: u64,
    pub report_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl ProbeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle_started(&self) {
        bump(&self.cycles_started);
    }

    pub fn cycle_idle(&self) {
        bump(&self.cycles_idle);
    }

    pub fn fetch_failed(&self) {
        bump(&self.fetch_failures);
    }

    pub fn unknown_type_skipped(&self) {
        bump(&self.skipped_unknown);
    }

    pub fn report_failed(&self) {
        bump(&self.report_failures);
    }

    pub fn check_completed(&self, status: MonitorStatus) {
        bump(&self.checks_run);
        match status {
            MonitorStatus::Up => bump(&self.checks_up),
            MonitorStatus::Degraded => bump(&self.checks_degraded),
            MonitorStatus::Down => bump(&self.checks_down),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            cycles_started: load(&self.cycles_started),
            cycles_idle: load(&self.cycles_idle),
            fetch_failures: load(&self.fetch_failures),
            checks_run: load(&self.checks_run),
            checks_up: load(&self.checks_up),
            checks_degraded: load(&self.checks_degraded),
            checks_down: load(&self.checks_down),
            skipped_unknown: load(&self.skipped_unknown),
            report_failures: load(&self.report_failures),
        }
    }
}
