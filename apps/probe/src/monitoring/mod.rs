pub mod checker;
/// Monitoring engine module - turns fetched monitors into reported results
///
/// This module is responsible for:
/// - Running the type-specific checks
/// - Dispatching each batch with per-monitor isolation
/// - Triggering cycles on the configured cadence
pub mod checkers;
pub mod criteria;
pub mod dispatcher;
pub mod executor;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use checker::{Checker, CheckerRegistry};
pub use dispatcher::{CycleOutcome, CycleSummary, Dispatcher};
pub use executor::MonitoringExecutor;
pub use scheduler::Trigger;
pub use types::CheckResult;
