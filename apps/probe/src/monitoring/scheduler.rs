use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::dispatcher::Dispatcher;
use crate::config::Schedule;

/// Delay from `now` until the next firing.
///
/// Firings sit on wall-clock multiples of `cadence` (counted from the Unix
/// epoch, like a `*/N` cron minute field) shifted by `offset`. The result is
/// always in `(0, cadence]`, so a firing exactly on a boundary schedules the
/// following one.
pub fn next_fire_delay(now: DateTime<Utc>, cadence: Duration, offset: Duration) -> Duration {
    let cadence_ms = (cadence.as_millis() as i64).max(1);
    let offset_ms = offset.as_millis() as i64 % cadence_ms;
    let shifted = now.timestamp_millis() - offset_ms;

    let next = (shifted.div_euclid(cadence_ms) + 1) * cadence_ms;
    Duration::from_millis((next - shifted) as u64)
}

/// Cadence trigger - starts a dispatch cycle on every firing without
/// waiting for the previous one.
pub struct Trigger {
    dispatcher: Arc<Dispatcher>,
    cadence: Duration,
    offset: Duration,
    run_on_start: bool,
}

impl Trigger {
    /// Create a trigger. The start offset is drawn here, once per process,
    /// so replicas started together spread their requests.
    pub fn new(dispatcher: Arc<Dispatcher>, config: &Schedule) -> Self {
        let offset = Duration::from_secs(rand::thread_rng().gen_range(0..=config.max_jitter_secs));
        Self {
            dispatcher,
            cadence: Duration::from_secs(config.cadence_minutes * 60),
            offset,
            run_on_start: config.run_on_start,
        }
    }

    pub fn next_fire_delay(&self, now: DateTime<Utc>) -> Duration {
        next_fire_delay(now, self.cadence, self.offset)
    }

    /// Spawn the trigger loop. The handle only completes if the task is
    /// aborted.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Trigger started: every {} minutes, offset {}s",
                self.cadence.as_secs() / 60,
                self.offset.as_secs()
            );

            if self.run_on_start {
                self.fire();
            }

            loop {
                let delay = self.next_fire_delay(Utc::now());
                debug!("Next cycle in {}s", delay.as_secs());
                tokio::time::sleep(delay).await;
                self.fire();
            }
        })
    }

    fn fire(&self) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.run_cycle().await;
        });
    }
}
