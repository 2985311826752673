use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Runs a job on a fixed interval until shutdown is signalled. The first tick fires
/// immediately; ticks missed while a job is still running are skipped, not queued.
#[derive(Clone, Debug)]
pub struct Ticker {
    name: &'static str,
    interval: Duration,
}

impl Ticker {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self { name, interval: interval.max(Duration::from_millis(1)) }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the number of completed runs.
    pub async fn run<F, Fut>(&self, mut job: F, mut shutdown: watch::Receiver<bool>) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs = 0_u64;
        info!(
            event_name = "scheduler.ticker.started",
            ticker = self.name,
            interval_secs = self.interval.as_secs(),
            "ticker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    debug!(event_name = "scheduler.ticker.tick", ticker = self.name, run = runs + 1);
                    job().await;
                    runs += 1;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(event_name = "scheduler.ticker.stopped", ticker = self.name, runs, "ticker stopped");
        runs
    }
}
