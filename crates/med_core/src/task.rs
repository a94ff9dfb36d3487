//! Fixed-interval periodic task owned by one execution context.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// A repeating tick on the tokio runtime.
///
/// Arming always aborts the previous loop first, so at most one loop per
/// `PeriodicTask` is ever alive. Ticks missed while the host was suspended are
/// skipped rather than replayed. Dropping the task cancels it.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    /// Starts (or replaces) the loop. The first tick happens one `period` from
    /// now; callers wanting an immediate evaluation run it themselves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.cancel();
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                debug!(task = name, "tick");
                tick();
            }
        });
        debug!(task = name, period_secs = period.as_secs(), "periodic task armed");
        self.handle = Some(handle);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(task = self.name, "periodic task cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
