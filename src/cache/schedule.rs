use crate::cache::feed_cache::{FeedCache, RefreshOutcome};
use crate::feed::{Fetch, Fetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Lifecycle state of a [`RefreshSchedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Stopped,
    Running,
}

/// Periodic background refresh of one [`FeedCache`].
///
/// Each schedule owns its own timer task, so a slow or failing feed never
/// delays another. The first tick fires one full period after [`start`];
/// the initial pull is expected to have happened before that.
///
/// Dropping a running schedule stops it the same way [`stop`] does.
///
/// [`start`]: RefreshSchedule::start
/// [`stop`]: RefreshSchedule::stop
pub struct RefreshSchedule<F = Fetcher> {
    cache: Arc<FeedCache<F>>,
    period: Duration,
    state: ScheduleState,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl<F: Fetch> RefreshSchedule<F> {
    /// Binds a schedule to `cache`. Nothing runs until [`start`](Self::start).
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero; configuration validation rejects that
    /// before any schedule is built.
    pub fn new(cache: Arc<FeedCache<F>>, period: Duration) -> Self {
        assert!(!period.is_zero(), "refresh period must be non-zero");
        Self {
            cache,
            period,
            state: ScheduleState::Stopped,
            stop_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// Starts the timer task. A no-op if already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.state == ScheduleState::Running {
            tracing::warn!(feed = %self.cache.name(), "Refresh schedule already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let cache = Arc::clone(&self.cache);
        let period = self.period;

        self.handle = Some(tokio::spawn(run(cache, period, stop_rx)));
        self.stop_tx = Some(stop_tx);
        self.state = ScheduleState::Running;

        tracing::info!(
            feed = %self.cache.name(),
            period_secs = self.period.as_secs(),
            "Refresh schedule started"
        );
    }

    /// Cancels all future ticks. A refresh already in flight finishes, but
    /// its result is discarded. A no-op if already stopped.
    pub fn stop(&mut self) {
        if self.state == ScheduleState::Stopped {
            return;
        }
        if let Some(tx) = self.stop_tx.take() {
            // Receiver gone means the task already exited
            let _ = tx.send(true);
        }
        self.state = ScheduleState::Stopped;
        tracing::info!(feed = %self.cache.name(), "Refresh schedule stopped");
    }

    /// Stops the schedule and waits for its task to exit, including any
    /// refresh that was in flight.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(feed = %self.cache.name(), error = %e, "Refresh task panicked");
            }
        }
    }
}

impl<F> Drop for RefreshSchedule<F> {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
    }
}

async fn run<F: Fetch>(cache: Arc<FeedCache<F>>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        let still_wanted = || !*stop_rx.borrow();
        match cache.try_refresh(still_wanted).await {
            None => {}
            Some(Ok(RefreshOutcome::Replaced(count))) => {
                tracing::debug!(feed = %cache.name(), items = count, "Scheduled refresh complete");
            }
            Some(Ok(RefreshOutcome::Discarded)) => break,
            Some(Err(e)) => {
                tracing::warn!(feed = %cache.name(), error = %e, "Scheduled refresh failed, keeping cached items");
            }
        }
    }

    tracing::debug!(feed = %cache.name(), "Refresh task exited");
}
