// Drives one Updater on a fixed cadence and publishes what it fetches.
// Polls are strictly sequential; a failed poll is logged and the loop goes on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::publisher::Publisher;
use crate::sources::{SourceError, Updater};

/// A poller is unhealthy once its last update is older than this many intervals.
pub const STALE_AFTER_INTERVALS: u32 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("no data received from {0}")]
    NeverUpdated(&'static str),

    #[error("no data received from {name} for {since:?}")]
    Stale { name: &'static str, since: Duration },
}

/// Liveness and counters of one poller, shared with the HTTP surface.
#[derive(Debug)]
pub struct PollerHealth {
    source: &'static str,
    interval: Duration,
    last_update: Mutex<Option<Instant>>,
    polls_ok: AtomicU64,
    polls_failed: AtomicU64,
}

impl PollerHealth {
    pub fn new(source: &'static str, interval: Duration) -> Self {
        Self {
            source,
            interval,
            last_update: Mutex::new(None),
            polls_ok: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn polls_ok(&self) -> u64 {
        self.polls_ok.load(Ordering::Relaxed)
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.load(Ordering::Relaxed)
    }

    pub fn is_healthy(&self) -> Result<(), HealthError> {
        let last = *self
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(last) = last else {
            return Err(HealthError::NeverUpdated(self.source));
        };
        let since = last.elapsed();
        if since > self.interval * STALE_AFTER_INTERVALS {
            return Err(HealthError::Stale {
                name: self.source,
                since,
            });
        }
        Ok(())
    }

    fn record_success(&self) {
        *self
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.polls_ok.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Poller<U: Updater> {
    updater: U,
    publisher: Arc<Publisher<U::Update>>,
    interval: Duration,
    health: Arc<PollerHealth>,
}

impl<U: Updater> Poller<U> {
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new(updater: U, publisher: Arc<Publisher<U::Update>>, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "poll interval must be non-zero");
        let health = Arc::new(PollerHealth::new(updater.source(), interval));
        Self {
            updater,
            publisher,
            interval,
            health,
        }
    }

    pub fn health(&self) -> Arc<PollerHealth> {
        self.health.clone()
    }

    /// Fetch once and, on success, publish. Waits for delivery to every subscriber.
    pub async fn poll_once(&self) -> Result<(), SourceError> {
        let start = Instant::now();
        match self.updater.get_update().await {
            Ok(update) => {
                self.health.record_success();
                self.publisher.publish(update).await;
                tracing::debug!(
                    source = self.updater.source(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "poll done"
                );
                Ok(())
            }
            Err(e) => {
                self.health.record_failure();
                Err(e)
            }
        }
    }

    /// Polls until `cancel` fires. The first poll runs immediately. An in-flight
    /// poll is finished before the loop notices cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        let source = self.updater.source();
        tracing::debug!(source, interval = ?self.interval, "starting poller");

        let mut tick = interval(self.interval);
        // A poll that overruns its interval is followed immediately by the next
        // one, and the schedule restarts from there. No burst of catch-up polls.
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(
                            source,
                            error = %e,
                            operation = "get_update",
                            "poll failed"
                        );
                    }
                }
            }
        }
        tracing::debug!(source, "poller stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
