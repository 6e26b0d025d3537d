// Consolidation: joins the power and weather streams into one Measurement per
// flush interval. All state is owned by the writer task; no locks needed.
//
// Lifecycle: running (updates and ticks) -> draining (cancel observed, queued
// and in-flight updates folded in) -> stopped (after one final flush attempt).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::models::{Measurement, PowerUpdate, WeatherUpdate};
use crate::publisher::{Publisher, Subscription};
use crate::sampler::MedianSampler;

/// Upper bound on waiting for in-flight publishes during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Append-only sink for measurements.
pub trait Store: Send + Sync + 'static {
    fn store(&self, measurement: &Measurement) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// What a flush decided. Only `Stored` reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    Stored(Measurement),
    /// No weather reading has arrived since start.
    NoWeather,
    /// No power sample in this window.
    NoPower,
    /// Median power was 0: nighttime or inverter idle.
    NoGeneration,
}

#[derive(Debug, Default)]
pub struct WriterStats {
    power_updates_total: AtomicU64,
    weather_updates_total: AtomicU64,
    measurements_stored_total: AtomicU64,
    flushes_skipped_total: AtomicU64,
    store_failures_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterStatsSnapshot {
    pub power_updates_total: u64,
    pub weather_updates_total: u64,
    pub measurements_stored_total: u64,
    pub flushes_skipped_total: u64,
    pub store_failures_total: u64,
}

impl WriterStats {
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            power_updates_total: self.power_updates_total.load(Ordering::Relaxed),
            weather_updates_total: self.weather_updates_total.load(Ordering::Relaxed),
            measurements_stored_total: self.measurements_stored_total.load(Ordering::Relaxed),
            flushes_skipped_total: self.flushes_skipped_total.load(Ordering::Relaxed),
            store_failures_total: self.store_failures_total.load(Ordering::Relaxed),
        }
    }
}

pub struct Writer<S: Store> {
    store: Arc<S>,
    power: Arc<Publisher<PowerUpdate>>,
    weather: Arc<Publisher<WeatherUpdate>>,
    interval: Duration,
    stats: Arc<WriterStats>,
    samples: MedianSampler,
    last_weather: Option<WeatherUpdate>,
    subscriptions: Option<(Subscription<PowerUpdate>, Subscription<WeatherUpdate>)>,
}

impl<S: Store> Writer<S> {
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new(
        store: Arc<S>,
        power: Arc<Publisher<PowerUpdate>>,
        weather: Arc<Publisher<WeatherUpdate>>,
        interval: Duration,
    ) -> Self {
        assert!(!interval.is_zero(), "writer flush interval must be non-zero");
        // Subscribe up front so nothing published before `run` starts is missed.
        let subscriptions = Some((power.subscribe(), weather.subscribe()));
        Self {
            store,
            power,
            weather,
            interval,
            stats: Arc::new(WriterStats::default()),
            samples: MedianSampler::new(),
            last_weather: None,
            subscriptions,
        }
    }

    pub fn stats(&self) -> Arc<WriterStats> {
        self.stats.clone()
    }

    /// Power samples waiting for the next flush.
    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn last_weather(&self) -> Option<&WeatherUpdate> {
        self.last_weather.as_ref()
    }

    /// Folds the current power of the first site into the window.
    /// Only one site is supported; any others are ignored.
    pub fn process_power(&mut self, update: &PowerUpdate) {
        self.stats.power_updates_total.fetch_add(1, Ordering::Relaxed);
        let Some(site) = update.first() else {
            tracing::debug!("power update without sites; ignored");
            return;
        };
        if update.len() > 1 {
            tracing::debug!(
                sites = update.len(),
                "only one site is supported; ignoring remaining sites"
            );
        }
        self.samples.add(site.current_power);
        tracing::debug!(
            site = %site.name,
            power = site.current_power,
            count = self.samples.len(),
            "power update received"
        );
    }

    /// Last write wins. Weather is reused across flushes until the next reading.
    pub fn process_weather(&mut self, update: WeatherUpdate) {
        self.stats
            .weather_updates_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            intensity = update.solar_intensity,
            weather = %update.weather,
            "weather update received"
        );
        self.last_weather = Some(update);
    }

    /// Single flush path for both the ticker and shutdown.
    /// A store failure is returned; the window it covered is not retried.
    pub async fn flush(&mut self) -> anyhow::Result<FlushOutcome> {
        let Some(weather) = self.last_weather.as_ref() else {
            tracing::debug!("no weather reading yet; skipping flush");
            self.stats
                .flushes_skipped_total
                .fetch_add(1, Ordering::Relaxed);
            return Ok(FlushOutcome::NoWeather);
        };
        if self.samples.is_empty() {
            tracing::debug!("no power samples in window; skipping flush");
            self.stats
                .flushes_skipped_total
                .fetch_add(1, Ordering::Relaxed);
            return Ok(FlushOutcome::NoPower);
        }

        let count = self.samples.len();
        let power = self.samples.median();
        if power == 0.0 {
            tracing::debug!(samples = count, "no generation; measurement not stored");
            self.stats
                .flushes_skipped_total
                .fetch_add(1, Ordering::Relaxed);
            return Ok(FlushOutcome::NoGeneration);
        }

        let measurement = Measurement {
            timestamp: Utc::now(),
            power,
            intensity: weather.solar_intensity,
            weather: weather.weather.clone(),
        };
        if let Err(e) = self.store.store(&measurement).await {
            self.stats
                .store_failures_total
                .fetch_add(1, Ordering::Relaxed);
            return Err(e).context("store measurement");
        }
        self.stats
            .measurements_stored_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            power = measurement.power,
            intensity = measurement.intensity,
            weather = %measurement.weather,
            samples = count,
            "measurement stored"
        );
        Ok(FlushOutcome::Stored(measurement))
    }

    async fn flush_logged(&mut self) {
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, operation = "store", "flush failed");
        }
    }

    /// Runs until `cancel` fires, then drains queued updates and flushes once more.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!(interval = ?self.interval, "starting writer");

        let (mut power_rx, mut weather_rx) = match self.subscriptions.take() {
            Some(subscriptions) => subscriptions,
            None => (self.power.subscribe(), self.weather.subscribe()),
        };

        // First flush one full interval after start, not immediately.
        let mut flush_tick = interval_at(Instant::now() + self.interval, self.interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // One branch per iteration, so a tick and a cancel landing together
            // still produce a single flush each.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(update) = power_rx.recv() => self.process_power(&update),
                Some(update) = weather_rx.recv() => self.process_weather(update),
                _ = flush_tick.tick() => self.flush_logged().await,
            }
        }

        tracing::debug!("writer draining");
        if tokio::time::timeout(
            DRAIN_TIMEOUT,
            self.drain(&mut power_rx, &mut weather_rx),
        )
        .await
        .is_err()
        {
            tracing::warn!(timeout = ?DRAIN_TIMEOUT, "drain timed out; flushing what was received");
        }
        self.flush_logged().await;
        tracing::debug!("writer stopped");
    }

    /// Leaves both streams and folds in everything still on its way: values
    /// already queued and values from publishes that were blocked on a full
    /// slot. Ends once no sender for either channel is left.
    async fn drain(
        &mut self,
        power_rx: &mut Subscription<PowerUpdate>,
        weather_rx: &mut Subscription<WeatherUpdate>,
    ) {
        self.power.unsubscribe(power_rx);
        self.weather.unsubscribe(weather_rx);
        while let Some(update) = power_rx.recv().await {
            self.process_power(&update);
        }
        while let Some(update) = weather_rx.recv().await {
            self.process_weather(update);
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
