// Shared test helpers: fake store, fake updater, update builders

#![allow(dead_code)]

use solar_monitor::models::{Measurement, PowerUpdate, SiteUpdate, WeatherUpdate};
use solar_monitor::sources::{SourceError, Updater};
use solar_monitor::writer::Store;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub fn power(watts: f64) -> PowerUpdate {
    vec![SiteUpdate {
        id: 1,
        name: "my home".into(),
        current_power: watts,
        ..Default::default()
    }]
}

pub fn weather(intensity: f64, state: &str) -> WeatherUpdate {
    WeatherUpdate {
        temperature: 18.0,
        solar_intensity: intensity,
        weather: state.into(),
    }
}

/// Records every stored measurement; fails while `fail` is set.
#[derive(Default)]
pub struct FakeStore {
    pub measurements: Mutex<Vec<Measurement>>,
    pub fail: AtomicBool,
}

impl FakeStore {
    pub fn stored(&self) -> Vec<Measurement> {
        self.measurements.lock().unwrap().clone()
    }
}

impl Store for FakeStore {
    async fn store(&self, measurement: &Measurement) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        self.measurements.lock().unwrap().push(measurement.clone());
        Ok(())
    }
}

/// Returns `update` on every call, except the first `failures` calls which fail.
pub struct FakeUpdater<T> {
    pub update: T,
    pub failures: u64,
    pub calls: AtomicU64,
}

impl<T> FakeUpdater<T> {
    pub fn new(update: T) -> Self {
        Self {
            update,
            failures: 0,
            calls: AtomicU64::new(0),
        }
    }

    pub fn failing_first(update: T, failures: u64) -> Self {
        Self {
            update,
            failures,
            calls: AtomicU64::new(0),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Updater for FakeUpdater<T> {
    type Update = T;

    fn source(&self) -> &'static str {
        "fake"
    }

    async fn get_update(&self) -> Result<T, SourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(SourceError::Status {
                url: "/fake".into(),
                status: 503,
            });
        }
        Ok(self.update.clone())
    }
}
