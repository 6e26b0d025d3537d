// Writer tests: median consolidation, skip rules, store failures, shutdown flush

mod common;

use common::{FakeStore, power, weather};
use solar_monitor::models::{PowerUpdate, SiteUpdate, WeatherUpdate};
use solar_monitor::publisher::Publisher;
use solar_monitor::writer::{FlushOutcome, Writer};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const FLUSH_INTERVAL: Duration = Duration::from_secs(900);

struct Harness {
    store: Arc<FakeStore>,
    power: Arc<Publisher<PowerUpdate>>,
    weather: Arc<Publisher<WeatherUpdate>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(FakeStore::default()),
            power: Arc::new(Publisher::default()),
            weather: Arc::new(Publisher::default()),
        }
    }

    fn writer(&self) -> Writer<FakeStore> {
        Writer::new(
            self.store.clone(),
            self.power.clone(),
            self.weather.clone(),
            FLUSH_INTERVAL,
        )
    }
}

#[tokio::test]
async fn test_flush_stores_power_with_latest_weather() {
    let h = Harness::new();
    let mut writer = h.writer();

    writer.process_power(&power(3000.0));
    writer.process_weather(weather(75.0, "SUNNY"));

    let outcome = writer.flush().await.unwrap();
    let FlushOutcome::Stored(m) = outcome else {
        panic!("expected a stored measurement, got {:?}", outcome);
    };
    assert_eq!(m.power, 3000.0);
    assert_eq!(m.intensity, 75.0);
    assert_eq!(m.weather, "SUNNY");
    assert_eq!(h.store.stored(), vec![m]);
    assert_eq!(writer.pending_samples(), 0);
}

#[tokio::test]
async fn test_flush_uses_median_of_window() {
    let h = Harness::new();
    let mut writer = h.writer();
    writer.process_weather(weather(40.0, "CLOUDY"));

    writer.process_power(&power(2000.0));
    writer.process_power(&power(4000.0));
    assert_eq!(writer.pending_samples(), 2);
    let outcome = writer.flush().await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Stored(ref m) if m.power == 3000.0));

    // An idle reading pulls the median down, it does not suppress the row.
    writer.process_power(&power(0.0));
    writer.process_power(&power(3000.0));
    let outcome = writer.flush().await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Stored(ref m) if m.power == 1500.0));
    assert_eq!(h.store.stored().len(), 2);
}

#[tokio::test]
async fn test_flush_without_weather_keeps_samples() {
    let h = Harness::new();
    let mut writer = h.writer();

    writer.process_power(&power(1200.0));
    assert_eq!(writer.flush().await.unwrap(), FlushOutcome::NoWeather);
    assert_eq!(writer.pending_samples(), 1);
    assert!(h.store.stored().is_empty());

    writer.process_weather(weather(30.0, "RAIN"));
    let outcome = writer.flush().await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Stored(ref m) if m.power == 1200.0 && m.weather == "RAIN"));
}

#[tokio::test]
async fn test_flush_without_power_stores_nothing() {
    let h = Harness::new();
    let mut writer = h.writer();

    writer.process_weather(weather(80.0, "SUN"));
    assert_eq!(writer.flush().await.unwrap(), FlushOutcome::NoPower);
    assert!(h.store.stored().is_empty());
    assert!(writer.last_weather().is_some());
}

#[tokio::test]
async fn test_zero_generation_is_skipped_and_weather_retained() {
    let h = Harness::new();
    let mut writer = h.writer();

    writer.process_weather(weather(0.0, "NIGHT_CLEAR"));
    writer.process_power(&power(0.0));
    writer.process_power(&power(0.0));
    assert_eq!(writer.flush().await.unwrap(), FlushOutcome::NoGeneration);
    assert_eq!(writer.pending_samples(), 0);
    assert!(h.store.stored().is_empty());

    // Next window reuses the retained weather reading.
    writer.process_power(&power(500.0));
    let outcome = writer.flush().await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Stored(ref m) if m.weather == "NIGHT_CLEAR"));
}

#[tokio::test]
async fn test_latest_weather_wins() {
    let h = Harness::new();
    let mut writer = h.writer();

    writer.process_weather(weather(10.0, "RAIN"));
    writer.process_weather(weather(90.0, "SUN"));
    writer.process_power(&power(2500.0));
    let outcome = writer.flush().await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Stored(ref m) if m.intensity == 90.0 && m.weather == "SUN"));
}

#[tokio::test]
async fn test_only_first_site_is_sampled() {
    let h = Harness::new();
    let mut writer = h.writer();
    writer.process_weather(weather(50.0, "CLOUDY"));

    let mut update = power(1000.0);
    update.push(SiteUpdate {
        id: 2,
        name: "barn".into(),
        current_power: 9000.0,
        ..Default::default()
    });
    writer.process_power(&update);
    writer.process_power(&Vec::new());
    assert_eq!(writer.pending_samples(), 1);

    let outcome = writer.flush().await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Stored(ref m) if m.power == 1000.0));
}

#[tokio::test]
async fn test_store_failure_is_reported_and_next_window_proceeds() {
    let h = Harness::new();
    let mut writer = h.writer();
    let stats = writer.stats();

    h.store.fail.store(true, Ordering::SeqCst);
    writer.process_weather(weather(60.0, "SUN"));
    writer.process_power(&power(2000.0));
    let err = writer.flush().await.unwrap_err();
    assert!(format!("{:#}", err).contains("database unavailable"));
    assert_eq!(stats.snapshot().store_failures_total, 1);
    // The failed window is not retried.
    assert_eq!(writer.pending_samples(), 0);

    h.store.fail.store(false, Ordering::SeqCst);
    writer.process_power(&power(2100.0));
    let outcome = writer.flush().await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Stored(ref m) if m.power == 2100.0));
    assert_eq!(h.store.stored().len(), 1);
}

#[tokio::test]
async fn test_stats_count_updates_and_outcomes() {
    let h = Harness::new();
    let mut writer = h.writer();
    let stats = writer.stats();

    writer.process_power(&power(100.0));
    let _ = writer.flush().await;
    writer.process_weather(weather(20.0, "CLOUDY"));
    let _ = writer.flush().await;

    let s = stats.snapshot();
    assert_eq!(s.power_updates_total, 1);
    assert_eq!(s.weather_updates_total, 1);
    assert_eq!(s.measurements_stored_total, 1);
    assert_eq!(s.flushes_skipped_total, 1);
    assert_eq!(s.store_failures_total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_flushes_once_per_interval() {
    let h = Harness::new();
    let writer = h.writer();
    let cancel = CancellationToken::new();
    let handle = writer.spawn(cancel.clone());

    h.power.publish(power(3000.0)).await;
    h.weather.publish(weather(75.0, "SUN")).await;

    tokio::time::sleep(FLUSH_INTERVAL - Duration::from_secs(1)).await;
    assert!(h.store.stored().is_empty(), "no flush before one interval");

    tokio::time::sleep(Duration::from_secs(2)).await;
    let stored = h.store.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].power, 3000.0);
    assert_eq!(stored[0].intensity, 75.0);

    // Next window: zero generation, nothing stored; weather still retained.
    h.power.publish(power(0.0)).await;
    tokio::time::sleep(FLUSH_INTERVAL).await;
    assert_eq!(h.store.stored().len(), 1);

    h.power.publish(power(1800.0)).await;
    tokio::time::sleep(FLUSH_INTERVAL).await;
    let stored = h.store.stored();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].power, 1800.0);
    assert_eq!(stored[1].weather, "SUN");

    cancel.cancel();
    handle.await.unwrap();
    // Empty final window: nothing more.
    assert_eq!(h.store.stored().len(), 2);
    assert_eq!(h.power.subscriber_count(), 0);
    assert_eq!(h.weather.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_pending_window_once() {
    let h = Harness::new();
    let writer = h.writer();
    let cancel = CancellationToken::new();
    let handle = writer.spawn(cancel.clone());

    h.power.publish(power(2000.0)).await;
    h.power.publish(power(4000.0)).await;
    h.weather.publish(weather(55.0, "CLOUDY")).await;
    cancel.cancel();
    handle.await.unwrap();

    let stored = h.store.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].power, 3000.0);
    assert_eq!(stored[0].weather, "CLOUDY");
}

#[tokio::test]
async fn test_shutdown_without_weather_stores_nothing() {
    let h = Harness::new();
    let writer = h.writer();
    let cancel = CancellationToken::new();
    let handle = writer.spawn(cancel.clone());

    h.power.publish(power(2000.0)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("writer stops on cancel")
        .unwrap();
    assert!(h.store.stored().is_empty());
}

#[tokio::test]
async fn test_updates_published_before_run_are_not_lost() {
    let h = Harness::new();
    let writer = h.writer();

    // Subscribed at construction: single-slot channels hold one value each.
    h.power.publish(power(2200.0)).await;
    h.weather.publish(weather(65.0, "SUN")).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    writer.run(cancel).await;

    let stored = h.store.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].power, 2200.0);
}

#[tokio::test]
async fn test_shutdown_keeps_value_from_blocked_publish() {
    let h = Harness::new();
    let writer = h.writer();

    // Fills the writer's single power slot.
    h.power.publish(power(1000.0)).await;
    let blocked = {
        let power_pub = h.power.clone();
        tokio::spawn(async move { power_pub.publish(power(3000.0)).await })
    };
    // Let the second publish reach the full slot and wait there.
    tokio::task::yield_now().await;
    assert!(!blocked.is_finished());
    h.weather.publish(weather(70.0, "SUN")).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    writer.run(cancel).await;
    blocked.await.unwrap();

    let stored: Vec<f64> = h.store.stored().iter().map(|m| m.power).collect();
    assert_eq!(stored, vec![2000.0]);
}

#[tokio::test(start_paused = true)]
async fn test_tick_and_cancel_at_same_instant_store_window_once() {
    let h = Harness::new();
    let writer = h.writer();
    let stats = writer.stats();
    let cancel = CancellationToken::new();
    let handle = writer.spawn(cancel.clone());

    h.power.publish(power(2500.0)).await;
    h.weather.publish(weather(60.0, "SUN")).await;

    // Lands on the first flush tick.
    tokio::time::sleep(FLUSH_INTERVAL).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(h.store.stored().len(), 1);
    let s = stats.snapshot();
    assert_eq!(s.measurements_stored_total, 1);
    // Whichever of tick and cancel wins, the other flush sees an empty window.
    assert!(s.flushes_skipped_total <= 1);
    assert_eq!(s.store_failures_total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_flush_after_tick_then_cancel_is_empty() {
    let h = Harness::new();
    let writer = h.writer();
    let stats = writer.stats();
    let cancel = CancellationToken::new();
    let handle = writer.spawn(cancel.clone());

    h.power.publish(power(2500.0)).await;
    h.weather.publish(weather(60.0, "SUN")).await;

    tokio::time::sleep(FLUSH_INTERVAL).await;
    // Give the writer its turn on the tick before cancelling.
    while stats.snapshot().measurements_stored_total == 0 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(h.store.stored().len(), 1);
    let s = stats.snapshot();
    assert_eq!(s.measurements_stored_total, 1);
    // Final flush found no power samples.
    assert_eq!(s.flushes_skipped_total, 1);
}

#[test]
#[should_panic(expected = "non-zero")]
fn test_writer_rejects_zero_interval() {
    let h = Harness::new();
    let _ = Writer::new(h.store.clone(), h.power.clone(), h.weather.clone(), Duration::ZERO);
}
