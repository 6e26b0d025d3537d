use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use solar_monitor::*;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use solar_monitor::models::{PowerUpdate, WeatherUpdate};
use solar_monitor::poller::{Poller, PollerHealth};
use solar_monitor::publisher::Publisher;
use solar_monitor::writer::WriterStats;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(name = version::NAME, version = version::VERSION, "starting");

    let repo = Arc::new(
        measurement_repo::MeasurementRepo::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
        )
        .await?,
    );
    repo.init().await?;
    tracing::debug!(path = %app_config.database.path, "connected to database");

    let policy = app_config.polling.delivery_policy();
    let power = Arc::new(Publisher::<PowerUpdate>::new(policy));
    let weather = Arc::new(Publisher::<WeatherUpdate>::new(policy));
    let poll_interval = Duration::from_secs(app_config.polling.interval_secs);

    let solaredge_poller = Poller::new(
        sources::SolarEdgeUpdater::new(
            &app_config.solaredge.base_url,
            &app_config.solaredge.token,
        )?,
        power.clone(),
        poll_interval,
    );
    let tado_poller = Poller::new(
        sources::TadoUpdater::new(
            &app_config.tado.base_url,
            &app_config.tado.token,
            app_config.tado.home_id,
        )?,
        weather.clone(),
        poll_interval,
    );
    let poller_health = vec![solaredge_poller.health(), tado_poller.health()];

    let writer = writer::Writer::new(
        repo,
        power.clone(),
        weather.clone(),
        Duration::from_secs(app_config.writer.interval_secs),
    );
    let writer_stats = writer.stats();

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    exporter::describe_metrics();
    let gauges = Arc::new(exporter::PowerGauges::default());
    let exporter = exporter::Exporter::new(power.clone(), gauges.clone());

    let cancel = CancellationToken::new();

    // Subscribers are registered before the pollers publish for the first time.
    let writer_handle = writer.spawn(cancel.clone());
    let exporter_handle = exporter.spawn(cancel.clone());
    let poller_handles = [
        solaredge_poller.spawn(cancel.clone()),
        tado_poller.spawn(cancel.clone()),
    ];
    let stats_handle = tokio::spawn(log_stats(
        Duration::from_secs(app_config.monitoring.stats_log_interval_secs),
        poller_health.clone(),
        writer_stats.clone(),
        cancel.clone(),
    ));

    let app = routes::app(gauges, poller_health, writer_stats, metrics);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future(),
    );

    shutdown_signal().await;
    tracing::info!("Received shutdown signal");
    cancel.cancel();

    for handle in poller_handles {
        let _ = handle.await;
    }
    let _ = exporter_handle.await;
    let _ = writer_handle.await;
    let _ = stats_handle.await;
    server.await??;

    tracing::info!("stopped");
    Ok(())
}

/// Periodic INFO line with pipeline counters.
async fn log_stats(
    every: Duration,
    pollers: Vec<Arc<PollerHealth>>,
    writer_stats: Arc<WriterStats>,
    cancel: CancellationToken,
) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let stats = writer_stats.snapshot();
                for p in &pollers {
                    tracing::info!(
                        source = p.source(),
                        polls_ok = p.polls_ok(),
                        polls_failed = p.polls_failed(),
                        healthy = p.is_healthy().is_ok(),
                        "poller stats"
                    );
                }
                tracing::info!(
                    measurements_stored_total = stats.measurements_stored_total,
                    flushes_skipped_total = stats.flushes_skipped_total,
                    store_failures_total = stats.store_failures_total,
                    "pipeline stats"
                );
            }
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
