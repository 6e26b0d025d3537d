// Second subscriber of the power stream: keeps the latest per-site and
// per-inverter readings for GET /api/power and sets the solaredge_* gauges
// rendered on GET /metrics.

use metrics::{describe_gauge, gauge};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

use crate::models::{PowerUpdate, SiteUpdate};
use crate::publisher::{Publisher, Subscription};

/// Registers help text for the gauges set by [`PowerGauges::export`].
/// Call once after the recorder is installed.
pub fn describe_metrics() {
    describe_gauge!("solaredge_current_power", "current power in Watt");
    describe_gauge!("solaredge_day_energy", "Today's produced energy in WattHours");
    describe_gauge!("solaredge_month_energy", "This month's produced energy in WattHours");
    describe_gauge!("solaredge_year_energy", "This year's produced energy in WattHours");
    describe_gauge!("solaredge_inverter_temperature", "Temperature reported by the inverter(s)");
    describe_gauge!("solaredge_inverter_ac_voltage", "AC voltage reported by the inverter(s)");
    describe_gauge!("solaredge_inverter_ac_current", "AC current reported by the inverter(s)");
    describe_gauge!("solaredge_inverter_dc_voltage", "DC voltage reported by the inverter(s)");
    describe_gauge!("solaredge_inverter_power_limit", "Power limit reported by the inverter(s)");
}

fn record_site_metrics(site: &SiteUpdate) {
    let name = site.name.clone();
    gauge!("solaredge_current_power", "site" => name.clone()).set(site.current_power);
    gauge!("solaredge_day_energy", "site" => name.clone()).set(site.day_energy);
    gauge!("solaredge_month_energy", "site" => name.clone()).set(site.month_energy);
    gauge!("solaredge_year_energy", "site" => name.clone()).set(site.year_energy);

    for inverter in &site.inverters {
        let t = &inverter.telemetry;
        let inverter_gauge = |metric: &'static str| {
            gauge!(metric, "site" => name.clone(), "inverter" => inverter.name.clone())
        };
        inverter_gauge("solaredge_inverter_temperature").set(t.temperature);
        inverter_gauge("solaredge_inverter_ac_voltage").set(t.ac_voltage);
        inverter_gauge("solaredge_inverter_ac_current").set(t.ac_current);
        inverter_gauge("solaredge_inverter_dc_voltage").set(t.dc_voltage);
        inverter_gauge("solaredge_inverter_power_limit").set(t.power_limit);
    }
}

/// Latest site readings keyed by site name.
#[derive(Debug, Default)]
pub struct PowerGauges {
    sites: RwLock<BTreeMap<String, SiteUpdate>>,
}

impl PowerGauges {
    pub fn snapshot(&self) -> Vec<SiteUpdate> {
        self.sites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn export(&self, update: &PowerUpdate) {
        let mut sites = self.sites.write().unwrap_or_else(PoisonError::into_inner);
        for site in update {
            record_site_metrics(site);
            sites.insert(site.name.clone(), site.clone());
        }
    }
}

pub struct Exporter {
    power: Arc<Publisher<PowerUpdate>>,
    rx: Subscription<PowerUpdate>,
    gauges: Arc<PowerGauges>,
}

impl Exporter {
    pub fn new(power: Arc<Publisher<PowerUpdate>>, gauges: Arc<PowerGauges>) -> Self {
        let rx = power.subscribe();
        Self { power, rx, gauges }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!("starting exporter");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(update) = self.rx.recv() => {
                    self.gauges.export(&update);
                    tracing::debug!(sites = update.len(), "exported power update");
                }
            }
        }
        self.power.unsubscribe(&self.rx);
        tracing::debug!("exporter stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
