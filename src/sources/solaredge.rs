// SolarEdge monitoring API: sites, power overview and inverter telemetry

use chrono::{Duration as ChronoDuration, Local};
use futures_util::future::try_join_all;
use serde::Deserialize;
use tracing::instrument;

use super::{SourceError, Updater, check_status, http_client};
use crate::models::{InverterTelemetry, InverterUpdate, PowerUpdate, SiteUpdate};

pub const DEFAULT_BASE_URL: &str = "https://monitoringapi.solaredge.com";

/// Window of inverter telemetry requested per poll; only the latest row is kept.
const TELEMETRY_WINDOW_MINUTES: i64 = 10;

const TELEMETRY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
struct SitesResponse {
    sites: SiteList,
}

#[derive(Debug, Deserialize)]
struct SiteList {
    #[serde(default)]
    site: Vec<Site>,
}

#[derive(Debug, Deserialize)]
struct Site {
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    overview: Overview,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Overview {
    life_time_data: EnergyOverview,
    last_year_data: EnergyOverview,
    last_month_data: EnergyOverview,
    last_day_data: EnergyOverview,
    current_power: CurrentPower,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnergyOverview {
    energy: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CurrentPower {
    power: f64,
}

#[derive(Debug, Deserialize)]
struct EquipmentResponse {
    reporters: Reporters,
}

#[derive(Debug, Deserialize)]
struct Reporters {
    #[serde(default)]
    list: Vec<Inverter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Inverter {
    #[serde(default)]
    name: String,
    serial_number: String,
}

#[derive(Debug, Deserialize)]
struct TelemetryResponse {
    data: TelemetryData,
}

#[derive(Debug, Deserialize)]
struct TelemetryData {
    #[serde(default)]
    telemetries: Vec<Telemetry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Telemetry {
    dc_voltage: f64,
    temperature: f64,
    power_limit: f64,
    #[serde(rename = "L1Data")]
    l1_data: PhaseData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PhaseData {
    ac_current: f64,
    ac_voltage: f64,
}

impl From<Telemetry> for InverterTelemetry {
    fn from(t: Telemetry) -> Self {
        InverterTelemetry {
            ac_voltage: t.l1_data.ac_voltage,
            ac_current: t.l1_data.ac_current,
            dc_voltage: t.dc_voltage,
            temperature: t.temperature,
            power_limit: t.power_limit,
        }
    }
}

pub struct SolarEdgeUpdater {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl SolarEdgeUpdater {
    pub fn new(base_url: &str, token: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("api_key", self.token.as_str())])
            .query(query)
            .send()
            .await?;
        Ok(check_status(resp)?.json::<T>().await?)
    }

    async fn site_update(&self, site: Site) -> Result<SiteUpdate, SourceError> {
        let overview: OverviewResponse =
            self.get(&format!("/site/{}/overview", site.id), &[]).await?;
        let equipment: EquipmentResponse =
            self.get(&format!("/equipment/{}/list", site.id), &[]).await?;

        let inverters = try_join_all(
            equipment
                .reporters
                .list
                .into_iter()
                .map(|inverter| self.inverter_update(site.id, inverter)),
        )
        .await?;

        let o = overview.overview;
        Ok(SiteUpdate {
            id: site.id,
            name: site.name,
            current_power: o.current_power.power,
            day_energy: o.last_day_data.energy,
            month_energy: o.last_month_data.energy,
            year_energy: o.last_year_data.energy,
            lifetime_energy: o.life_time_data.energy,
            inverters,
        })
    }

    async fn inverter_update(
        &self,
        site_id: i64,
        inverter: Inverter,
    ) -> Result<InverterUpdate, SourceError> {
        let end = Local::now();
        let start = end - ChronoDuration::minutes(TELEMETRY_WINDOW_MINUTES);
        let resp: TelemetryResponse = self
            .get(
                &format!("/equipment/{}/{}/data", site_id, inverter.serial_number),
                &[
                    ("startTime", start.format(TELEMETRY_TIME_FORMAT).to_string()),
                    ("endTime", end.format(TELEMETRY_TIME_FORMAT).to_string()),
                ],
            )
            .await?;
        let telemetry = resp
            .data
            .telemetries
            .into_iter()
            .last()
            .map(InverterTelemetry::from)
            .unwrap_or_default();
        Ok(InverterUpdate {
            name: inverter.name,
            serial_number: inverter.serial_number,
            telemetry,
        })
    }
}

impl Updater for SolarEdgeUpdater {
    type Update = PowerUpdate;

    fn source(&self) -> &'static str {
        "solaredge"
    }

    #[instrument(skip(self), fields(source = "solaredge", operation = "get_update"))]
    async fn get_update(&self) -> Result<PowerUpdate, SourceError> {
        let sites: SitesResponse = self.get("/sites/list", &[]).await?;
        let mut update = Vec::with_capacity(sites.sites.site.len());
        for site in sites.sites.site {
            update.push(self.site_update(site).await?);
        }
        Ok(update)
    }
}
