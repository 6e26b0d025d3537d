// Updates fetched from the external sources. Immutable once published.

use serde::{Deserialize, Serialize};

/// One SolarEdge poll: every site on the account, in API order.
pub type PowerUpdate = Vec<SiteUpdate>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteUpdate {
    pub id: i64,
    pub name: String,
    /// Current output in W.
    pub current_power: f64,
    /// Produced energy in Wh.
    pub day_energy: f64,
    pub month_energy: f64,
    pub year_energy: f64,
    pub lifetime_energy: f64,
    pub inverters: Vec<InverterUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterUpdate {
    pub name: String,
    pub serial_number: String,
    pub telemetry: InverterTelemetry,
}

/// Latest telemetry row reported by an inverter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterTelemetry {
    pub ac_voltage: f64,
    pub ac_current: f64,
    pub dc_voltage: f64,
    pub temperature: f64,
    pub power_limit: f64,
}

/// One Tado weather poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherUpdate {
    /// Outside temperature in °C.
    pub temperature: f64,
    /// Solar intensity, 0-100 %.
    pub solar_intensity: f64,
    /// Tado weather state, e.g. "SUN", "CLOUDY", "RAIN", "UNKNOWN".
    pub weather: String,
}
