// Tado weather endpoint: outside temperature, solar intensity, weather state.
// Token acquisition (OAuth device flow) happens outside this process.

use serde::Deserialize;
use tracing::instrument;

use super::{SourceError, Updater, check_status, http_client};
use crate::models::WeatherUpdate;

pub const DEFAULT_BASE_URL: &str = "https://my.tado.com/api/v2";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeatherResponse {
    solar_intensity: Option<Percentage>,
    outside_temperature: Option<Temperature>,
    weather_state: Option<WeatherState>,
}

#[derive(Debug, Deserialize)]
struct Percentage {
    percentage: f64,
}

#[derive(Debug, Deserialize)]
struct Temperature {
    celsius: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherState {
    value: String,
}

pub struct TadoUpdater {
    client: reqwest::Client,
    base_url: String,
    token: String,
    home_id: i64,
}

impl TadoUpdater {
    pub fn new(base_url: &str, token: &str, home_id: i64) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            home_id,
        })
    }
}

impl Updater for TadoUpdater {
    type Update = WeatherUpdate;

    fn source(&self) -> &'static str {
        "tado"
    }

    #[instrument(skip(self), fields(source = "tado", operation = "get_update", home_id = self.home_id))]
    async fn get_update(&self) -> Result<WeatherUpdate, SourceError> {
        let resp = self
            .client
            .get(format!("{}/homes/{}/weather", self.base_url, self.home_id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let weather: WeatherResponse = check_status(resp)?.json().await?;

        // Intensity and state make up the measurement; temperature is informational.
        let solar_intensity = weather
            .solar_intensity
            .ok_or(SourceError::MissingField("solarIntensity"))?
            .percentage;
        let state = weather
            .weather_state
            .ok_or(SourceError::MissingField("weatherState"))?
            .value;
        Ok(WeatherUpdate {
            temperature: weather.outside_temperature.map_or(0.0, |t| t.celsius),
            solar_intensity,
            weather: state,
        })
    }
}
