// Consolidated record persisted once per successful flush

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub power: f64,
    pub intensity: f64,
    pub weather: String,
}

impl Measurement {
    /// Same measurement moved onto 2023-01-01, keeping the time of day.
    /// Lets reports overlay samples from different days on one axis.
    pub fn fold(&self) -> Measurement {
        let time = self.timestamp.time();
        let timestamp = NaiveDate::from_ymd_opt(2023, 1, 1)
            .map(|day| day.and_time(time).and_utc())
            .unwrap_or(self.timestamp);
        Measurement {
            timestamp,
            ..self.clone()
        }
    }
}
