// Domain models: source updates (producer side) and persisted measurements

mod measurement;
mod update;

pub use measurement::Measurement;
pub use update::{InverterTelemetry, InverterUpdate, PowerUpdate, SiteUpdate, WeatherUpdate};
