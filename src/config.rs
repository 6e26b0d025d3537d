use serde::Deserialize;

use crate::publisher::DeliveryPolicy;
use crate::sources::{SOLAREDGE_BASE_URL, TADO_BASE_URL};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub polling: PollingConfig,
    pub writer: WriterConfig,
    pub solaredge: SolarEdgeConfig,
    pub tado: TadoConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

fn default_max_pool_size() -> u32 {
    4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Blocking,
    Detached,
    Buffered,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Seconds between two polls of the same source.
    #[serde(default = "default_polling_interval_secs")]
    pub interval_secs: u64,
    /// How the pollers fan out to subscribers (blocking, detached, buffered).
    #[serde(default)]
    pub delivery: DeliveryMode,
    /// Per-subscriber queue size; only used by `buffered`.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_polling_interval_secs() -> u64 {
    300
}

fn default_buffer_capacity() -> usize {
    16
}

impl PollingConfig {
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        match self.delivery {
            DeliveryMode::Blocking => DeliveryPolicy::Blocking,
            DeliveryMode::Detached => DeliveryPolicy::Detached,
            DeliveryMode::Buffered => DeliveryPolicy::Buffered {
                capacity: self.buffer_capacity,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Seconds between two flushes (one measurement at most per flush).
    #[serde(default = "default_writer_interval_secs")]
    pub interval_secs: u64,
}

fn default_writer_interval_secs() -> u64 {
    900
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolarEdgeConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_solaredge_base_url")]
    pub base_url: String,
}

fn default_solaredge_base_url() -> String {
    SOLAREDGE_BASE_URL.into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TadoConfig {
    #[serde(default)]
    pub token: String,
    pub home_id: i64,
    #[serde(default = "default_tado_base_url")]
    pub base_url: String,
}

fn default_tado_base_url() -> String {
    TADO_BASE_URL.into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// How often to log pipeline stats at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

fn default_stats_log_interval_secs() -> u64 {
    3600
}

impl AppConfig {
    /// Reads `CONFIG_FILE` (default `config.toml`). `SOLAREDGE_TOKEN` and
    /// `TADO_TOKEN` override the tokens from the file.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        let mut config: AppConfig = toml::from_str(&s)?;
        if let Ok(token) = std::env::var("SOLAREDGE_TOKEN") {
            config.solaredge.token = token;
        }
        if let Ok(token) = std::env::var("TADO_TOKEN") {
            config.tado.token = token;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.polling.interval_secs > 0,
            "polling.interval_secs must be > 0, got {}",
            self.polling.interval_secs
        );
        anyhow::ensure!(
            self.polling.delivery != DeliveryMode::Buffered || self.polling.buffer_capacity > 0,
            "polling.buffer_capacity must be > 0 for buffered delivery, got {}",
            self.polling.buffer_capacity
        );
        anyhow::ensure!(
            self.writer.interval_secs > 0,
            "writer.interval_secs must be > 0, got {}",
            self.writer.interval_secs
        );
        anyhow::ensure!(
            !self.solaredge.token.is_empty(),
            "solaredge.token must be non-empty (or set SOLAREDGE_TOKEN)"
        );
        anyhow::ensure!(
            !self.tado.token.is_empty(),
            "tado.token must be non-empty (or set TADO_TOKEN)"
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}
