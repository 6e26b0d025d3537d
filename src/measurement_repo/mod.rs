// SQLite measurement store. One row per flush in `solar`; weather states are
// normalised into `weather_ids`. Timestamps are epoch milliseconds (UTC).

mod weather;

use crate::models::Measurement;
use crate::writer::Store;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub struct MeasurementRepo {
    pool: SqlitePool,
}

impl MeasurementRepo {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        weather::init_weather_table(&self.pool).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS solar (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                power REAL NOT NULL,
                intensity REAL NOT NULL,
                weather_id INTEGER NOT NULL REFERENCES weather_ids(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_solar_created_at ON solar(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self, measurement), fields(repo = "measurement", operation = "save_measurement", power = measurement.power))]
    pub async fn save_measurement(&self, measurement: &Measurement) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let weather_id = weather::weather_id(&mut *tx, &measurement.weather).await?;
        sqlx::query(
            "INSERT INTO solar (created_at, power, intensity, weather_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(measurement.timestamp.timestamp_millis())
        .bind(measurement.power)
        .bind(measurement.intensity)
        .bind(weather_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Measurements in [from, to], oldest first.
    #[instrument(skip(self), fields(repo = "measurement", operation = "get_range"))]
    pub async fn get_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Measurement>> {
        let rows = sqlx::query(
            "SELECT s.created_at, s.power, s.intensity, w.weather
             FROM solar s JOIN weather_ids w ON s.weather_id = w.id
             WHERE s.created_at >= $1 AND s.created_at <= $2 ORDER BY s.created_at ASC",
        )
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_measurement_row).collect()
    }

    /// The `limit` most recent measurements, oldest first.
    pub async fn get_recent(&self, limit: u32) -> anyhow::Result<Vec<Measurement>> {
        let rows = sqlx::query(
            "SELECT s.created_at, s.power, s.intensity, w.weather
             FROM solar s JOIN weather_ids w ON s.weather_id = w.id
             ORDER BY s.id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut out = rows
            .iter()
            .map(parse_measurement_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        out.reverse();
        Ok(out)
    }

    /// First and last timestamp stored, or None for an empty table.
    pub async fn get_data_range(&self) -> anyhow::Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let row = sqlx::query("SELECT MIN(created_at) AS first, MAX(created_at) AS last FROM solar")
            .fetch_one(&self.pool)
            .await?;
        let first: Option<i64> = row.try_get("first")?;
        let last: Option<i64> = row.try_get("last")?;
        match (first, last) {
            (Some(first), Some(last)) => Ok(Some((from_millis(first)?, from_millis(last)?))),
            _ => Ok(None),
        }
    }
}

impl Store for MeasurementRepo {
    async fn store(&self, measurement: &Measurement) -> anyhow::Result<()> {
        self.save_measurement(measurement).await
    }
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", ms))
}

fn parse_measurement_row(row: &SqliteRow) -> anyhow::Result<Measurement> {
    let created_at: i64 = row.try_get("created_at")?;
    Ok(Measurement {
        timestamp: from_millis(created_at)?,
        power: row.try_get("power")?,
        intensity: row.try_get("intensity")?,
        weather: row.try_get("weather")?,
    })
}
