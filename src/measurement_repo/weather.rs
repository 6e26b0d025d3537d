// Weather states are stored once in weather_ids and referenced by id.

use sqlx::{Sqlite, SqliteConnection, SqlitePool};

pub(super) async fn init_weather_table(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS weather_ids (id INTEGER PRIMARY KEY AUTOINCREMENT, weather TEXT NOT NULL UNIQUE)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Id of `weather`, defining it on first use.
pub(super) async fn weather_id(conn: &mut SqliteConnection, weather: &str) -> anyhow::Result<i64> {
    let inserted = sqlx::query::<Sqlite>("INSERT OR IGNORE INTO weather_ids (weather) VALUES ($1)")
        .bind(weather)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if inserted > 0 {
        tracing::debug!(weather, "defined new weather type");
    }
    let id: i64 = sqlx::query_scalar("SELECT id FROM weather_ids WHERE weather = $1")
        .bind(weather)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}
