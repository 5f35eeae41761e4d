use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::{ReadingStore, SortOrder};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::models::{partition_key, Reading, SensorValues};

// ---

/// Store backed by a PostgreSQL table keyed by `(date, timestamp_device)`.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
    table: String,
}

/// Row shape as stored; `date` is kept as the `YYYY-MM-DD` partition string.
#[derive(Debug, sqlx::FromRow)]
struct ReadingRow {
    // ---
    date: String,
    timestamp_device: String,
    device_id: String,
    device_name: String,
    timestamp: i64,
    readable_time: String,
    temperature_celsius: Option<f64>,
    humidity_percent: Option<f64>,
    weather_description: Option<String>,
    feels_like_celsius: Option<f64>,
    pressure_hpa: Option<f64>,
    uv_index: Option<f64>,
    wind_speed_ms: Option<f64>,
    expires_at: Option<i64>,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = Error;

    fn try_from(row: ReadingRow) -> Result<Self> {
        // ---
        let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|e| Error::Decode {
            service: "store",
            message: format!("bad partition key '{}': {e}", row.date),
        })?;

        Ok(Reading {
            date,
            timestamp_device: row.timestamp_device,
            device_id: row.device_id,
            device_name: row.device_name,
            timestamp: row.timestamp,
            readable_time: row.readable_time,
            values: SensorValues {
                temperature_celsius: row.temperature_celsius,
                humidity_percent: row.humidity_percent,
                weather_description: row.weather_description,
                feels_like_celsius: row.feels_like_celsius,
                pressure_hpa: row.pressure_hpa,
                uv_index: row.uv_index,
                wind_speed_ms: row.wind_speed_ms,
            },
            expires_at: row.expires_at,
        })
    }
}

impl PgReadingStore {
    /// Connect using an explicit store configuration.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self> {
        // ---
        let mut options = PgConnectOptions::from_str(&cfg.endpoint)?
            .application_name(&format!("thermolog-{}", cfg.region));
        if let Some(creds) = &cfg.credentials {
            options = options.username(&creds.username).password(&creds.password);
        }

        tracing::info!(endpoint = %cfg.endpoint, table = %cfg.table, "Connecting to store");

        let pool = PgPoolOptions::new()
            .max_connections(cfg.pool_max)
            .connect_with(options)
            .await?;

        tracing::info!("Successfully connected to store");
        Ok(Self::from_pool(pool, &cfg.table))
    }

    pub fn from_pool(pool: PgPool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn query_partition(&self, date: NaiveDate, order: SortOrder) -> Result<Vec<Reading>> {
        // ---
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let sql = format!(
            r#"
            SELECT date, timestamp_device, device_id, device_name, timestamp, readable_time,
                   temperature_celsius, humidity_percent, weather_description,
                   feels_like_celsius, pressure_hpa, uv_index, wind_speed_ms, expires_at
              FROM {table}
             WHERE date = $1
               AND (expires_at IS NULL OR expires_at > $2)
             ORDER BY timestamp_device {direction}
            "#,
            table = self.table,
        );

        let rows: Vec<ReadingRow> = sqlx::query_as(&sql)
            .bind(partition_key(date))
            .bind(Utc::now().timestamp())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Reading::try_from).collect()
    }

    async fn put_batch(&self, readings: &[Reading]) -> Result<()> {
        // ---
        let sql = format!(
            r#"
            INSERT INTO {table} (
                date, timestamp_device, device_id, device_name, timestamp, readable_time,
                temperature_celsius, humidity_percent, weather_description,
                feels_like_celsius, pressure_hpa, uv_index, wind_speed_ms, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (date, timestamp_device) DO UPDATE SET
                device_id           = EXCLUDED.device_id,
                device_name         = EXCLUDED.device_name,
                timestamp           = EXCLUDED.timestamp,
                readable_time       = EXCLUDED.readable_time,
                temperature_celsius = EXCLUDED.temperature_celsius,
                humidity_percent    = EXCLUDED.humidity_percent,
                weather_description = EXCLUDED.weather_description,
                feels_like_celsius  = EXCLUDED.feels_like_celsius,
                pressure_hpa        = EXCLUDED.pressure_hpa,
                uv_index            = EXCLUDED.uv_index,
                wind_speed_ms       = EXCLUDED.wind_speed_ms,
                expires_at          = EXCLUDED.expires_at
            "#,
            table = self.table,
        );

        let mut tx = self.pool.begin().await?;
        for reading in readings {
            let values = &reading.values;
            sqlx::query(&sql)
                .bind(reading.partition_key())
                .bind(&reading.timestamp_device)
                .bind(&reading.device_id)
                .bind(&reading.device_name)
                .bind(reading.timestamp)
                .bind(&reading.readable_time)
                .bind(values.temperature_celsius)
                .bind(values.humidity_percent)
                .bind(&values.weather_description)
                .bind(values.feels_like_celsius)
                .bind(values.pressure_hpa)
                .bind(values.uv_index)
                .bind(values.wind_speed_ms)
                .bind(reading.expires_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        // ---
        let sql = format!(
            "DELETE FROM {table} WHERE expires_at IS NOT NULL AND expires_at <= $1",
            table = self.table,
        );
        let result = sqlx::query(&sql).bind(now).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
