//! Store schema management for `thermolog`.
//!
//! Ensures the readings table and its index exist. Run by `thermolog
//! init-store` when bootstrapping a local or fresh store.

use sqlx::PgPool;

use crate::error::Result;

// ---

/// Create the readings table if it does not exist (idempotent).
///
/// The composite primary key mirrors the partitioned layout: `date` is the
/// partition key, `timestamp_device` the sort key within it. Safe to call
/// repeatedly; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool, table: &str) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            date                TEXT             NOT NULL,
            timestamp_device    TEXT             NOT NULL,
            device_id           TEXT             NOT NULL,
            device_name         TEXT             NOT NULL,
            timestamp           BIGINT           NOT NULL,
            readable_time       TEXT             NOT NULL,
            temperature_celsius DOUBLE PRECISION,
            humidity_percent    DOUBLE PRECISION,
            weather_description TEXT,
            feels_like_celsius  DOUBLE PRECISION,
            pressure_hpa        DOUBLE PRECISION,
            uv_index            DOUBLE PRECISION,
            wind_speed_ms       DOUBLE PRECISION,
            expires_at          BIGINT,
            PRIMARY KEY (date, timestamp_device)
        );
        "#
    ))
    .execute(&mut *tx)
    .await?;

    // Expiry sweeps only touch rows that carry a TTL
    sqlx::query(&format!(
        r#"
        CREATE INDEX IF NOT EXISTS {table}_expires_at_idx
            ON {table} (expires_at)
            WHERE expires_at IS NOT NULL;
        "#
    ))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(table, "Store schema ready");
    Ok(())
}
