//! Reading collection and the top-level polling entry point.
//!
//! One invocation lists the devices, reads each device's traits, reads the
//! outdoor conditions once, stamps every record with the same capture instant
//! and saves the batch. The device path and the weather path fail
//! independently: whichever succeeds is still saved.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::models::{Reading, OUTDOOR_DEVICE_ID};
use crate::nest::NestClient;
use crate::retry::RetryPolicy;
use crate::store::{save_readings, PgReadingStore, ReadingStore};
use crate::weather::WeatherClient;

// ---

/// A source that could not be read during one collection.
#[derive(Debug)]
pub struct SourceFailure {
    /// `devices`, `device <id>` or `weather`.
    pub source: String,
    pub error: Error,
}

/// Everything gathered by one collection pass.
#[derive(Debug, Default)]
pub struct Collection {
    pub readings: Vec<Reading>,
    pub failures: Vec<SourceFailure>,
}

/// Result of a poll whose body ran to completion.
#[derive(Debug, Default)]
pub struct PollReport {
    pub readings: Vec<Reading>,
    pub saved: usize,
    pub failures: Vec<SourceFailure>,
}

/// Structured response of the polling entry point.
#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl PollOutcome {
    fn success(report: &PollReport) -> Self {
        // ---
        let mut body = json!({
            "message": format!("Successfully processed {} readings", report.saved),
            "readings": report.readings,
        });
        if !report.failures.is_empty() {
            body["errors"] = failures_json(&report.failures);
        }
        Self {
            status_code: 200,
            body,
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            status_code: 500,
            body: json!({ "error": message }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

fn failures_json(failures: &[SourceFailure]) -> serde_json::Value {
    failures
        .iter()
        .map(|f| json!({ "source": f.source, "error": f.error.to_string() }))
        .collect()
}

/// Read every device once. Devices without any trait data produce no record.
///
/// Failing to list devices fails the whole device path; a single device that
/// cannot be read is recorded and skipped.
pub async fn collect_device_readings(
    nest: &NestClient,
    captured_at: DateTime<Utc>,
    collection: &mut Collection,
) -> Result<()> {
    // ---
    let devices = nest.list_devices().await?;
    if devices.is_empty() {
        tracing::info!("No devices found");
    }

    for device in devices {
        match nest.sensor_values(&device.name).await {
            Ok(values) if values.is_empty() => {
                tracing::debug!(device = %device.name, "Device reported no sensor data");
            }
            Ok(values) => {
                let reading = Reading::new(
                    captured_at,
                    device.name.as_str(),
                    device.short_id(),
                    device.display_name(),
                    values,
                );
                tracing::debug!(device = %reading.device_name, "Collected device reading");
                collection.readings.push(reading);
            }
            Err(e) => {
                tracing::warn!(device = %device.name, error = %e, "Failed to read device");
                collection.failures.push(SourceFailure {
                    source: format!("device {}", device.short_id()),
                    error: e,
                });
            }
        }
    }
    Ok(())
}

/// Outdoor record for the current conditions, if the API returned any data.
pub async fn collect_weather_reading(
    weather: &WeatherClient,
    captured_at: DateTime<Utc>,
) -> Result<Option<Reading>> {
    // ---
    let values = weather.current_conditions().await?;
    if values.is_empty() {
        tracing::info!("Weather API returned no current conditions");
        return Ok(None);
    }

    Ok(Some(Reading::new(
        captured_at,
        OUTDOOR_DEVICE_ID,
        OUTDOOR_DEVICE_ID,
        weather.label(),
        values,
    )))
}

/// Gather device and weather readings; the two paths fail independently.
pub async fn collect(
    nest: &NestClient,
    weather: Option<&WeatherClient>,
    captured_at: DateTime<Utc>,
) -> Collection {
    // ---
    let mut collection = Collection::default();

    if let Err(e) = collect_device_readings(nest, captured_at, &mut collection).await {
        tracing::error!(error = %e, "Device readings unavailable");
        collection.failures.push(SourceFailure {
            source: "devices".to_string(),
            error: e,
        });
    }

    if let Some(weather) = weather {
        match collect_weather_reading(weather, captured_at).await {
            Ok(Some(reading)) => collection.readings.push(reading),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Weather reading unavailable");
                collection.failures.push(SourceFailure {
                    source: "weather".to_string(),
                    error: e,
                });
            }
        }
    }

    collection
}

/// Collect and persist one batch of readings captured at `captured_at`.
pub async fn poll(
    config: &Config,
    store: &dyn ReadingStore,
    captured_at: DateTime<Utc>,
) -> Result<PollReport> {
    // ---
    let nest = NestClient::new(&config.nest, &config.http)?;
    let weather = config
        .weather
        .as_ref()
        .map(|w| WeatherClient::new(w, &config.http))
        .transpose()?;

    let Collection {
        mut readings,
        failures,
    } = collect(&nest, weather.as_ref(), captured_at).await;

    if let Some(days) = config.ttl_days {
        readings = readings.into_iter().map(|r| r.with_ttl_days(days)).collect();
    }

    if readings.is_empty() {
        tracing::info!("No readings to save");
        return Ok(PollReport {
            readings,
            saved: 0,
            failures,
        });
    }

    let saved = save_readings(store, &readings, RetryPolicy::from_http(&config.http)).await?;
    tracing::info!("Saved {} sensor readings", saved);

    if config.ttl_days.is_some() {
        match store.purge_expired(captured_at.timestamp()).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Purged expired readings"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired readings"),
        }
    }

    Ok(PollReport {
        readings,
        saved,
        failures,
    })
}

/// Run one poll and convert every outcome into a structured response.
///
/// A poll that gathered nothing while some source failed is a failure; a
/// poll that saved readings reports the failed sources alongside them.
pub async fn handle_poll(config: &Config, store: &dyn ReadingStore) -> PollOutcome {
    // ---
    match poll(config, store, Utc::now()).await {
        Ok(report) if report.readings.is_empty() && !report.failures.is_empty() => {
            let message = report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.source, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            tracing::error!("Error in poll: {}", message);
            PollOutcome::failure(&message)
        }
        Ok(report) => PollOutcome::success(&report),
        Err(e) => {
            tracing::error!("Error in poll: {}", e);
            PollOutcome::failure(&e.to_string())
        }
    }
}

/// Polling entry point: load configuration, connect the store and poll.
///
/// Never fails and never panics into its caller; every problem, including a
/// panic inside the poll, becomes a 500 outcome.
pub async fn poll_from_env() -> PollOutcome {
    // ---
    match tokio::spawn(poll_from_env_inner()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Poll task aborted");
            PollOutcome::failure(&format!("poll task aborted: {e}"))
        }
    }
}

async fn poll_from_env_inner() -> PollOutcome {
    // ---
    let config = match config::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Error in poll: {}", e);
            return PollOutcome::failure(&Error::from(e).to_string());
        }
    };
    config.log_config();

    let store = match PgReadingStore::connect(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Error in poll: {}", e);
            return PollOutcome::failure(&e.to_string());
        }
    };

    handle_poll(&config, &store).await
}
