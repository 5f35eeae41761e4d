//! Outdoor conditions from the OpenWeather One Call API.

use reqwest::Client;
use serde::Deserialize;

use crate::config::{HttpConfig, WeatherConfig};
use crate::error::Result;
use crate::http::{build_client, json_or_error};
use crate::models::SensorValues;
use crate::retry::{with_retry, RetryPolicy};

const SERVICE: &str = "weather API";

// ---

#[derive(Debug, Default, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    current: Option<CurrentConditions>,
}

/// The `current` block; every field may be missing.
#[derive(Debug, Default, Deserialize)]
struct CurrentConditions {
    // ---
    temp: Option<f64>,
    humidity: Option<f64>,
    feels_like: Option<f64>,
    pressure: Option<f64>,
    uvi: Option<f64>,
    wind_speed: Option<f64>,

    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Default, Deserialize)]
struct Condition {
    description: Option<String>,
}

impl From<CurrentConditions> for SensorValues {
    fn from(current: CurrentConditions) -> Self {
        SensorValues {
            temperature_celsius: current.temp,
            humidity_percent: current.humidity,
            weather_description: current.weather.into_iter().next().and_then(|c| c.description),
            feels_like_celsius: current.feels_like,
            pressure_hpa: current.pressure,
            uv_index: current.uvi,
            wind_speed_ms: current.wind_speed,
        }
    }
}

/// Client for current outdoor conditions at one location.
#[derive(Debug)]
pub struct WeatherClient {
    http: Client,
    cfg: WeatherConfig,
    retry: RetryPolicy,
}

impl WeatherClient {
    pub fn new(cfg: &WeatherConfig, http_cfg: &HttpConfig) -> Result<Self> {
        Ok(Self {
            http: build_client(http_cfg)?,
            cfg: cfg.clone(),
            retry: RetryPolicy::from_http(http_cfg),
        })
    }

    /// Name stored on outdoor records.
    pub fn label(&self) -> &str {
        &self.cfg.label
    }

    /// Current conditions in metric units.
    ///
    /// Fields the API leaves out stay empty; a response without a `current`
    /// block yields empty values.
    pub async fn current_conditions(&self) -> Result<SensorValues> {
        // ---
        let url = format!("{}/onecall", self.cfg.api_base.trim_end_matches('/'));
        let lat = self.cfg.lat.to_string();
        let lon = self.cfg.lon.to_string();
        let query = [
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
            ("appid", self.cfg.api_key.as_str()),
            ("units", "metric"),
            ("exclude", "minutely,hourly,daily,alerts"),
        ];
        let (url, query) = (&url, &query);

        tracing::debug!(%url, lat = self.cfg.lat, lon = self.cfg.lon, "Fetching weather");

        let response: OneCallResponse = with_retry(self.retry, "weather request", || async move {
            let response = self.http.get(url).query(query).send().await?;
            json_or_error(SERVICE, response).await
        })
        .await?;

        Ok(response.current.map(SensorValues::from).unwrap_or_default())
    }
}
