use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::auth::TokenProvider;
use super::models::{Device, DevicesResponse};
use crate::config::{HttpConfig, NestConfig};
use crate::error::{Error, Result};
use crate::http::{build_client, json_or_error};
use crate::models::SensorValues;
use crate::retry::{with_retry, RetryPolicy};

const SERVICE: &str = "device API";

/// Client for the device API of one device-access project.
#[derive(Debug)]
pub struct NestClient {
    http: Client,
    base_url: String,
    project_id: String,
    tokens: TokenProvider,
    retry: RetryPolicy,
}

impl NestClient {
    pub fn new(cfg: &NestConfig, http_cfg: &HttpConfig) -> Result<Self> {
        // ---
        let http = build_client(http_cfg)?;
        let retry = RetryPolicy::from_http(http_cfg);

        Ok(Self {
            tokens: TokenProvider::new(http.clone(), cfg, retry),
            http,
            base_url: cfg.api_base.trim_end_matches('/').to_string(),
            project_id: cfg.project_id.clone(),
            retry,
        })
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    /// All devices of the project. A project without devices is not an error.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        // ---
        let url = format!("{}/enterprises/{}/devices", self.base_url, self.project_id);
        let response: DevicesResponse = self.get_json(&url).await?;

        tracing::debug!(count = response.devices.len(), "Listed devices");
        Ok(response.devices)
    }

    /// Current trait values of the device with resource name `device_name`.
    pub async fn sensor_values(&self, device_name: &str) -> Result<SensorValues> {
        // ---
        let url = format!("{}/{}", self.base_url, device_name.trim_start_matches('/'));
        let device: Device = self.get_json(&url).await?;
        Ok(device.sensor_values())
    }

    /// GET `url` as JSON, refreshing the token once if the API rejects it.
    ///
    /// A 401 from the device API drops the cached token and repeats the
    /// request once with a fresh one.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        // ---
        match self.get_json_authorized(url).await {
            Err(Error::Upstream {
                service: SERVICE,
                status,
                ..
            }) if status == StatusCode::UNAUTHORIZED => {
                tracing::warn!(url, "Access token rejected, refreshing");
                self.tokens.invalidate().await;
                self.get_json_authorized(url).await
            }
            other => other,
        }
    }

    /// The token is fetched before the retry loop; token refresh retries
    /// on its own.
    async fn get_json_authorized<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        // ---
        let token = self.tokens.get_valid_token().await?;
        let token = token.as_str();

        with_retry(self.retry, "device API request", || async move {
            let response = self.http.get(url).bearer_auth(token).send().await?;
            json_or_error(SERVICE, response).await
        })
        .await
    }
}
