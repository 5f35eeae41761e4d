//! Shared HTTP plumbing for the vendor APIs.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// How much of an error body is kept in log lines and error messages.
const BODY_PREVIEW_CHARS: usize = 500;

/// Build the client used for every outbound call.
///
/// Every request carries the configured timeout so a hung upstream cannot
/// stall an invocation indefinitely.
pub fn build_client(cfg: &HttpConfig) -> Result<Client> {
    // ---
    Client::builder()
        .timeout(cfg.timeout)
        .connect_timeout(cfg.timeout.min(std::time::Duration::from_secs(10)))
        .user_agent(concat!("thermolog/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::Http)
}

/// Decode a JSON body, turning non-2xx statuses into [`Error::Upstream`].
pub async fn json_or_error<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T> {
    // ---
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Upstream {
            service,
            status,
            body: preview(&body),
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(
            error = %e,
            body_preview = %preview(&text),
            "Failed to parse {service} response"
        );
        Error::Decode {
            service,
            message: e.to_string(),
        }
    })
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
