use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::NestConfig;
use crate::error::Result;
use crate::http::json_or_error;
use crate::retry::{with_retry, RetryPolicy};

const SERVICE: &str = "token service";

/// Lifetime assumed when the token service omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Token endpoint response for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Only returned by the authorization-code grant.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid_at(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

/// Holder of the bearer credential for the device API.
///
/// The access token is cached together with its expiry and transparently
/// refreshed from the long-lived refresh token when it runs out.
#[derive(Debug)]
pub struct TokenProvider {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    retry: RetryPolicy,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: Client, cfg: &NestConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            token_url: cfg.token_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            refresh_token: cfg.refresh_token.clone(),
            retry,
            cached: Mutex::new(None),
        }
    }

    /// A bearer token with some life left, refreshing it when needed.
    ///
    /// Any non-2xx answer from the token service is returned as an error.
    pub async fn get_valid_token(&self) -> Result<String> {
        // ---
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(Instant::now())) {
            return Ok(token.access_token.clone());
        }

        tracing::debug!("Refreshing access token");
        let response = self.refresh().await?;
        let lifetime = response
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);

        let token = CachedToken {
            access_token: response.access_token,
            expires_at: Instant::now() + lifetime,
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);

        tracing::info!(expires_in_secs = lifetime.as_secs(), "Access token refreshed");
        Ok(access_token)
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<TokenResponse> {
        // ---
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let form = &form;

        with_retry(self.retry, "token refresh", || async move {
            let response = self.http.post(&self.token_url).form(form).send().await?;
            json_or_error(SERVICE, response).await
        })
        .await
    }
}

/// Exchange a one-time authorization code for access and refresh tokens.
pub async fn exchange_authorization_code(
    http: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    // ---
    let form = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", redirect_uri),
    ];
    let response = http.post(token_url).form(&form).send().await?;
    json_or_error(SERVICE, response).await
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_cached_token_validity_margin() {
        // ---
        let now = Instant::now();
        let fresh = CachedToken {
            access_token: "a".into(),
            expires_at: now + Duration::from_secs(3600),
        };
        assert!(fresh.is_valid_at(now));

        let nearly_expired = CachedToken {
            access_token: "a".into(),
            expires_at: now + Duration::from_secs(30),
        };
        assert!(!nearly_expired.is_valid_at(now));
    }

    #[test]
    fn test_token_response_optional_fields() {
        // ---
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token":"ya29.abc"}"#).unwrap();
        assert_eq!(resp.access_token, "ya29.abc");
        assert!(resp.expires_in.is_none());
        assert!(resp.refresh_token.is_none());
    }

    #[test]
    fn test_token_response_ignores_extra_fields() {
        // ---
        let body = r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer","scope":"sdm"}"#;
        let resp: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.expires_in, Some(3599));
    }
}
