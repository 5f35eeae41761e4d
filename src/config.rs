//! Configuration loader for `thermolog`.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
//! Each subcommand only loads the sections it needs: charting never asks for
//! vendor credentials, and the connection check never asks for a store.
use std::env;
use std::time::Duration;

/// Default device API base URL.
pub const NEST_API_BASE: &str = "https://smartdevicemanagement.googleapis.com/v1";

/// Default OAuth token endpoint.
pub const NEST_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";

/// Default outdoor-weather API base URL.
pub const OPENWEATHER_API_BASE: &str = "https://api.openweathermap.org/data/3.0";

/// Endpoint used when `LOCAL_STORE=true`.
const LOCAL_STORE_ENDPOINT: &str = "postgres://localhost:5432/thermolog";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in .env or environment")]
    Missing(&'static str),

    #[error("Invalid {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Parse an optional environment variable with a default value.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| ConfigError::Invalid {
                name: $var_name,
                message: e.to_string(),
            })?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .filter(|v: &String| !v.trim().is_empty())
            .ok_or(ConfigError::Missing($var_name))?
    };
}

// ---

/// OAuth client and device-access project identifiers.
#[derive(Debug, Clone)]
pub struct NestConfig {
    // ---
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub project_id: String,

    /// Device API base URL.
    pub api_base: String,

    /// Token exchange endpoint.
    pub token_url: String,
}

/// Outdoor-weather collaborator settings. Absent when augmentation is off.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    // ---
    pub api_key: String,
    pub lat: f64,
    pub lon: f64,

    /// Human-readable name stored as `device_name` on outdoor records.
    pub label: String,

    pub api_base: String,
}

/// Credentials presented to the store.
#[derive(Clone)]
pub struct StoreCredentials {
    // ---
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Store connection settings, injected into the store client constructor.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // ---
    /// Connection URL of the store, without credentials.
    pub endpoint: String,

    /// Deployment region label. Reported to the server as the application name.
    pub region: String,

    pub credentials: Option<StoreCredentials>,

    /// Table holding the readings.
    pub table: String,

    /// Maximum number of pooled connections.
    pub pool_max: u32,
}

/// Outbound HTTP hardening: request timeout and bounded retries.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    // ---
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Strongly typed configuration for the polling entry point.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    pub nest: NestConfig,

    /// `None` turns weather augmentation off.
    pub weather: Option<WeatherConfig>,

    pub store: StoreConfig,

    pub http: HttpConfig,

    /// Days until a stored reading expires. `None` turns TTL off.
    pub ttl_days: Option<u32>,
}

/// Load the polling configuration from environment variables.
///
/// Required:
/// - `NEST_CLIENT_ID`, `NEST_CLIENT_SECRET`, `NEST_REFRESH_TOKEN`, `NEST_PROJECT_ID`
/// - `STORE_ENDPOINT` (unless `LOCAL_STORE=true`)
///
/// Optional:
/// - `OPENWEATHER_API_KEY` – enables weather augmentation
/// - `WEATHER_ENABLED` – set to `false` to skip weather even with a key
/// - `READING_TTL_DAYS` – expire readings after this many days (0 disables)
/// - `HTTP_TIMEOUT_SECS`, `HTTP_MAX_RETRIES`, `HTTP_RETRY_BASE_MS`
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config, ConfigError> {
    // ---
    from_lookup(env_lookup)
}

/// Load only the store section from environment variables.
pub fn load_store_from_env() -> Result<StoreConfig, ConfigError> {
    store_from_lookup(env_lookup)
}

/// Load only the vendor credentials and HTTP settings from environment variables.
pub fn load_nest_from_env() -> Result<(NestConfig, HttpConfig), ConfigError> {
    Ok((nest_from_lookup(env_lookup)?, http_from_lookup(env_lookup)?))
}

/// Token endpoint and HTTP settings for the interactive authorization flow,
/// which runs before any vendor credentials exist.
pub fn load_token_endpoint_from_env() -> Result<(String, HttpConfig), ConfigError> {
    let token_url = env_lookup("NEST_TOKEN_URL").unwrap_or_else(|| NEST_TOKEN_URL.to_string());
    Ok((token_url, http_from_lookup(env_lookup)?))
}

fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Build a [`Config`] from an arbitrary variable source.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let nest = nest_from_lookup(&lookup)?;
    let weather = weather_from_lookup(&lookup)?;
    let store = store_from_lookup(&lookup)?;
    let http = http_from_lookup(&lookup)?;
    let ttl_days = parse_env!(lookup, "READING_TTL_DAYS", u32, 0);

    Ok(Config {
        nest,
        weather,
        store,
        http,
        ttl_days: (ttl_days > 0).then_some(ttl_days),
    })
}

fn nest_from_lookup<F>(lookup: F) -> Result<NestConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    Ok(NestConfig {
        client_id: require_env!(lookup, "NEST_CLIENT_ID"),
        client_secret: require_env!(lookup, "NEST_CLIENT_SECRET"),
        refresh_token: require_env!(lookup, "NEST_REFRESH_TOKEN"),
        project_id: require_env!(lookup, "NEST_PROJECT_ID"),
        api_base: lookup("NEST_API_BASE").unwrap_or_else(|| NEST_API_BASE.to_string()),
        token_url: lookup("NEST_TOKEN_URL").unwrap_or_else(|| NEST_TOKEN_URL.to_string()),
    })
}

fn weather_from_lookup<F>(lookup: F) -> Result<Option<WeatherConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let enabled = parse_env!(lookup, "WEATHER_ENABLED", bool, true);
    let api_key = lookup("OPENWEATHER_API_KEY").filter(|k| !k.trim().is_empty());

    let Some(api_key) = api_key.filter(|_| enabled) else {
        return Ok(None);
    };

    Ok(Some(WeatherConfig {
        api_key,
        lat: parse_env!(lookup, "WEATHER_LAT", f64, 42.3601),
        lon: parse_env!(lookup, "WEATHER_LON", f64, -71.0589),
        label: lookup("WEATHER_LABEL").unwrap_or_else(|| "Boston, MA (OpenWeather)".to_string()),
        api_base: lookup("OPENWEATHER_API_BASE")
            .unwrap_or_else(|| OPENWEATHER_API_BASE.to_string()),
    }))
}

fn store_from_lookup<F>(lookup: F) -> Result<StoreConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let local = parse_env!(lookup, "LOCAL_STORE", bool, false);

    let (endpoint, region, credentials) = if local {
        (
            LOCAL_STORE_ENDPOINT.to_string(),
            "local".to_string(),
            Some(StoreCredentials {
                username: "fake".to_string(),
                password: "fake".to_string(),
            }),
        )
    } else {
        let endpoint = require_env!(lookup, "STORE_ENDPOINT");
        let region = lookup("STORE_REGION").unwrap_or_else(|| "us-east-1".to_string());
        let credentials = match (lookup("STORE_USERNAME"), lookup("STORE_PASSWORD")) {
            (Some(username), Some(password)) => Some(StoreCredentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "STORE_USERNAME",
                    message: "STORE_USERNAME and STORE_PASSWORD must be set together".into(),
                })
            }
        };
        (endpoint, region, credentials)
    };

    let table = lookup("STORE_TABLE").unwrap_or_else(|| "sensor_readings".to_string());
    if !is_valid_table_name(&table) {
        return Err(ConfigError::Invalid {
            name: "STORE_TABLE",
            message: format!("'{table}' is not a plain lowercase identifier"),
        });
    }

    Ok(StoreConfig {
        endpoint,
        region,
        credentials,
        table,
        pool_max: parse_env!(lookup, "STORE_POOL_MAX", u32, 5),
    })
}

fn http_from_lookup<F>(lookup: F) -> Result<HttpConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let defaults = HttpConfig::default();
    Ok(HttpConfig {
        timeout: Duration::from_secs(parse_env!(
            lookup,
            "HTTP_TIMEOUT_SECS",
            u64,
            defaults.timeout.as_secs()
        )),
        max_retries: parse_env!(lookup, "HTTP_MAX_RETRIES", u32, defaults.max_retries),
        retry_base_delay: Duration::from_millis(parse_env!(
            lookup,
            "HTTP_RETRY_BASE_MS",
            u64,
            500
        )),
    })
}

/// Table names are interpolated into SQL, so only `[a-z_][a-z0-9_]*` is allowed.
fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Show the first few characters of a secret.
fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}****")
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks secrets while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  NEST_CLIENT_ID      : {}", self.nest.client_id);
        tracing::info!("  NEST_CLIENT_SECRET  : {}", mask(&self.nest.client_secret));
        tracing::info!("  NEST_REFRESH_TOKEN  : {}", mask(&self.nest.refresh_token));
        tracing::info!("  NEST_PROJECT_ID     : {}", self.nest.project_id);
        match &self.weather {
            Some(w) => tracing::info!(
                "  WEATHER             : {} ({}, {})",
                w.label,
                w.lat,
                w.lon
            ),
            None => tracing::info!("  WEATHER             : disabled"),
        }
        match self.ttl_days {
            Some(days) => tracing::info!("  READING_TTL_DAYS    : {}", days),
            None => tracing::info!("  READING_TTL_DAYS    : disabled"),
        }
        tracing::info!(
            "  HTTP                : timeout {:?}, {} retries",
            self.http.timeout,
            self.http.max_retries
        );
        self.store.log_config();
    }
}

impl StoreConfig {
    /// Log the store section; credentials are never printed in full.
    pub fn log_config(&self) {
        // ---
        tracing::info!("  STORE_ENDPOINT      : {}", self.endpoint);
        tracing::info!("  STORE_REGION        : {}", self.region);
        tracing::info!("  STORE_TABLE         : {}", self.table);
        tracing::info!("  STORE_POOL_MAX      : {}", self.pool_max);
        if let Some(creds) = &self.credentials {
            tracing::info!("  STORE_USERNAME      : {}", creds.username);
        }
    }
}
