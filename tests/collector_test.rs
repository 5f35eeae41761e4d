//! Polling end to end against local fakes of the token, device and weather
//! services, writing into the in-memory store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use thermolog::collector::{handle_poll, poll};
use thermolog::store::SortOrder;
use thermolog::{config, Config, MemoryReadingStore, ReadingStore, OUTDOOR_DEVICE_ID};

// ---

struct FakeVendor {
    devices: Vec<Value>,
    devices_fail: bool,
    weather: Option<Value>,
    token_calls: AtomicUsize,
}

type Shared = Arc<FakeVendor>;

async fn token(
    State(vendor): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    // ---
    vendor.token_calls.fetch_add(1, Ordering::SeqCst);
    if form.get("grant_type").map(String::as_str) != Some("refresh_token") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(json!({ "access_token": "fake-access-token", "expires_in": 3599 })).into_response()
}

async fn list_devices(State(vendor): State<Shared>) -> Response {
    if vendor.devices_fail {
        return (StatusCode::FORBIDDEN, "permission denied").into_response();
    }
    Json(json!({ "devices": vendor.devices })).into_response()
}

async fn get_device(
    State(vendor): State<Shared>,
    Path((project, id)): Path<(String, String)>,
) -> Response {
    // ---
    let name = format!("enterprises/{project}/devices/{id}");
    match vendor.devices.iter().find(|d| d["name"] == name.as_str()) {
        Some(device) => Json(device.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn onecall(State(vendor): State<Shared>) -> Response {
    match &vendor.weather {
        Some(body) => Json(body.clone()).into_response(),
        None => (StatusCode::UNAUTHORIZED, "invalid api key").into_response(),
    }
}

async fn spawn_vendor(vendor: Shared) -> Result<SocketAddr> {
    // ---
    let app = Router::new()
        .route("/token", post(token))
        .route("/enterprises/{project}/devices", get(list_devices))
        .route("/enterprises/{project}/devices/{id}", get(get_device))
        .route("/onecall", get(onecall))
        .with_state(vendor);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn test_config(addr: SocketAddr, extra: &[(&str, &str)]) -> Config {
    // ---
    let base = format!("http://{addr}");
    let mut vars: HashMap<String, String> = [
        ("NEST_CLIENT_ID", "client-id"),
        ("NEST_CLIENT_SECRET", "client-secret"),
        ("NEST_REFRESH_TOKEN", "refresh-token"),
        ("NEST_PROJECT_ID", "proj"),
        ("OPENWEATHER_API_KEY", "weather-key"),
        ("WEATHER_LABEL", "Testville"),
        ("STORE_ENDPOINT", "postgres://unused/thermolog"),
        ("HTTP_TIMEOUT_SECS", "5"),
        ("HTTP_MAX_RETRIES", "0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    vars.insert("NEST_API_BASE".into(), base.clone());
    vars.insert("NEST_TOKEN_URL".into(), format!("{base}/token"));
    vars.insert("OPENWEATHER_API_BASE".into(), base);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }

    config::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

fn thermostat(id: &str, traits: Value) -> Value {
    json!({
        "name": format!("enterprises/proj/devices/{id}"),
        "type": "sdm.devices.types.THERMOSTAT",
        "traits": traits,
        "parentRelations": [{ "parent": "enterprises/proj/structures/s/rooms/r", "displayName": "Den" }]
    })
}

fn default_devices() -> Vec<Value> {
    vec![
        thermostat(
            "dev-a",
            json!({
                "sdm.devices.traits.Temperature": { "ambientTemperatureCelsius": 21.5 },
                "sdm.devices.traits.Humidity": { "ambientHumidityPercent": 44 }
            }),
        ),
        thermostat(
            "dev-b",
            json!({ "sdm.devices.traits.Temperature": { "ambientTemperatureCelsius": 18.0 } }),
        ),
        thermostat("dev-c", json!({ "sdm.devices.traits.Connectivity": { "status": "ONLINE" } })),
    ]
}

fn weather_body() -> Value {
    json!({
        "current": {
            "temp": -2.0,
            "humidity": 71,
            "feels_like": -6.3,
            "pressure": 1019,
            "weather": [{ "description": "overcast clouds" }]
        }
    })
}

fn vendor(devices: Vec<Value>, devices_fail: bool, weather: Option<Value>) -> Shared {
    Arc::new(FakeVendor {
        devices,
        devices_fail,
        weather,
        token_calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn poll_stores_device_and_weather_readings() -> Result<()> {
    // ---
    let vendor = vendor(default_devices(), false, Some(weather_body()));
    let addr = spawn_vendor(vendor.clone()).await?;
    let cfg = test_config(addr, &[]);
    let store = MemoryReadingStore::new();
    let captured_at = Utc::now();

    let report = poll(&cfg, &store, captured_at).await?;

    // dev-c has no temperature or humidity and produces no record
    assert_eq!(report.saved, 3);
    assert!(report.failures.is_empty());
    assert_eq!(store.len(), 3);

    let rows = store
        .query_partition(captured_at.date_naive(), SortOrder::Ascending)
        .await?;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.timestamp == captured_at.timestamp()));
    assert!(rows.iter().all(|r| r.readable_time == rows[0].readable_time));

    let outdoor = rows
        .iter()
        .find(|r| r.device_id == OUTDOOR_DEVICE_ID)
        .expect("outdoor reading");
    assert_eq!(outdoor.device_name, "Testville");
    assert!(outdoor.timestamp_device.ends_with("#outdoor_weather"));
    assert_eq!(outdoor.values.temperature_celsius, Some(-2.0));
    assert_eq!(outdoor.values.weather_description.as_deref(), Some("overcast clouds"));
    assert_eq!(outdoor.values.uv_index, None);

    let dev_b = rows
        .iter()
        .find(|r| r.device_id == "enterprises/proj/devices/dev-b")
        .expect("dev-b reading");
    assert_eq!(dev_b.device_name, "Thermostat (Den)");
    assert_eq!(dev_b.values.temperature_celsius, Some(18.0));
    assert_eq!(dev_b.values.humidity_percent, None);

    // one refresh serves every device call
    assert_eq!(vendor.token_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn weather_failure_keeps_device_readings() -> Result<()> {
    // ---
    let addr = spawn_vendor(vendor(default_devices(), false, None)).await?;
    let cfg = test_config(addr, &[]);
    let store = MemoryReadingStore::new();

    let outcome = handle_poll(&cfg, &store).await;

    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body["message"], "Successfully processed 2 readings");
    assert_eq!(outcome.body["errors"][0]["source"], "weather");
    assert_eq!(store.len(), 2);
    Ok(())
}

#[tokio::test]
async fn device_failure_keeps_weather_reading() -> Result<()> {
    // ---
    let addr = spawn_vendor(vendor(default_devices(), true, Some(weather_body()))).await?;
    let cfg = test_config(addr, &[]);
    let store = MemoryReadingStore::new();

    let outcome = handle_poll(&cfg, &store).await;

    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body["readings"].as_array().map(Vec::len), Some(1));
    assert_eq!(outcome.body["readings"][0]["device_id"], OUTDOOR_DEVICE_ID);
    assert_eq!(outcome.body["errors"][0]["source"], "devices");
    assert_eq!(store.len(), 1);
    Ok(())
}

#[tokio::test]
async fn both_sources_failing_is_a_server_error() -> Result<()> {
    // ---
    let addr = spawn_vendor(vendor(default_devices(), true, None)).await?;
    let cfg = test_config(addr, &[]);
    let store = MemoryReadingStore::new();

    let outcome = handle_poll(&cfg, &store).await;

    assert_eq!(outcome.status_code, 500);
    assert!(!outcome.is_success());
    let error = outcome.body["error"].as_str().unwrap_or_default();
    assert!(error.contains("devices"), "unexpected error: {error}");
    assert!(error.contains("weather"), "unexpected error: {error}");
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn nothing_to_collect_is_not_an_error() -> Result<()> {
    // ---
    let addr = spawn_vendor(vendor(Vec::new(), false, Some(weather_body()))).await?;
    let cfg = test_config(addr, &[("WEATHER_ENABLED", "false")]);
    assert!(cfg.weather.is_none());
    let store = MemoryReadingStore::new();

    let outcome = handle_poll(&cfg, &store).await;

    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.body["message"], "Successfully processed 0 readings");
    assert!(outcome.body.get("errors").is_none());
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn ttl_sets_expiry_relative_to_capture() -> Result<()> {
    // ---
    let addr = spawn_vendor(vendor(default_devices(), false, None)).await?;
    let cfg = test_config(addr, &[("READING_TTL_DAYS", "365"), ("WEATHER_ENABLED", "false")]);
    let store = MemoryReadingStore::new();
    let captured_at = Utc::now();

    let report = poll(&cfg, &store, captured_at).await?;

    assert_eq!(report.saved, 2);
    let expected = captured_at.timestamp() + 365 * 86_400;
    assert!(report.readings.iter().all(|r| r.expires_at == Some(expected)));
    assert_eq!(store.len(), 2);
    Ok(())
}

#[tokio::test]
async fn readings_land_in_their_utc_partition() -> Result<()> {
    // ---
    let addr = spawn_vendor(vendor(default_devices(), false, Some(weather_body()))).await?;
    let cfg = test_config(addr, &[]);
    let store = MemoryReadingStore::new();

    // 23:30 UTC is already the next calendar day east of Greenwich
    let captured_at = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
    poll(&cfg, &store, captured_at).await?;

    let day = captured_at.date_naive();
    let rows = store.query_partition(day, SortOrder::Ascending).await?;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.partition_key() == "2024-01-15"));

    let next = store
        .query_partition(day.succ_opt().unwrap(), SortOrder::Ascending)
        .await?;
    assert!(next.is_empty());
    Ok(())
}
