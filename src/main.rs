//! Command-line entry point for `thermolog`.
//!
//! Subcommands:
//! - `poll`        – collect one batch of device and weather readings and store it
//! - `chart`       – chart stored readings for local calendar dates in any timezone
//! - `check`       – verify vendor credentials and print current device readings
//! - `auth`        – interactive authorization flow that prints `.env` lines
//! - `init-store`  – create the readings table and index if absent
//!
//! # Environment Variables
//! See [`thermolog::config`] for the full list. Logging is controlled by:
//! - `THERMOLOG_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `THERMOLOG_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! Logs go to stderr so chart and summary output on stdout stays clean.
use std::{env, path::PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use thermolog::chart::{self, DEFAULT_CHART_PATH};
use thermolog::nest::{exchange_authorization_code, NestClient};
use thermolog::{collector, config, http, oauth, range, reader, schema};
use thermolog::{DateWindow, PgReadingStore};

// ---

#[derive(Parser)]
#[command(name = "thermolog")]
#[command(version, about = "Thermostat and outdoor-weather reading collector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect one batch of readings and store it
    Poll,
    /// Chart stored temperature and humidity readings
    Chart(ChartArgs),
    /// Test the vendor connection and print current readings
    Check,
    /// Obtain a refresh token through the browser consent flow
    Auth,
    /// Create the readings table if it does not exist
    InitStore,
}

#[derive(Args)]
struct ChartArgs {
    /// Start date (YYYY-MM-DD), defaults to today in the chart timezone
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD), defaults to the start date
    #[arg(long)]
    end: Option<String>,

    /// IANA timezone the dates are interpreted in
    #[arg(long, default_value = "America/New_York")]
    timezone: String,

    /// Write the chart to this file (.png or .svg)
    #[arg(long)]
    save: Option<PathBuf>,

    /// Print a data summary
    #[arg(long)]
    summary: bool,

    /// Interpret dates as UTC calendar days (overrides --timezone)
    #[arg(long)]
    utc: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Poll => run_poll().await,
        Commands::Chart(args) => run_chart(args).await,
        Commands::Check => run_check().await,
        Commands::Auth => run_auth().await,
        Commands::InitStore => run_init_store().await,
    }
}

async fn run_poll() -> Result<()> {
    // ---
    let outcome = collector::poll_from_env().await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_success() {
        bail!("poll failed with status {}", outcome.status_code);
    }
    Ok(())
}

async fn run_chart(args: ChartArgs) -> Result<()> {
    // ---
    let zone = if args.utc {
        None
    } else {
        Some(range::parse_timezone(&args.timezone)?)
    };
    let window = DateWindow::from_args(args.start.as_deref(), args.end.as_deref(), zone, Utc::now())?;

    println!(
        "Charting data from {} to {} ({})",
        window.start,
        window.end,
        window.zone_name()
    );

    let store_cfg = config::load_store_from_env()?;
    store_cfg.log_config();
    let store = PgReadingStore::connect(&store_cfg)
        .await
        .with_context(|| format!("Failed to connect to store '{}'", store_cfg.endpoint))?;

    let rows = reader::load_chart_rows(&store, &window).await?;
    println!("Found {} readings", rows.len());

    if args.summary {
        if let Some(summary) = chart::summarize(&rows, window.zone_name()) {
            println!("\n{summary}");
        }
    }

    if rows.is_empty() {
        println!("No data available for charting");
        return Ok(());
    }

    let path = args.save.unwrap_or_else(|| PathBuf::from(DEFAULT_CHART_PATH));
    chart::render_chart(&rows, &window, &path)?;
    println!("Chart saved to {}", path.display());
    Ok(())
}

async fn run_check() -> Result<()> {
    // ---
    let (nest_cfg, http_cfg) = config::load_nest_from_env()?;
    let client = NestClient::new(&nest_cfg, &http_cfg)?;

    println!("Testing device API connection...");
    println!("Getting access token...");
    let token = client.tokens().get_valid_token().await?;
    let prefix: String = token.chars().take(20).collect();
    println!("✓ Access token obtained: {prefix}...");

    println!("Fetching devices...");
    let devices = client.list_devices().await?;
    println!("✓ Found {} devices", devices.len());

    for device in &devices {
        println!("  - Device: {}", device.display_name());
        println!("    ID: {}", device.name);

        let values = client.sensor_values(&device.name).await?;
        if values.is_empty() {
            println!("    No sensor data available");
            continue;
        }
        if let Some(temp) = values.temperature_celsius {
            println!(
                "    Temperature: {temp}°C ({:.1}°F)",
                chart::celsius_to_fahrenheit(temp)
            );
        }
        if let Some(humidity) = values.humidity_percent {
            println!("    Humidity: {humidity}%");
        }
    }
    Ok(())
}

async fn run_auth() -> Result<()> {
    // ---
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("=== Nest API Token Generator ===\n");
    let client_id = prompt_required(&mut input, "Enter your OAuth Client ID: ").await?;
    let client_secret = prompt_required(&mut input, "Enter your OAuth Client Secret: ").await?;
    let project_id = prompt_required(&mut input, "Enter your Device Access Project ID: ").await?;
    let tunnel = prompt(
        &mut input,
        "Tunnel redirect URI (leave empty for http://localhost:8080): ",
    )
    .await?;
    let redirect_uri = if tunnel.is_empty() {
        oauth::DEFAULT_REDIRECT_URI.to_string()
    } else {
        println!("Make sure this redirect URI is registered with your OAuth client!");
        tunnel
    };
    println!("Using redirect URI: {redirect_uri}\n");

    let state = oauth::new_state();
    let url = oauth::authorization_url(&project_id, &client_id, &redirect_uri, &state)?;
    let listener = oauth::bind_callback_listener(oauth::callback_port(&redirect_uri)?).await?;

    println!("Visit this URL to authorize access:");
    println!("{url}\n");
    println!("Waiting for authorization...");

    let code = oauth::wait_for_code(listener, Some(state), oauth::CALLBACK_TIMEOUT).await?;
    println!("✓ Authorization code received");

    let (token_url, http_cfg) = config::load_token_endpoint_from_env()?;
    let client = http::build_client(&http_cfg)?;
    let tokens = exchange_authorization_code(
        &client,
        &token_url,
        &client_id,
        &client_secret,
        &code,
        &redirect_uri,
    )
    .await
    .context("Token exchange failed")?;

    let lines = oauth::env_lines(&client_id, &client_secret, &project_id, &tokens)?;
    println!("\n✓ Success! Add these to your .env file:\n");
    print!("{lines}");
    println!("\nThe refresh token is what the collector needs for long-term access.");
    Ok(())
}

async fn prompt(input: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    // ---
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let line = input.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}

async fn prompt_required(input: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    // ---
    let value = prompt(input, label).await?;
    if value.is_empty() {
        bail!("a value is required for: {}", label.trim_end_matches([':', ' ']));
    }
    Ok(value)
}

async fn run_init_store() -> Result<()> {
    // ---
    let store_cfg = config::load_store_from_env()?;
    store_cfg.log_config();

    let store = PgReadingStore::connect(&store_cfg)
        .await
        .with_context(|| format!("Failed to connect to store '{}'", store_cfg.endpoint))?;
    schema::create_schema(store.pool(), store.table()).await?;

    println!("Table {} is ready", store.table());
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled, written to stderr
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `THERMOLOG_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level from `RUST_LOG`, else `THERMOLOG_LOG_LEVEL`
fn init_tracing() {
    // ---
    let span_events = match env::var("THERMOLOG_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("THERMOLOG_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
