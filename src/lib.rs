//! `thermolog`: thermostat and outdoor-weather reading collector with
//! timezone-aware charting.
//!
//! Readings are stored partitioned by UTC calendar date. The charting path
//! accepts local calendar dates in any IANA timezone, resolves them to the
//! UTC partitions that can hold their rows, and filters the fetched superset
//! back down to the requested local days.
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): each
//! module is reached through this gateway, and the shared types below are
//! re-exported so callers do not need to know which sibling defines them.

pub mod chart;
pub mod collector;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod nest;
pub mod oauth;
pub mod range;
pub mod reader;
pub mod retry;
pub mod schema;
pub mod store;
pub mod weather;

pub use config::{Config, ConfigError, HttpConfig, NestConfig, StoreConfig, WeatherConfig};
pub use error::{Error, Result};
pub use models::{ChartableRow, Reading, SensorValues, OUTDOOR_DEVICE_ID};
pub use range::{DateWindow, PartitionRange};
pub use store::{MemoryReadingStore, PgReadingStore, ReadingStore, SortOrder};
