//! Data models shared by the collector, the store and the charting path.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ---

/// `device_id` used for the outdoor-weather pseudo device.
pub const OUTDOOR_DEVICE_ID: &str = "outdoor_weather";

/// Measured values of one observation.
///
/// Every field is optional: a missing trait is left out of the stored
/// record rather than written as zero, because zero is a valid reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorValues {
    // ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_percent: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like_celsius: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_hpa: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_index: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
}

impl SensorValues {
    /// True when no field carries data.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One sensor observation at one instant, as persisted in the store.
///
/// `date` is always the UTC calendar date of `timestamp`; it is the
/// partition key. `timestamp_device` is the sort key and keeps rows of
/// different devices captured in the same second apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub date: NaiveDate,
    pub timestamp_device: String,
    pub device_id: String,
    pub device_name: String,

    /// UTC epoch seconds.
    pub timestamp: i64,

    /// ISO-8601 rendering of `timestamp`.
    pub readable_time: String,

    #[serde(flatten)]
    pub values: SensorValues,

    /// Epoch seconds after which the store may drop the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Reading {
    /// Build a record for a device observed at `captured_at`.
    ///
    /// `short_id` is the suffix of the sort key; see [`short_device_id`].
    pub fn new(
        captured_at: DateTime<Utc>,
        device_id: impl Into<String>,
        short_id: &str,
        device_name: impl Into<String>,
        values: SensorValues,
    ) -> Self {
        // ---
        let timestamp = captured_at.timestamp();
        Self {
            date: captured_at.date_naive(),
            timestamp_device: sort_key(timestamp, short_id),
            device_id: device_id.into(),
            device_name: device_name.into(),
            timestamp,
            readable_time: captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            values,
            expires_at: None,
        }
    }

    /// Set the expiry `ttl_days` days after capture.
    pub fn with_ttl_days(mut self, ttl_days: u32) -> Self {
        self.expires_at = Some(self.timestamp + i64::from(ttl_days) * 86_400);
        self
    }

    /// Capture instant as a UTC datetime.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Partition key as stored: `YYYY-MM-DD`.
    pub fn partition_key(&self) -> String {
        partition_key(self.date)
    }
}

/// Partition key for a UTC calendar date.
pub fn partition_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Composite sort key `"<utc_epoch_seconds>#<device_short_id>"`.
pub fn sort_key(timestamp: i64, short_id: &str) -> String {
    format!("{timestamp}#{short_id}")
}

/// Last path segment of a vendor resource name
/// (`enterprises/p/devices/AVPH...` → `AVPH...`).
pub fn short_device_id(device_name: &str) -> &str {
    device_name.rsplit('/').next().unwrap_or(device_name)
}

// ---

/// A stored reading decoded for charting.
///
/// Carries the UTC instant, the instant converted to the chart timezone
/// (when one is requested) and the calendar date used to filter rows down
/// to the requested local days.
#[derive(Debug, Clone)]
pub struct ChartableRow {
    // ---
    pub reading: Reading,
    pub utc: DateTime<Utc>,
    pub local: Option<DateTime<Tz>>,
    pub local_date: NaiveDate,
}

impl ChartableRow {
    /// Decode a reading; `None` when its timestamp is out of range.
    ///
    /// Without a zone the row keeps UTC semantics and `local_date` is the
    /// UTC date.
    pub fn from_reading(reading: Reading, zone: Option<Tz>) -> Option<Self> {
        // ---
        let utc = reading.captured_at()?;
        let local = zone.map(|tz| utc.with_timezone(&tz));
        let local_date = local.map_or_else(|| utc.date_naive(), |dt| dt.date_naive());

        Some(Self {
            reading,
            utc,
            local,
            local_date,
        })
    }

    /// Wall-clock time in the chart's timezone, for axis placement.
    pub fn display_time(&self) -> NaiveDateTime {
        self.local
            .map_or_else(|| self.utc.naive_utc(), |dt| dt.naive_local())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap()
    }

    #[test]
    fn test_keys_derived_from_utc_instant() {
        // ---
        let reading = Reading::new(
            captured(),
            "enterprises/p/devices/AVPHwEuXyZ",
            "AVPHwEuXyZ",
            "Hallway",
            SensorValues::default(),
        );

        assert_eq!(reading.partition_key(), "2024-01-15");
        assert_eq!(reading.timestamp, 1_705_361_400);
        assert_eq!(reading.timestamp_device, "1705361400#AVPHwEuXyZ");
        assert_eq!(reading.readable_time, "2024-01-15T23:30:00Z");
    }

    #[test]
    fn test_missing_humidity_is_omitted_not_zeroed() {
        // ---
        let values = SensorValues {
            temperature_celsius: Some(0.0),
            ..Default::default()
        };
        let reading = Reading::new(captured(), "d", "d", "Den", values);
        let json = serde_json::to_value(&reading).unwrap();

        assert_eq!(json["temperature_celsius"], 0.0);
        assert!(json.get("humidity_percent").is_none());
        assert!(json.get("expires_at").is_none());
    }

    #[test]
    fn test_ttl_is_relative_to_capture() {
        // ---
        let reading =
            Reading::new(captured(), "d", "d", "Den", SensorValues::default()).with_ttl_days(365);
        assert_eq!(reading.expires_at, Some(1_705_361_400 + 365 * 86_400));
    }

    #[test]
    fn test_short_device_id() {
        // ---
        assert_eq!(short_device_id("enterprises/p/devices/abc123"), "abc123");
        assert_eq!(short_device_id("plain"), "plain");
    }

    #[test]
    fn test_chartable_row_local_date() {
        // ---
        let reading = Reading::new(captured(), "d", "d", "Den", SensorValues::default());
        let row = ChartableRow::from_reading(reading.clone(), Some(chrono_tz::America::New_York))
            .unwrap();

        // 23:30 UTC is 18:30 EST on the same day
        assert_eq!(row.local_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(row.display_time().to_string(), "2024-01-15 18:30:00");

        let utc_row = ChartableRow::from_reading(reading, None).unwrap();
        assert!(utc_row.local.is_none());
        assert_eq!(utc_row.display_time().to_string(), "2024-01-15 23:30:00");
    }

    #[test]
    fn test_values_empty() {
        // ---
        assert!(SensorValues::default().is_empty());
        assert!(!SensorValues {
            humidity_percent: Some(41.0),
            ..Default::default()
        }
        .is_empty());
    }
}
