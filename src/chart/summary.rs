use std::fmt;

use chrono::NaiveDateTime;

use super::series::celsius_to_fahrenheit;
use crate::models::ChartableRow;

// ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureStats {
    pub avg_f: f64,
    pub min_f: f64,
    pub max_f: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSummary {
    pub device_name: String,
    pub count: usize,
    pub temperature: Option<TemperatureStats>,
}

/// Digest of a window of rows, printed by `thermolog chart --summary`.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    // ---
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub zone: &'static str,
    pub total: usize,

    /// Devices in first-appearance order.
    pub devices: Vec<DeviceSummary>,
}

/// Summarize `rows`; `None` when there is nothing to summarize.
pub fn summarize(rows: &[ChartableRow], zone: &'static str) -> Option<Summary> {
    // ---
    let first = rows.iter().map(ChartableRow::display_time).min()?;
    let last = rows.iter().map(ChartableRow::display_time).max()?;

    let mut names: Vec<&str> = Vec::new();
    for row in rows {
        let name = row.reading.device_name.as_str();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let devices = names
        .into_iter()
        .map(|name| {
            let device_rows: Vec<&ChartableRow> = rows
                .iter()
                .filter(|r| r.reading.device_name == name)
                .collect();
            let temps: Vec<f64> = device_rows
                .iter()
                .filter_map(|r| r.reading.values.temperature_celsius)
                .collect();

            DeviceSummary {
                device_name: name.to_string(),
                count: device_rows.len(),
                temperature: temperature_stats(&temps),
            }
        })
        .collect();

    Some(Summary {
        first,
        last,
        zone,
        total: rows.len(),
        devices,
    })
}

fn temperature_stats(celsius: &[f64]) -> Option<TemperatureStats> {
    // ---
    if celsius.is_empty() {
        return None;
    }
    let avg = celsius.iter().sum::<f64>() / celsius.len() as f64;
    let min = celsius.iter().copied().fold(f64::INFINITY, f64::min);
    let max = celsius.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(TemperatureStats {
        avg_f: celsius_to_fahrenheit(avg),
        min_f: celsius_to_fahrenheit(min),
        max_f: celsius_to_fahrenheit(max),
    })
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        writeln!(f, "=== Data Summary ===")?;
        writeln!(
            f,
            "Time range: {} to {} ({})",
            self.first.format("%Y-%m-%d %H:%M:%S"),
            self.last.format("%Y-%m-%d %H:%M:%S"),
            self.zone
        )?;
        writeln!(f, "Total readings: {}", self.total)?;
        writeln!(f)?;
        writeln!(f, "Devices found:")?;

        for d in &self.devices {
            match d.temperature {
                Some(t) => writeln!(
                    f,
                    "  - {}: {} readings, avg temp {:.1}°F (range: {:.1}-{:.1}°F)",
                    d.device_name, d.count, t.avg_f, t.min_f, t.max_f
                )?,
                None => writeln!(
                    f,
                    "  - {}: {} readings (no temperature data)",
                    d.device_name, d.count
                )?,
            }
        }
        Ok(())
    }
}
