use chrono::NaiveDateTime;

use crate::models::ChartableRow;

// ---

/// Points of one device for one measured quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSeries {
    pub device_name: String,

    /// Position of the device in first-appearance order across all rows, so
    /// a device keeps its colour in every panel.
    pub color_index: usize,

    pub points: Vec<(NaiveDateTime, f64)>,
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Group rows by device name in first-appearance order.
///
/// `value` picks the plotted quantity; rows where it is absent are skipped
/// and devices with no points at all are left out.
pub fn device_series<F>(rows: &[ChartableRow], value: F) -> Vec<DeviceSeries>
where
    F: Fn(&ChartableRow) -> Option<f64>,
{
    // ---
    let mut series: Vec<DeviceSeries> = Vec::new();

    for row in rows {
        let name = row.reading.device_name.as_str();
        let idx = match series.iter().position(|s| s.device_name == name) {
            Some(idx) => idx,
            None => {
                series.push(DeviceSeries {
                    device_name: name.to_string(),
                    color_index: series.len(),
                    points: Vec::new(),
                });
                series.len() - 1
            }
        };

        if let Some(v) = value(row) {
            series[idx].points.push((row.display_time(), v));
        }
    }

    series.retain(|s| !s.points.is_empty());
    series
}
