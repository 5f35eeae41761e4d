use std::ops::Range;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use plotters::coord::types::RangedDateTime;
use plotters::coord::Shift;
use plotters::prelude::*;

use super::series::{celsius_to_fahrenheit, device_series, DeviceSeries};
use crate::error::{Error, Result};
use crate::models::ChartableRow;
use crate::range::DateWindow;

/// Output file used when no path is given.
pub const DEFAULT_CHART_PATH: &str = "thermolog-chart.png";

const CHART_SIZE: (u32, u32) = (1200, 1000);
const TITLE: &str = "Temperature and Humidity Over Time";

fn chart_err(e: impl std::fmt::Display) -> Error {
    Error::Chart(e.to_string())
}

/// Draw temperature (°F) and humidity (%) panels for `rows` into `path`.
///
/// A `.svg` extension selects the SVG backend; anything else is written
/// as a PNG bitmap.
pub fn render_chart(rows: &[ChartableRow], window: &DateWindow, path: &Path) -> Result<()> {
    // ---
    if rows.is_empty() {
        return Err(Error::Chart("no rows to chart".to_string()));
    }

    let is_svg = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));

    if is_svg {
        let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
        draw(root, rows, window)?;
    } else {
        let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
        draw(root, rows, window)?;
    }

    tracing::info!(path = %path.display(), rows = rows.len(), "Chart written");
    Ok(())
}

fn draw<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    rows: &[ChartableRow],
    window: &DateWindow,
) -> Result<()> {
    // ---
    root.fill(&WHITE).map_err(chart_err)?;
    let root = root.titled(TITLE, ("sans-serif", 28)).map_err(chart_err)?;
    let panels = root.split_evenly((2, 1));

    let x_range = time_bounds(rows);
    let label_format = if window.is_single_day() {
        "%H:%M"
    } else {
        "%m-%d %H:%M"
    };

    let temperatures = device_series(rows, |r| {
        r.reading.values.temperature_celsius.map(celsius_to_fahrenheit)
    });
    let humidity = device_series(rows, |r| r.reading.values.humidity_percent);

    let x_desc = format!("Time ({})", window.zone_name());
    draw_panel(
        &panels[0],
        "Temperature (°F)",
        &x_desc,
        &temperatures,
        x_range.clone(),
        label_format,
    )?;
    draw_panel(
        &panels[1],
        "Humidity (%)",
        &x_desc,
        &humidity,
        x_range,
        label_format,
    )?;

    root.present().map_err(chart_err)?;
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    x_desc: &str,
    series: &[DeviceSeries],
    x_range: Range<NaiveDateTime>,
    label_format: &str,
) -> Result<()> {
    // ---
    let y_range = value_bounds(series);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(RangedDateTime::from(x_range), y_range)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(title)
        .x_labels(8)
        .x_label_formatter(&|dt: &NaiveDateTime| dt.format(label_format).to_string())
        .light_line_style(BLACK.mix(0.1))
        .draw()
        .map_err(chart_err)?;

    for s in series {
        let color = Palette99::pick(s.color_index).to_rgba();

        chart
            .draw_series(LineSeries::new(s.points.iter().copied(), color.stroke_width(2)))
            .map_err(chart_err)?
            .label(s.device_name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));

        chart
            .draw_series(
                s.points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
            )
            .map_err(chart_err)?;
    }

    if !series.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;
    }

    Ok(())
}

/// Wall-clock span of the rows, widened when every row shares one instant.
pub(crate) fn time_bounds(rows: &[ChartableRow]) -> Range<NaiveDateTime> {
    // ---
    let mut times = rows.iter().map(ChartableRow::display_time);
    let Some(first) = times.next() else {
        let epoch = NaiveDateTime::default();
        return epoch..epoch + Duration::hours(1);
    };
    let (min, max) = times.fold((first, first), |(min, max), t| (min.min(t), max.max(t)));

    if min == max {
        min - Duration::minutes(30)..max + Duration::minutes(30)
    } else {
        min..max
    }
}

/// Value span of all series with ten percent padding.
pub(crate) fn value_bounds(series: &[DeviceSeries]) -> Range<f64> {
    // ---
    let (min, max) = series
        .iter()
        .flat_map(|s| s.points.iter().map(|&(_, v)| v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
            (min.min(v), max.max(v))
        });

    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }

    let padding = if (max - min).abs() > 1e-6 {
        (max - min) * 0.1
    } else {
        1.0
    };
    min - padding..max + padding
}
