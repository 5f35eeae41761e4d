//! Chart rendering and the data summary for a window of readings.
//!
//! `series` groups rows per device, `render` draws the two-panel chart with
//! plotters and `summary` builds the printable per-device digest.

mod render;
mod series;
mod summary;

pub use render::{render_chart, DEFAULT_CHART_PATH};
pub use series::{celsius_to_fahrenheit, device_series, DeviceSeries};
pub use summary::{summarize, DeviceSummary, Summary, TemperatureStats};
