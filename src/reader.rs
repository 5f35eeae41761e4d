//! Reading retrieval across UTC partitions.

use crate::error::Result;
use crate::models::{ChartableRow, Reading};
use crate::range::{DateWindow, PartitionRange};
use crate::store::{ReadingStore, SortOrder};

// ---

/// Fetch every partition in `range` and merge them into timestamp order.
///
/// Partitions are queried one date at a time. The merge sort is stable, so
/// rows sharing a timestamp keep the store's sort-key order within their
/// partition; beyond that their relative order is unspecified. Missing
/// partitions and an empty store both yield an empty vector.
pub async fn fetch_range(store: &dyn ReadingStore, range: PartitionRange) -> Result<Vec<Reading>> {
    // ---
    let mut all = Vec::new();
    for date in range.days() {
        let rows = store.query_partition(date, SortOrder::Ascending).await?;
        tracing::debug!(%date, rows = rows.len(), "Fetched partition");
        all.extend(rows);
    }

    all.sort_by_key(|r| r.timestamp);
    Ok(all)
}

/// Load the rows of a chart request, trimmed to its local days.
///
/// Fetches the UTC partitions the window resolves to, decodes each row into
/// the window's timezone and drops rows that fall outside the requested
/// local dates. Rows whose timestamp cannot be decoded are skipped with a
/// warning.
pub async fn load_chart_rows(
    store: &dyn ReadingStore,
    window: &DateWindow,
) -> Result<Vec<ChartableRow>> {
    // ---
    let range = window.partitions();
    tracing::info!(
        local_start = %window.start,
        local_end = %window.end,
        timezone = window.zone_name(),
        utc_start = %range.start,
        utc_end = %range.end,
        "Resolved UTC partitions"
    );

    let readings = fetch_range(store, range).await?;
    let fetched = readings.len();

    let mut rows = Vec::with_capacity(fetched);
    for reading in readings {
        if reading.captured_at().is_none() {
            tracing::warn!(
                timestamp_device = %reading.timestamp_device,
                timestamp = reading.timestamp,
                "Dropping reading with out-of-range timestamp"
            );
            continue;
        }
        rows.extend(ChartableRow::from_reading(reading, window.zone));
    }
    let rows = window.filter(rows);

    tracing::info!(fetched, kept = rows.len(), "Filtered to requested days");
    Ok(rows)
}
