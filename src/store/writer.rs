use super::ReadingStore;
use crate::error::{Error, Result};
use crate::models::Reading;
use crate::retry::{with_retry, RetryPolicy};

/// Rows per store round-trip.
pub const BATCH_SIZE: usize = 25;

/// Persist `readings` in chunks of [`BATCH_SIZE`].
///
/// Delivery is at-least-once: chunks written before a failure stay written,
/// and the failure is reported with how many rows made it. Transient store
/// errors are retried per chunk; replaying a chunk only overwrites rows.
pub async fn save_readings(
    store: &dyn ReadingStore,
    readings: &[Reading],
    retry: RetryPolicy,
) -> Result<usize> {
    // ---
    let mut written = 0;
    for chunk in readings.chunks(BATCH_SIZE) {
        let outcome = with_retry(retry, "store batch write", move || store.put_batch(chunk)).await;

        if let Err(e) = outcome {
            tracing::error!(
                error = %e,
                written,
                failed = readings.len() - written,
                "Batch write failed"
            );
            return Err(Error::BatchWrite {
                written,
                failed: readings.len() - written,
                source: Box::new(e),
            });
        }

        written += chunk.len();
        tracing::debug!(written, total = readings.len(), "Batch chunk saved");
    }
    Ok(written)
}
