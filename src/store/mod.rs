//! Partitioned reading store.
//!
//! Rows are grouped by partition key (UTC calendar date) and ordered within a
//! partition by sort key (`"<epoch_seconds>#<device_short_id>"`). Writing a
//! row whose key already exists overwrites it, so replayed batches are
//! harmless.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::Reading;

mod memory;
mod postgres;
mod writer;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;
pub use writer::{save_readings, BATCH_SIZE};

/// Order of rows within a partition, by sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// All live rows whose partition key is `date`.
    ///
    /// An empty or unknown partition yields an empty vector.
    async fn query_partition(&self, date: NaiveDate, order: SortOrder) -> Result<Vec<Reading>>;

    /// Persist one chunk of at most [`BATCH_SIZE`] rows as a unit.
    async fn put_batch(&self, readings: &[Reading]) -> Result<()>;

    /// Drop rows whose expiry is at or before `now` (epoch seconds).
    ///
    /// Returns the number of rows removed.
    async fn purge_expired(&self, now: i64) -> Result<u64>;
}

/// Rows without an expiry never expire.
pub(crate) fn is_live(reading: &Reading, now: i64) -> bool {
    reading.expires_at.map_or(true, |at| at > now)
}
