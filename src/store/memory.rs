use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::{is_live, ReadingStore, SortOrder};
use crate::error::Result;
use crate::models::Reading;

type Partition = BTreeMap<String, Reading>;

/// In-process store with the same key semantics as the database store.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    partitions: Mutex<BTreeMap<NaiveDate, Partition>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<NaiveDate, Partition>> {
        // A panic while holding the lock cannot leave a map half-written.
        self.partitions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn query_partition(&self, date: NaiveDate, order: SortOrder) -> Result<Vec<Reading>> {
        // ---
        let now = Utc::now().timestamp();
        let partitions = self.lock();
        let Some(partition) = partitions.get(&date) else {
            return Ok(Vec::new());
        };

        let live = partition.values().filter(|r| is_live(r, now)).cloned();
        Ok(match order {
            SortOrder::Ascending => live.collect(),
            SortOrder::Descending => live.rev().collect(),
        })
    }

    async fn put_batch(&self, readings: &[Reading]) -> Result<()> {
        // ---
        let mut partitions = self.lock();
        for reading in readings {
            partitions
                .entry(reading.date)
                .or_default()
                .insert(reading.timestamp_device.clone(), reading.clone());
        }
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        // ---
        let mut partitions = self.lock();
        let mut removed = 0;
        for partition in partitions.values_mut() {
            let before = partition.len();
            partition.retain(|_, r| is_live(r, now));
            removed += (before - partition.len()) as u64;
        }
        partitions.retain(|_, p| !p.is_empty());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::SensorValues;
    use chrono::{DateTime, TimeZone};

    fn reading(at: DateTime<Utc>, short_id: &str, temp: f64) -> Reading {
        let values = SensorValues {
            temperature_celsius: Some(temp),
            ..Default::default()
        };
        Reading::new(at, short_id, short_id, short_id, values)
    }

    #[test]
    fn test_partition_query_ordered_by_sort_key() {
        // ---
        let store = MemoryReadingStore::new();
        let day = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let rows = vec![
            reading(day + chrono::Duration::hours(3), "b", 20.0),
            reading(day + chrono::Duration::hours(1), "a", 21.0),
            reading(day + chrono::Duration::hours(2), "a", 22.0),
        ];

        tokio_test::block_on(async {
            store.put_batch(&rows).await.unwrap();

            let asc = store
                .query_partition(day.date_naive(), SortOrder::Ascending)
                .await
                .unwrap();
            let temps: Vec<f64> = asc
                .iter()
                .filter_map(|r| r.values.temperature_celsius)
                .collect();
            assert_eq!(temps, vec![21.0, 22.0, 20.0]);

            let desc = store
                .query_partition(day.date_naive(), SortOrder::Descending)
                .await
                .unwrap();
            assert_eq!(desc.first().unwrap().values.temperature_celsius, Some(20.0));
        });
    }

    #[test]
    fn test_duplicate_key_overwrites() {
        // ---
        let store = MemoryReadingStore::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        tokio_test::block_on(async {
            store.put_batch(&[reading(at, "a", 20.0)]).await.unwrap();
            store.put_batch(&[reading(at, "a", 20.5)]).await.unwrap();

            let rows = store
                .query_partition(at.date_naive(), SortOrder::Ascending)
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].values.temperature_celsius, Some(20.5));
        });
    }

    #[test]
    fn test_unknown_partition_is_empty() {
        // ---
        let store = MemoryReadingStore::new();
        let date = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let rows =
            tokio_test::block_on(store.query_partition(date, SortOrder::Ascending)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_expired_rows_hidden_and_purged() {
        // ---
        let store = MemoryReadingStore::new();
        let long_ago = Utc.with_ymd_and_hms(2020, 1, 15, 12, 0, 0).unwrap();
        let expired = reading(long_ago, "a", 20.0).with_ttl_days(1);
        let kept = reading(long_ago, "b", 20.0);

        tokio_test::block_on(async {
            store.put_batch(&[expired, kept]).await.unwrap();

            let rows = store
                .query_partition(long_ago.date_naive(), SortOrder::Ascending)
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(store.len(), 2);

            let removed = store.purge_expired(Utc::now().timestamp()).await.unwrap();
            assert_eq!(removed, 1);
            assert_eq!(store.len(), 1);
        });
    }
}
