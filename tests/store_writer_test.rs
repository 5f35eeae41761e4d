//! Batch writer behavior against stores that fail on purpose.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use thermolog::retry::RetryPolicy;
use thermolog::store::{save_readings, BATCH_SIZE};
use thermolog::{
    Error, MemoryReadingStore, Reading, ReadingStore, Result, SensorValues, SortOrder,
};

// ---

/// Delegates to a memory store but fails the call numbered `fail_on`
/// (1-based) with the error produced by `make_error`.
struct FlakyStore {
    inner: MemoryReadingStore,
    calls: AtomicUsize,
    fail_on: usize,
    make_error: fn() -> Error,
}

#[async_trait]
impl ReadingStore for FlakyStore {
    async fn query_partition(&self, date: NaiveDate, order: SortOrder) -> Result<Vec<Reading>> {
        self.inner.query_partition(date, order).await
    }

    async fn put_batch(&self, readings: &[Reading]) -> Result<()> {
        // ---
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err((self.make_error)());
        }
        self.inner.put_batch(readings).await
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        self.inner.purge_expired(now).await
    }
}

fn readings(count: usize) -> Vec<Reading> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let id = format!("dev-{i:03}");
            let values = SensorValues {
                temperature_celsius: Some(20.0),
                ..Default::default()
            };
            Reading::new(base, id.as_str(), &id, "Den", values)
        })
        .collect()
}

fn permanent() -> Error {
    Error::Decode {
        service: "store",
        message: "rejected".into(),
    }
}

fn transient() -> Error {
    Error::Store(sqlx::Error::PoolTimedOut)
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
    }
}

#[test]
fn failed_chunk_reports_written_and_failed_counts() {
    // ---
    let store = FlakyStore {
        inner: MemoryReadingStore::new(),
        calls: AtomicUsize::new(0),
        fail_on: 2,
        make_error: permanent,
    };
    let batch = readings(60);

    let err = tokio_test::block_on(save_readings(&store, &batch, quick_retry())).unwrap_err();

    match err {
        Error::BatchWrite {
            written, failed, ..
        } => {
            assert_eq!(written, BATCH_SIZE);
            assert_eq!(failed, 60 - BATCH_SIZE);
        }
        other => panic!("unexpected error: {other}"),
    }
    // the first chunk stays written; permanent errors are not retried
    assert_eq!(store.inner.len(), BATCH_SIZE);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn transient_failure_is_retried() {
    // ---
    let store = FlakyStore {
        inner: MemoryReadingStore::new(),
        calls: AtomicUsize::new(0),
        fail_on: 1,
        make_error: transient,
    };
    let batch = readings(30);

    let written = tokio_test::block_on(save_readings(&store, &batch, quick_retry())).unwrap();

    assert_eq!(written, 30);
    assert_eq!(store.inner.len(), 30);
    // chunk one failed once and was replayed, chunk two went through
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn replaying_a_batch_overwrites_rows() {
    // ---
    let store = MemoryReadingStore::new();
    let batch = readings(BATCH_SIZE + 1);

    tokio_test::block_on(async {
        save_readings(&store, &batch, RetryPolicy::none()).await?;
        save_readings(&store, &batch, RetryPolicy::none()).await
    })
    .unwrap();

    assert_eq!(store.len(), BATCH_SIZE + 1);
}

#[test]
fn empty_batch_writes_nothing() {
    // ---
    let store = FlakyStore {
        inner: MemoryReadingStore::new(),
        calls: AtomicUsize::new(0),
        fail_on: 1,
        make_error: permanent,
    };

    let written = tokio_test::block_on(save_readings(&store, &[], RetryPolicy::none())).unwrap();

    assert_eq!(written, 0);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}
