//! Date-range resolution between local calendar days and UTC partitions.
//!
//! Readings are partitioned by the UTC calendar date of their timestamp, but
//! charts are requested by local calendar date. A local day maps onto at most
//! two UTC dates (offsets stay within ±14h), so the reader fetches that
//! superset of partitions and [`filter_to_local_days`] trims it back to the
//! exact local-day boundary.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};
use crate::models::ChartableRow;

// ---

/// Inclusive range of UTC partition dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    // ---
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PartitionRange {
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Every date in the range, one calendar day at a time.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Number of partitions covered.
    pub fn len(&self) -> usize {
        usize::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Parse an IANA timezone identifier such as `America/New_York`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::InvalidTimezone(name.to_string()))
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidDate(value.to_string()))
}

/// The calendar date in `tz` at instant `now`.
pub fn today_at(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// First instant of the local day `date` in `tz`.
///
/// Midnight can be skipped by a DST transition (several zones switch at
/// 00:00); the day then starts at the first wall-clock minute that exists.
/// When midnight is repeated the earlier occurrence wins.
pub fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    // ---
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    first_valid_instant(tz, midnight)
}

/// First and last instant of the local day, in UTC.
///
/// The end is one microsecond before the next local day starts, which is
/// `23:59:59.999999` on regular days and stays correct on 23 and 25 hour days.
pub fn local_day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    // ---
    let start = local_day_start(date, tz);
    let end = match date.succ_opt() {
        Some(next) => local_day_start(next, tz) - Duration::microseconds(1),
        None => start + Duration::days(1) - Duration::microseconds(1),
    };
    (start, end)
}

fn first_valid_instant(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    // ---
    // Gaps never exceed a few hours; a day of minutes is a safe upper bound.
    for minutes in 0..=24 * 60 {
        let candidate = naive + Duration::minutes(minutes);
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => continue,
        }
    }
    naive.and_utc()
}

/// UTC partitions that can hold readings taken during local day `date`.
///
/// Pure function of its inputs: the same date and zone always give the same
/// range. Returns at most two consecutive dates.
pub fn resolve(local_date: NaiveDate, tz: Tz) -> PartitionRange {
    // ---
    let (start, end) = local_day_bounds(local_date, tz);
    PartitionRange {
        start: start.date_naive(),
        end: end.date_naive(),
    }
}

/// UTC partitions for the inclusive local range `[start, end]`.
pub fn resolve_range(start: NaiveDate, end: NaiveDate, tz: Tz) -> Result<PartitionRange> {
    // ---
    if end < start {
        return Err(Error::InvalidRange { start, end });
    }
    Ok(span(start, end, tz))
}

/// Union of the partitions of both endpoints; `start <= end` is checked by
/// the callers.
fn span(start: NaiveDate, end: NaiveDate, tz: Tz) -> PartitionRange {
    PartitionRange {
        start: resolve(start, tz).start,
        end: resolve(end, tz).end,
    }
}

/// Keep rows whose local calendar date lies in `[start, end]`.
pub fn filter_to_local_days(
    rows: Vec<ChartableRow>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<ChartableRow> {
    rows.into_iter()
        .filter(|row| start <= row.local_date && row.local_date <= end)
        .collect()
}

/// Keep rows whose local calendar date is exactly `date`.
pub fn filter_to_local_day(rows: Vec<ChartableRow>, date: NaiveDate) -> Vec<ChartableRow> {
    filter_to_local_days(rows, date, date)
}

// ---

/// A chart request: inclusive local dates, optionally bound to a timezone.
///
/// Without a zone the request has plain UTC semantics: the partitions are
/// exactly the requested dates and no local-day filter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    // ---
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub zone: Option<Tz>,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, zone: Option<Tz>) -> Result<Self> {
        // ---
        if end < start {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end, zone })
    }

    /// Build a window from optional CLI values.
    ///
    /// A missing start defaults to today in the effective zone (UTC when no
    /// zone is given); a missing end defaults to the start.
    pub fn from_args(
        start: Option<&str>,
        end: Option<&str>,
        zone: Option<Tz>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        // ---
        let start = match start {
            Some(s) => parse_date(s)?,
            None => today_at(now, zone.unwrap_or(Tz::UTC)),
        };
        let end = match end {
            Some(e) => parse_date(e)?,
            None => start,
        };
        Self::new(start, end, zone)
    }

    /// UTC partitions to query.
    pub fn partitions(&self) -> PartitionRange {
        // ---
        match self.zone {
            Some(tz) => span(self.start, self.end, tz),
            None => PartitionRange {
                start: self.start,
                end: self.end,
            },
        }
    }

    /// Trim fetched rows to the requested local days.
    pub fn filter(&self, rows: Vec<ChartableRow>) -> Vec<ChartableRow> {
        match self.zone {
            Some(_) => filter_to_local_days(rows, self.start, self.end),
            None => rows,
        }
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    /// Name of the effective timezone for display.
    pub fn zone_name(&self) -> &'static str {
        self.zone.map_or("UTC", |tz| tz.name())
    }
}
