//! # Clock
//!
//! Time source for the engine. Every timestamp the engine writes and every
//! calendar date it buckets by comes from a [`Clock`], so tests can pin
//! both the instant and the timezone.
//!
//! Dates are computed under a fixed UTC offset taken from configuration.

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

/// Source of the current instant and the local timezone.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Offset used to turn instants into local calendar dates.
    fn offset(&self) -> FixedOffset;

    /// Local calendar date of `ts`.
    fn date_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset()).date_naive()
    }

    /// Today's local date.
    fn today(&self) -> NaiveDate {
        self.date_of(self.now())
    }

    /// UTC instants bounding the local dates `start..=end`, as a half-open
    /// range `[from, to)`.
    fn day_bounds(&self, start: NaiveDate, end: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let shift = Duration::seconds(i64::from(self.offset().local_minus_utc()));
        let local_midnight = |d: NaiveDate| {
            DateTime::<Utc>::from_naive_utc_and_offset(d.and_time(NaiveTime::MIN) - shift, Utc)
        };
        (
            local_midnight(start),
            local_midnight(end) + Duration::days(1),
        )
    }
}

// =============================================================================
// System Clock
// =============================================================================

/// Wall clock with a configured offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        SystemClock { offset }
    }

    /// Wall clock bucketing by UTC dates.
    pub fn utc() -> Self {
        SystemClock {
            offset: Utc.fix(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::utc()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        ManualClock {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Manual clock at `now`, bucketing by UTC dates.
    pub fn at(now: DateTime<Utc>) -> Self {
        ManualClock::new(now, SystemClock::utc().offset())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_date_of_respects_offset() {
        let utc = ManualClock::at(ts(23, 30));
        assert_eq!(utc.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let plus_two = ManualClock::new(ts(23, 30), FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(plus_two.today(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());

        let minus_five = ManualClock::new(ts(2, 0), FixedOffset::west_opt(5 * 3600).unwrap());
        assert_eq!(
            minus_five.today(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn test_day_bounds() {
        let clock = ManualClock::new(ts(0, 0), FixedOffset::east_opt(3600).unwrap());
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (from, to) = clock.day_bounds(day, day);
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap());
        assert_eq!(clock.date_of(from), day);
        assert_eq!(clock.date_of(to - Duration::seconds(1)), day);
    }

    #[test]
    fn test_manual_clock_moves() {
        let clock = ManualClock::at(ts(10, 0));
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), ts(11, 30));
        clock.set(ts(1, 0));
        assert_eq!(clock.now(), ts(1, 0));
    }
}
