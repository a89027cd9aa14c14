//! Time windows restricting which events reach the pipeline

use {
    crate::{
        config::ConfigError,
        sampling::EventParser,
        stats::time_key::{local_datetime, utc_offset},
        types::Event,
    },
    chrono::{FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc},
};

const DATE_FORMAT: &str = "%Y/%m/%d";
const OPEN_BOUND_YEARS: u32 = 100;

pub trait TimeWindow {
    fn contains(&self, timestamp_ms: i64) -> bool;
}

/// Accepts every timestamp
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyTime;

impl TimeWindow for AnyTime {
    fn contains(&self, _timestamp_ms: i64) -> bool {
        true
    }
}

/// Strictly between two clock times (`HH:mm`) on the event's own day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDayWindow {
    begin: NaiveTime,
    end: NaiveTime,
    zone: FixedOffset,
}

impl TimeOfDayWindow {
    pub fn new(begin: NaiveTime, end: NaiveTime, zone: FixedOffset) -> Self {
        Self { begin, end, zone }
    }

    pub fn parse(begin: &str, end: &str, zone: FixedOffset) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_clock(begin)?, parse_clock(end)?, zone))
    }
}

impl TimeWindow for TimeOfDayWindow {
    fn contains(&self, timestamp_ms: i64) -> bool {
        local_datetime(timestamp_ms, &self.zone)
            .map(|local| {
                let time = local.time();
                time > self.begin && time < self.end
            })
            .unwrap_or(false)
    }
}

/// `H:mm` or `HH:mm`
fn parse_clock(value: &str) -> Result<NaiveTime, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        name: "time of day (HH:mm)".to_string(),
        value: value.to_string(),
    };
    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Strictly after midnight of `after` and strictly before midnight of
/// `before`, in the window's time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    after: NaiveDateTime,
    before: NaiveDateTime,
    zone: FixedOffset,
}

impl DateWindow {
    pub fn new(after: NaiveDate, before: NaiveDate, zone: FixedOffset) -> Self {
        Self {
            after: after.and_time(NaiveTime::MIN),
            before: before.and_time(NaiveTime::MIN),
            zone,
        }
    }

    /// Parse `yyyy/MM/dd` bounds; an empty bound is 100 years from today in
    /// its direction
    pub fn parse(after: &str, before: &str, zone: FixedOffset) -> Result<Self, ConfigError> {
        let today = Utc::now().with_timezone(&zone).date_naive();
        let after = match after.trim() {
            "" => today
                .checked_sub_months(Months::new(12 * OPEN_BOUND_YEARS))
                .unwrap_or(NaiveDate::MIN),
            value => parse_date(value)?,
        };
        let before = match before.trim() {
            "" => today
                .checked_add_months(Months::new(12 * OPEN_BOUND_YEARS))
                .unwrap_or(NaiveDate::MAX),
            value => parse_date(value)?,
        };
        Ok(Self::new(after, before, zone))
    }

    pub fn utc(after: NaiveDate, before: NaiveDate) -> Self {
        Self::new(after, before, utc_offset())
    }
}

impl TimeWindow for DateWindow {
    fn contains(&self, timestamp_ms: i64) -> bool {
        local_datetime(timestamp_ms, &self.zone)
            .map(|local| {
                let local = local.naive_local();
                local > self.after && local < self.before
            })
            .unwrap_or(false)
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| ConfigError::InvalidValue {
        name: "date (yyyy/MM/dd)".to_string(),
        value: value.to_string(),
    })
}

/// Forwards only upstream events whose timestamp lies inside `window`
pub struct WindowedParser<P, W> {
    upstream: P,
    window: W,
}

impl<P, W> WindowedParser<P, W>
where
    P: EventParser,
    W: TimeWindow,
{
    pub fn new(upstream: P, window: W) -> Self {
        Self { upstream, window }
    }

    pub fn window(&self) -> &W {
        &self.window
    }
}

impl<P, W> EventParser for WindowedParser<P, W>
where
    P: EventParser,
    W: TimeWindow,
{
    fn parse(&mut self, line: &str) -> Option<Event> {
        self.upstream
            .parse(line)
            .filter(|event| self.window.contains(event.timestamp()))
    }
}
