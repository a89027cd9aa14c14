use {
    crate::config::ConfigError,
    chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc},
    serde::{Deserialize, Serialize},
};

/// Calendar field used as a bucket key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeKey {
    /// 1..=31
    DayOfMonth,
    /// 1 = Sunday .. 7 = Saturday
    DayOfWeek,
    /// 0..=23
    HourOfDay,
    /// 0..=59
    Minute,
    /// yyyymmdd
    Date,
}

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

impl TimeKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeKey::DayOfMonth => "day_of_month",
            TimeKey::DayOfWeek => "day_of_week",
            TimeKey::HourOfDay => "hour_of_day",
            TimeKey::Minute => "minute",
            TimeKey::Date => "date",
        }
    }

    pub fn extract(&self, timestamp_ms: i64, zone: &FixedOffset) -> Option<u32> {
        let local = local_datetime(timestamp_ms, zone)?;
        match self {
            TimeKey::DayOfMonth => Some(local.day()),
            TimeKey::DayOfWeek => Some(local.weekday().number_from_sunday()),
            TimeKey::HourOfDay => Some(local.hour()),
            TimeKey::Minute => Some(local.minute()),
            TimeKey::Date => {
                let year = u32::try_from(local.year()).ok()?;
                Some(year * 10_000 + local.month() * 100 + local.day())
            }
        }
    }

    /// Human label for a key value, e.g. `Tue` or `14:00`
    pub fn label(&self, key: u32) -> String {
        match self {
            TimeKey::DayOfWeek => WEEKDAY_NAMES
                .get(key.wrapping_sub(1) as usize)
                .map(|s| s.to_string())
                .unwrap_or_else(|| key.to_string()),
            TimeKey::HourOfDay => format!("{key:02}:00"),
            TimeKey::Minute => format!(":{key:02}"),
            TimeKey::DayOfMonth | TimeKey::Date => key.to_string(),
        }
    }
}

impl std::str::FromStr for TimeKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day_of_month" => Ok(TimeKey::DayOfMonth),
            "day_of_week" => Ok(TimeKey::DayOfWeek),
            "hour_of_day" => Ok(TimeKey::HourOfDay),
            "minute" => Ok(TimeKey::Minute),
            "date" => Ok(TimeKey::Date),
            other => Err(ConfigError::InvalidValue {
                name: "time key".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

pub fn local_datetime(timestamp_ms: i64, zone: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|utc| utc.with_timezone(zone))
}

/// A [`TimeKey`] bound to the time zone it is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeKeyExtractor {
    key: TimeKey,
    zone: FixedOffset,
}

impl TimeKeyExtractor {
    pub fn new(key: TimeKey, zone: FixedOffset) -> Self {
        Self { key, zone }
    }

    pub fn utc(key: TimeKey) -> Self {
        Self::new(key, utc_offset())
    }

    pub fn key(&self) -> TimeKey {
        self.key
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    pub fn extract(&self, timestamp_ms: i64) -> Option<u32> {
        self.key.extract(timestamp_ms, &self.zone)
    }
}

pub(crate) fn utc_offset() -> FixedOffset {
    Utc.fix()
}
