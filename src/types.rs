use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Reasons an upstream parser cannot build an [`Event`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("measurement must be finite, got {0}")]
    NonFiniteMeasurement(f64),

    #[error("timestamp {0}ms is outside the representable calendar range")]
    TimestampOutOfRange(i64),
}

/// A single timestamped log entry extracted from a line of text.
///
/// Events are immutable once built. The constructor rejects measurements
/// that are NaN or infinite and timestamps that cannot be mapped onto a
/// calendar date, so every aggregator downstream can assume both are valid.
/// Deserialization goes through the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventFields")]
pub struct Event {
    timestamp: i64,
    category: String,
    measurement: f64,
    raw_text: String,
}

impl Event {
    /// Build an event from epoch milliseconds, a category (action) key,
    /// a measurement (typically a duration in ms) and the original line.
    pub fn new(
        timestamp: i64,
        category: impl Into<String>,
        measurement: f64,
        raw_text: impl Into<String>,
    ) -> Result<Self, EventError> {
        if !measurement.is_finite() {
            return Err(EventError::NonFiniteMeasurement(measurement));
        }
        if DateTime::<Utc>::from_timestamp_millis(timestamp).is_none() {
            return Err(EventError::TimestampOutOfRange(timestamp));
        }

        Ok(Self {
            timestamp,
            category: category.into(),
            measurement,
            raw_text: raw_text.into(),
        })
    }

    /// Epoch milliseconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn measurement(&self) -> f64 {
        self.measurement
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }
}

/// Unchecked wire form of an [`Event`]
#[derive(Deserialize)]
struct EventFields {
    timestamp: i64,
    category: String,
    measurement: f64,
    raw_text: String,
}

impl TryFrom<EventFields> for Event {
    type Error = EventError;

    fn try_from(fields: EventFields) -> Result<Self, Self::Error> {
        Event::new(fields.timestamp, fields.category, fields.measurement, fields.raw_text)
    }
}
