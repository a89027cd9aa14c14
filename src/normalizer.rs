//! JSONL log records to events

use {
    crate::{
        sampling::EventParser,
        types::{Event, EventError},
    },
    serde::{Deserialize, Serialize},
};

/// One JSON object per line; `action` and `duration` are accepted as
/// aliases for access-log style producers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(alias = "action")]
    pub category: String,
    #[serde(alias = "duration")]
    pub measurement: f64,
}

impl LogRecord {
    /// Parse a LogRecord from a JSONL line
    pub fn from_jsonl(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn into_event(self, raw_text: &str) -> Result<Event, EventError> {
        Event::new(self.timestamp, self.category, self.measurement, raw_text)
    }
}

/// Reference upstream parser; malformed lines yield no event and are only
/// counted
#[derive(Debug, Default)]
pub struct JsonLineParser {
    malformed: u64,
}

impl JsonLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that were not a valid record
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

impl EventParser for JsonLineParser {
    fn parse(&mut self, line: &str) -> Option<Event> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        match LogRecord::from_jsonl(trimmed).map(|record| record.into_event(line)) {
            Ok(Ok(event)) => Some(event),
            _ => {
                self.malformed += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let line = r#"{"timestamp":1709647020000,"category":"/login","measurement":42.5}"#;

        let record = LogRecord::from_jsonl(line).unwrap();
        assert_eq!(record.timestamp, 1709647020000);
        assert_eq!(record.category, "/login");
        assert_eq!(record.measurement, 42.5);
    }

    #[test]
    fn test_parse_access_log_aliases() {
        let line = r#"{"timestamp":0,"action":"GET /","duration":3,"status":200}"#;

        let event = JsonLineParser::new().parse(line).unwrap();
        assert_eq!(event.category(), "GET /");
        assert_eq!(event.measurement(), 3.0);
        assert_eq!(event.raw_text(), line);
    }

    #[test]
    fn test_malformed_lines_counted() {
        let mut parser = JsonLineParser::new();

        assert!(parser.parse(r#"{"invalid": "json"#).is_none());
        assert!(parser.parse(r#"{"timestamp":0,"category":"a"}"#).is_none());
        assert!(parser.parse("   ").is_none());
        let out_of_range = r#"{"timestamp":9223372036854775807,"category":"a","measurement":1}"#;
        assert!(parser.parse(out_of_range).is_none());
        assert_eq!(parser.malformed(), 3);
    }
}
