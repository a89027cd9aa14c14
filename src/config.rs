//! Run configuration from environment variables or a JSON file
//!
//! Absent variables take their default. A variable that is present must
//! parse; a malformed value is a configuration error.

use {
    crate::{
        sampling::{EventParser, SamplingByFrequency, SamplingByTime, TimeUnit},
        stats::{AnomalyPredicate, PredicateType, TimeKey},
    },
    chrono::FixedOffset,
    serde::{Deserialize, Serialize},
    std::{env, fmt::Display, path::PathBuf, str::FromStr},
    thiserror::Error,
};

pub const DEFAULT_QUEUE_CAPACITY: usize = 5_000;

const MODE: &str = "LOGFLOW_MODE";
const QUEUE_CAPACITY: &str = "LOGFLOW_QUEUE_CAPACITY";
const STORE_ENTRIES: &str = "LOGFLOW_STORE_ENTRIES";
const SAMPLE_BY: &str = "LOGFLOW_SAMPLE_BY";
const SAMPLE_VALUE: &str = "LOGFLOW_SAMPLE_VALUE";
const SAMPLE_UNIT: &str = "LOGFLOW_SAMPLE_UNIT";
const PREDICATE: &str = "LOGFLOW_PREDICATE";
const PREDICATE_VALUE: &str = "LOGFLOW_PREDICATE_VALUE";
const GROUP_BY: &str = "LOGFLOW_GROUP_BY";
const UTC_OFFSET_MINUTES: &str = "LOGFLOW_UTC_OFFSET_MINUTES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value {0}")]
    MissingVariable(String),

    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: String, value: String },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("aggregator has no time key extraction scheme")]
    MissingExtractor,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Sync,
    #[default]
    Background,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" | "line_by_line" => Ok(RunMode::Sync),
            "background" => Ok(RunMode::Background),
            other => Err(ConfigError::InvalidValue {
                name: MODE.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleBy {
    #[default]
    None,
    Frequency,
    Time,
}

impl FromStr for SampleBy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(SampleBy::None),
            "frequency" => Ok(SampleBy::Frequency),
            "time" => Ok(SampleBy::Time),
            other => Err(ConfigError::InvalidValue {
                name: SAMPLE_BY.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration for a log analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Line-by-line or producer/consumer ingestion
    pub mode: RunMode,

    /// Bounded queue size for background ingestion (lines)
    pub queue_capacity: usize,

    /// Keep every accepted event in the snapshot
    pub store_entries: bool,

    pub sample_by: SampleBy,

    /// Every Nth event for frequency sampling, minimum gap for time sampling
    pub sample_value: Option<u64>,

    pub sample_unit: TimeUnit,

    pub predicate: PredicateType,

    /// Percentage threshold or standard deviation multiplier
    pub predicate_value: f64,

    /// Time breakdown key of the snapshot
    pub group_by: TimeKey,

    pub utc_offset_minutes: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Background,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            store_entries: false,
            sample_by: SampleBy::None,
            sample_value: None,
            sample_unit: TimeUnit::Minutes,
            predicate: PredicateType::Stdev,
            predicate_value: 1.0,
            group_by: TimeKey::DayOfMonth,
            utc_offset_minutes: 0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LOGFLOW_MODE` (default: background)
    /// - `LOGFLOW_QUEUE_CAPACITY` (default: 5000)
    /// - `LOGFLOW_STORE_ENTRIES` (default: false)
    /// - `LOGFLOW_SAMPLE_BY` none | frequency | time (default: none)
    /// - `LOGFLOW_SAMPLE_VALUE` (required when sampling)
    /// - `LOGFLOW_SAMPLE_UNIT` ms | s | min | h (default: min)
    /// - `LOGFLOW_PREDICATE` stdev | percentage (default: stdev)
    /// - `LOGFLOW_PREDICATE_VALUE` (default: 1.0)
    /// - `LOGFLOW_GROUP_BY` day_of_month | day_of_week (default: day_of_month)
    /// - `LOGFLOW_UTC_OFFSET_MINUTES` (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            mode: parse_or(&lookup, MODE, defaults.mode)?,
            queue_capacity: parse_or(&lookup, QUEUE_CAPACITY, defaults.queue_capacity)?,
            store_entries: parse_or(&lookup, STORE_ENTRIES, defaults.store_entries)?,
            sample_by: parse_or(&lookup, SAMPLE_BY, defaults.sample_by)?,
            sample_value: match lookup(SAMPLE_VALUE) {
                Some(raw) => Some(parse_value(SAMPLE_VALUE, &raw)?),
                None => None,
            },
            sample_unit: parse_or(&lookup, SAMPLE_UNIT, defaults.sample_unit)?,
            predicate: parse_or(&lookup, PREDICATE, defaults.predicate)?,
            predicate_value: parse_or(&lookup, PREDICATE_VALUE, defaults.predicate_value)?,
            group_by: parse_or(&lookup, GROUP_BY, defaults.group_by)?,
            utc_offset_minutes: parse_or(&lookup, UTC_OFFSET_MINUTES, defaults.utc_offset_minutes)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::NonPositive {
                name: "queue capacity",
                value: 0.0,
            });
        }
        if self.sample_by != SampleBy::None {
            match self.sample_value {
                None => return Err(ConfigError::MissingVariable(SAMPLE_VALUE.to_string())),
                Some(0) => {
                    return Err(ConfigError::NonPositive {
                        name: "sample value",
                        value: 0.0,
                    })
                }
                Some(_) => {}
            }
        }
        self.time_zone()?;
        self.build_predicate()?;
        Ok(())
    }

    pub fn time_zone(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: UTC_OFFSET_MINUTES.to_string(),
                value: self.utc_offset_minutes.to_string(),
            })
    }

    pub fn build_predicate(&self) -> Result<Box<dyn AnomalyPredicate>, ConfigError> {
        self.predicate.build(self.predicate_value)
    }

    /// Wrap `upstream` in the configured sampler, or return it unchanged
    pub fn build_sampler<P>(&self, upstream: P) -> Result<Box<dyn EventParser + Send>, ConfigError>
    where
        P: EventParser + Send + 'static,
    {
        let value = || {
            self.sample_value
                .ok_or_else(|| ConfigError::MissingVariable(SAMPLE_VALUE.to_string()))
        };

        Ok(match self.sample_by {
            SampleBy::None => Box::new(upstream),
            SampleBy::Frequency => Box::new(SamplingByFrequency::new(upstream, value()?)?),
            SampleBy::Time => Box::new(SamplingByTime::with_unit(
                upstream,
                value()?,
                self.sample_unit,
            )?),
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        log::debug!("{} rejected: {}", key, e);
        ConfigError::InvalidValue {
            name: key.to_string(),
            value: raw.to_string(),
        }
    })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
