use {
    super::EventParser,
    crate::{config::ConfigError, types::Event},
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[serde(alias = "ms")]
    Milliseconds,
    #[serde(alias = "s")]
    Seconds,
    #[default]
    #[serde(alias = "min")]
    Minutes,
    #[serde(alias = "h")]
    Hours,
}

impl TimeUnit {
    pub fn to_millis(&self, amount: u64) -> Option<i64> {
        let factor: u64 = match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
        };
        amount.checked_mul(factor).and_then(|ms| i64::try_from(ms).ok())
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ms" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "s" | "seconds" => Ok(TimeUnit::Seconds),
            "min" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hours" => Ok(TimeUnit::Hours),
            other => Err(ConfigError::InvalidValue {
                name: "time unit".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Decides whether `current` is far enough past `previous` to be sampled
pub trait TimeComparator {
    fn is_interval_apart(&self, previous: &Event, current: &Event) -> bool;
}

impl<F> TimeComparator for F
where
    F: Fn(&Event, &Event) -> bool,
{
    fn is_interval_apart(&self, previous: &Event, current: &Event) -> bool {
        self(previous, current)
    }
}

/// Strict timestamp gap comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalComparator {
    millis: i64,
}

impl IntervalComparator {
    pub fn new(amount: u64, unit: TimeUnit) -> Result<Self, ConfigError> {
        let millis = unit.to_millis(amount).ok_or_else(|| ConfigError::InvalidValue {
            name: "sampling interval".to_string(),
            value: format!("{amount} {unit:?}"),
        })?;
        if millis == 0 {
            return Err(ConfigError::NonPositive {
                name: "sampling interval",
                value: 0.0,
            });
        }
        Ok(Self { millis })
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }
}

impl TimeComparator for IntervalComparator {
    fn is_interval_apart(&self, previous: &Event, current: &Event) -> bool {
        current.timestamp().saturating_sub(previous.timestamp()) > self.millis
    }
}

/// Like [`SamplingByTime`](super::SamplingByTime) with the spacing decision
/// delegated to a [`TimeComparator`]. Remembers the last accepted event per
/// category.
pub struct GenericSamplingByTime<P, C> {
    upstream: P,
    comparator: C,
    last_accepted: HashMap<String, Event>,
}

impl<P, C> GenericSamplingByTime<P, C>
where
    P: EventParser,
    C: TimeComparator,
{
    pub fn new(upstream: P, comparator: C) -> Self {
        Self {
            upstream,
            comparator,
            last_accepted: HashMap::new(),
        }
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    pub fn upstream(&self) -> &P {
        &self.upstream
    }
}

impl<P, C> EventParser for GenericSamplingByTime<P, C>
where
    P: EventParser,
    C: TimeComparator,
{
    fn parse(&mut self, line: &str) -> Option<Event> {
        let event = self.upstream.parse(line)?;

        match self.last_accepted.get_mut(event.category()) {
            None => {
                self.last_accepted.insert(event.category().to_string(), event.clone());
                Some(event)
            }
            Some(previous) if self.comparator.is_interval_apart(previous, &event) => {
                *previous = event.clone();
                Some(event)
            }
            Some(_) => None,
        }
    }
}
