use {
    super::{EventParser, TimeUnit},
    crate::{config::ConfigError, types::Event},
    std::{collections::HashMap, time::Duration},
};

/// Keeps an event only when it is more than `threshold` after the last
/// event kept for the same category.
pub struct SamplingByTime<P> {
    upstream: P,
    threshold_ms: i64,
    last_accepted: HashMap<String, i64>,
}

impl<P: EventParser> SamplingByTime<P> {
    pub fn new(upstream: P, threshold: Duration) -> Result<Self, ConfigError> {
        let threshold_ms =
            i64::try_from(threshold.as_millis()).map_err(|_| ConfigError::InvalidValue {
                name: "sampling threshold".to_string(),
                value: format!("{threshold:?}"),
            })?;
        if threshold_ms <= 0 {
            return Err(ConfigError::NonPositive {
                name: "sampling threshold",
                value: threshold_ms as f64,
            });
        }

        Ok(Self {
            upstream,
            threshold_ms,
            last_accepted: HashMap::new(),
        })
    }

    pub fn with_unit(upstream: P, amount: u64, unit: TimeUnit) -> Result<Self, ConfigError> {
        let millis = unit.to_millis(amount).ok_or_else(|| ConfigError::InvalidValue {
            name: "sampling threshold".to_string(),
            value: format!("{amount} {unit:?}"),
        })?;
        Self::new(upstream, Duration::from_millis(millis as u64))
    }

    pub fn threshold_ms(&self) -> i64 {
        self.threshold_ms
    }

    pub fn upstream(&self) -> &P {
        &self.upstream
    }
}

impl<P: EventParser> EventParser for SamplingByTime<P> {
    fn parse(&mut self, line: &str) -> Option<Event> {
        let event = self.upstream.parse(line)?;
        let ts = event.timestamp();

        match self.last_accepted.get_mut(event.category()) {
            None => {
                self.last_accepted.insert(event.category().to_string(), ts);
                Some(event)
            }
            Some(last) if ts.saturating_sub(*last) > self.threshold_ms => {
                *last = ts;
                Some(event)
            }
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::test_support::{accepted, csv_parser};

    #[test]
    fn test_threshold_must_be_positive() {
        assert!(SamplingByTime::new(csv_parser(), Duration::ZERO).is_err());
        // sub-millisecond rounds down to zero
        assert!(SamplingByTime::new(csv_parser(), Duration::from_micros(500)).is_err());
        assert!(SamplingByTime::with_unit(csv_parser(), 0, TimeUnit::Minutes).is_err());
        assert_eq!(
            SamplingByTime::with_unit(csv_parser(), 2, TimeUnit::Seconds)
                .unwrap()
                .threshold_ms(),
            2_000
        );
    }

    #[test]
    fn test_difference_at_threshold_rejected() {
        let mut sampler = SamplingByTime::new(csv_parser(), Duration::from_millis(100)).unwrap();

        assert!(sampler.parse("a,1000,1").is_some());
        assert!(sampler.parse("a,1100,1").is_none());
        assert!(sampler.parse("a,1101,1").is_some());
    }

    #[test]
    fn test_reference_moves_only_on_acceptance() {
        let mut sampler = SamplingByTime::new(csv_parser(), Duration::from_millis(100)).unwrap();
        let lines = ["a,0,1", "a,60,1", "a,120,1", "a,170,1", "a,221,1"];

        // 60 rejected (reference stays 0), 120 accepted, 170 rejected, 221 accepted
        assert_eq!(accepted(&mut sampler, &lines), vec![0, 2, 4]);
    }

    #[test]
    fn test_first_event_per_category_always_accepted() {
        let mut sampler = SamplingByTime::new(csv_parser(), Duration::from_secs(3_600)).unwrap();
        let lines = ["a,0,1", "b,1,1", "a,2,1", "c,3,1", "b,4,1"];

        assert_eq!(accepted(&mut sampler, &lines), vec![0, 1, 3]);
    }

    #[test]
    fn test_unparsed_line_propagates_none() {
        let mut sampler = SamplingByTime::new(csv_parser(), Duration::from_millis(1)).unwrap();

        assert!(sampler.parse("").is_none());
        assert!(sampler.parse("a,0,1").is_some());
    }
}
