use {
    super::EventParser,
    crate::{config::ConfigError, types::Event},
    std::collections::HashMap,
};

/// Systematic sampling per category: the first event of a category is kept,
/// then every `interval`-th one after it.
pub struct SamplingByFrequency<P> {
    upstream: P,
    interval: u64,
    counters: HashMap<String, u64>,
}

impl<P: EventParser> SamplingByFrequency<P> {
    pub fn new(upstream: P, interval: u64) -> Result<Self, ConfigError> {
        if interval == 0 {
            return Err(ConfigError::NonPositive {
                name: "sampling frequency",
                value: 0.0,
            });
        }
        Ok(Self {
            upstream,
            interval,
            counters: HashMap::new(),
        })
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn upstream(&self) -> &P {
        &self.upstream
    }

    pub fn into_inner(self) -> P {
        self.upstream
    }
}

impl<P: EventParser> EventParser for SamplingByFrequency<P> {
    fn parse(&mut self, line: &str) -> Option<Event> {
        let event = self.upstream.parse(line)?;

        match self.counters.get_mut(event.category()) {
            None => {
                self.counters.insert(event.category().to_string(), 0);
                Some(event)
            }
            Some(counter) => {
                *counter += 1;
                if *counter >= self.interval {
                    *counter = 0;
                    Some(event)
                } else {
                    None
                }
            }
        }
    }
}
