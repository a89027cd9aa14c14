//! Welford running statistics

use {
    super::StatsError,
    serde::{Deserialize, Serialize},
};

/// Read-only snapshot of an [`OnlineStatistics`] accumulator.
///
/// An empty accumulator reports zero for every field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub count: u64,
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
    pub max: f64,
    pub min: f64,
}

/// Numerically stable running mean/variance/min/max in O(1) memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnlineStatistics {
    count: u64,
    mean: f64,
    m2: f64,
    max: f64,
    min: f64,
}

impl OnlineStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation.
    ///
    /// NaN and infinities are rejected, as are values whose update would
    /// overflow the running mean or spread. A rejected value leaves the
    /// accumulator untouched.
    pub fn observe(&mut self, value: f64) -> Result<(), StatsError> {
        let (mean, m2) = self.next_moments(value)?;

        self.count += 1;
        self.mean = mean;
        self.m2 = m2;

        if self.count == 1 {
            self.max = value;
            self.min = value;
        } else {
            if value > self.max {
                self.max = value;
            }
            if value < self.min {
                self.min = value;
            }
        }

        Ok(())
    }

    /// Whether `observe(value)` would succeed
    pub fn check(&self, value: f64) -> Result<(), StatsError> {
        self.next_moments(value).map(|_| ())
    }

    fn next_moments(&self, value: f64) -> Result<(f64, f64), StatsError> {
        if !value.is_finite() {
            return Err(StatsError::NonFinite(value));
        }

        let count = (self.count + 1) as f64;
        let delta = value - self.mean;
        let mean = self.mean + delta / count;
        let m2 = self.m2 + delta * (value - mean);
        if !(delta.is_finite() && mean.is_finite() && m2.is_finite()) {
            return Err(StatsError::Overflow(value));
        }
        Ok((mean, m2))
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; the divisor is floored at one so a single
    /// observation yields zero rather than NaN
    pub fn variance(&self) -> f64 {
        self.m2 / self.count.saturating_sub(1).max(1) as f64
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn summary(&self) -> StatisticalSummary {
        StatisticalSummary {
            count: self.count,
            mean: self.mean,
            variance: self.variance(),
            stddev: self.stddev(),
            max: self.max,
            min: self.min,
        }
    }
}
