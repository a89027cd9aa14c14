use {
    super::{OnlineStatistics, StatisticalSummary, StatsError, TimeKeyExtractor},
    crate::types::Event,
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Per-category overview: how many buckets exist, how many observations an
/// average bucket holds (integer division), and the mean of bucket means
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub buckets: usize,
    pub avg_count: u64,
    pub avg_mean: f64,
}

impl BucketSummary {
    pub fn from_stats<'a>(stats: impl IntoIterator<Item = &'a OnlineStatistics>) -> Self {
        let mut buckets = 0usize;
        let mut total_count = 0u64;
        let mut sum_of_means = 0.0;

        for s in stats {
            buckets += 1;
            total_count += s.count();
            sum_of_means += s.mean();
        }

        if buckets == 0 {
            return Self::default();
        }

        Self {
            buckets,
            avg_count: total_count / buckets as u64,
            avg_mean: sum_of_means / buckets as f64,
        }
    }
}

/// Groups measurements by one calendar key; buckets appear on first use
#[derive(Debug, Clone)]
pub struct TimeBucketAggregator {
    extractor: TimeKeyExtractor,
    buckets: BTreeMap<u32, OnlineStatistics>,
}

impl TimeBucketAggregator {
    pub fn new(extractor: TimeKeyExtractor) -> Self {
        Self {
            extractor,
            buckets: BTreeMap::new(),
        }
    }

    pub fn extractor(&self) -> TimeKeyExtractor {
        self.extractor
    }

    pub fn add(&mut self, event: &Event) -> Result<(), StatsError> {
        let timestamp = event.timestamp();
        let key = self
            .extractor
            .extract(timestamp)
            .ok_or(StatsError::UnmappableTimestamp(timestamp, self.extractor.key().as_str()))?;
        self.record(key, event.measurement())
    }

    /// Whether `record(key, value)` would succeed, without recording
    pub fn check(&self, key: u32, value: f64) -> Result<(), StatsError> {
        match self.buckets.get(&key) {
            Some(stats) => stats.check(value),
            None => OnlineStatistics::new().check(value),
        }
    }

    /// Record a value under an already extracted key
    pub fn record(&mut self, key: u32, value: f64) -> Result<(), StatsError> {
        if !value.is_finite() {
            return Err(StatsError::NonFinite(value));
        }
        self.buckets.entry(key).or_default().observe(value)
    }

    pub fn get(&self, key: u32) -> Option<StatisticalSummary> {
        self.buckets.get(&key).map(OnlineStatistics::summary)
    }

    pub fn stats(&self, key: u32) -> Option<&OnlineStatistics> {
        self.buckets.get(&key)
    }

    /// Buckets in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &OnlineStatistics)> + '_ {
        self.buckets.iter().map(|(k, s)| (*k, s))
    }

    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.buckets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.values().map(OnlineStatistics::count).sum()
    }

    pub fn summary(&self) -> BucketSummary {
        BucketSummary::from_stats(self.buckets.values())
    }
}
