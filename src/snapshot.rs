//! Whole-run collector: counts, per-category extremes and a time breakdown

use {
    crate::{
        config::{ConfigError, PipelineConfig},
        pipeline::{RunStats, Subscriber},
        stats::{OnlineStatistics, StatisticalSummary, StatsError, TimeKeyExtractor},
        types::Event,
    },
    serde::Serialize,
    std::collections::BTreeMap,
};

/// Statistics for one category (action)
#[derive(Debug, Clone)]
pub struct ActionStats {
    stats: OnlineStatistics,
    maxima: Event,
    minima: Event,
    earliest: Event,
    latest: Event,
    time_breakdown: BTreeMap<u32, u64>,
}

impl ActionStats {
    fn new(event: &Event) -> Self {
        Self {
            stats: OnlineStatistics::new(),
            maxima: event.clone(),
            minima: event.clone(),
            earliest: event.clone(),
            latest: event.clone(),
            time_breakdown: BTreeMap::new(),
        }
    }

    /// Callers check the measurement against `stats` first
    fn add(&mut self, event: &Event, time_key: Option<u32>) -> Result<(), StatsError> {
        self.stats.observe(event.measurement())?;
        // ties keep the first event seen
        if event.measurement() > self.maxima.measurement() {
            self.maxima = event.clone();
        }
        if event.measurement() < self.minima.measurement() {
            self.minima = event.clone();
        }
        if event.timestamp() < self.earliest.timestamp() {
            self.earliest = event.clone();
        }
        if event.timestamp() >= self.latest.timestamp() {
            self.latest = event.clone();
        }
        if let Some(key) = time_key {
            *self.time_breakdown.entry(key).or_insert(0) += 1;
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.stats.count()
    }

    pub fn mean(&self) -> f64 {
        self.stats.mean()
    }

    pub fn deviation(&self) -> f64 {
        self.stats.stddev()
    }

    pub fn summary(&self) -> StatisticalSummary {
        self.stats.summary()
    }

    pub fn maxima(&self) -> &Event {
        &self.maxima
    }

    pub fn minima(&self) -> &Event {
        &self.minima
    }

    pub fn earliest(&self) -> &Event {
        &self.earliest
    }

    pub fn latest(&self) -> &Event {
        &self.latest
    }

    pub fn time_breakdown(&self) -> &BTreeMap<u32, u64> {
        &self.time_breakdown
    }
}

/// Subscriber collecting a summary of everything a run accepted
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    group_by: TimeKeyExtractor,
    store_entries: bool,
    entries: Vec<Event>,
    accepted: u64,
    skipped: u64,
    total_lines: u64,
    overall: OnlineStatistics,
    summary: BTreeMap<String, u64>,
    time_breakdown: BTreeMap<u32, u64>,
    actions: BTreeMap<String, ActionStats>,
}

impl LogSnapshot {
    pub fn new(group_by: TimeKeyExtractor, store_entries: bool) -> Self {
        Self {
            group_by,
            store_entries,
            entries: Vec::new(),
            accepted: 0,
            skipped: 0,
            total_lines: 0,
            overall: OnlineStatistics::new(),
            summary: BTreeMap::new(),
            time_breakdown: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            TimeKeyExtractor::new(config.group_by, config.time_zone()?),
            config.store_entries,
        ))
    }

    /// Add the line count of a finished run; the snapshot only sees
    /// accepted events on its own
    pub fn record_run(&mut self, stats: RunStats) {
        self.total_lines += stats.total_lines;
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Events the statistics could not absorb
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// Stored events, empty unless entry storage is enabled
    pub fn entries(&self) -> &[Event] {
        &self.entries
    }

    pub fn overall(&self) -> StatisticalSummary {
        self.overall.summary()
    }

    /// Accepted events per category
    pub fn summary(&self) -> &BTreeMap<String, u64> {
        &self.summary
    }

    /// Accepted events per group-by key
    pub fn time_breakdown(&self) -> &BTreeMap<u32, u64> {
        &self.time_breakdown
    }

    pub fn action(&self, category: &str) -> Option<&ActionStats> {
        self.actions.get(category)
    }

    pub fn actions(&self) -> impl Iterator<Item = (&str, &ActionStats)> + '_ {
        self.actions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn group_by(&self) -> TimeKeyExtractor {
        self.group_by
    }

    pub fn share_of_accepted(&self, count: u64) -> f64 {
        share(count, self.accepted)
    }

    pub fn share_of_total(&self, count: u64) -> f64 {
        share(count, self.total_lines)
    }

    pub fn report(&self) -> SnapshotReport<'_> {
        SnapshotReport {
            total_lines: self.total_lines,
            accepted: self.accepted,
            overall: self.overall.summary(),
            summary: &self.summary,
            time_breakdown: &self.time_breakdown,
            stats: self
                .actions
                .iter()
                .map(|(category, action)| {
                    (
                        category.as_str(),
                        ActionReport {
                            stats: action.summary(),
                            maxima: &action.maxima,
                            minima: &action.minima,
                            earliest: &action.earliest,
                            latest: &action.latest,
                            time_breakdown: &action.time_breakdown,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.report())
    }
}

fn share(count: u64, of: u64) -> f64 {
    if of == 0 {
        0.0
    } else {
        count as f64 / of as f64
    }
}

impl Subscriber for LogSnapshot {
    fn consume(&mut self, event: &Event) {
        let value = event.measurement();
        let action_fits = match self.actions.get(event.category()) {
            Some(action) => action.stats.check(value),
            None => Ok(()),
        };
        let recorded = self.overall.check(value).and(action_fits).and_then(|_| {
            let time_key = self.group_by.extract(event.timestamp());
            self.actions
                .entry(event.category().to_string())
                .or_insert_with(|| ActionStats::new(event))
                .add(event, time_key)?;
            self.overall.observe(value)?;
            Ok(time_key)
        });

        let time_key = match recorded {
            Ok(time_key) => time_key,
            Err(e) => {
                self.skipped += 1;
                log::warn!("⚠️  Snapshot skipped {} event: {}", event.category(), e);
                return;
            }
        };

        self.accepted += 1;
        if let Some(key) = time_key {
            *self.time_breakdown.entry(key).or_insert(0) += 1;
        }
        *self.summary.entry(event.category().to_string()).or_insert(0) += 1;

        if self.store_entries {
            self.entries.push(event.clone());
        }
    }
}

/// Serializable view of a [`LogSnapshot`]
#[derive(Debug, Serialize)]
pub struct SnapshotReport<'a> {
    pub total_lines: u64,
    pub accepted: u64,
    pub overall: StatisticalSummary,
    pub summary: &'a BTreeMap<String, u64>,
    pub time_breakdown: &'a BTreeMap<u32, u64>,
    pub stats: BTreeMap<&'a str, ActionReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ActionReport<'a> {
    pub stats: StatisticalSummary,
    pub maxima: &'a Event,
    pub minima: &'a Event,
    pub earliest: &'a Event,
    pub latest: &'a Event,
    pub time_breakdown: &'a BTreeMap<u32, u64>,
}
