//! Category -> time bucket aggregation
//!
//! One parameterised aggregator covers the day, weekday, hour and minute
//! views. Two-level schemes bucket by day of month first and then by hour or
//! minute inside that day.

use {
    super::{
        predicate::{scan_buckets, AnomalyPredicate, AnomalyReport, FlaggedBucket},
        time_key::utc_offset,
        BucketSummary, OnlineStatistics, StatisticalSummary, StatsError, TimeBucketAggregator,
        TimeKey, TimeKeyExtractor,
    },
    crate::{config::ConfigError, pipeline::Subscriber, types::Event},
    chrono::FixedOffset,
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketScheme {
    DayOfMonth,
    DayOfWeek,
    HourOfDay,
    Minute,
    DayAndHour,
    DayAndMinute,
}

impl BucketScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketScheme::DayOfMonth => "day_of_month",
            BucketScheme::DayOfWeek => "day_of_week",
            BucketScheme::HourOfDay => "hour_of_day",
            BucketScheme::Minute => "minute",
            BucketScheme::DayAndHour => "day_and_hour",
            BucketScheme::DayAndMinute => "day_and_minute",
        }
    }

    /// Key of the outer (day) level, for two-level schemes only
    pub fn outer(&self) -> Option<TimeKey> {
        match self {
            BucketScheme::DayAndHour | BucketScheme::DayAndMinute => Some(TimeKey::DayOfMonth),
            _ => None,
        }
    }

    pub fn inner(&self) -> TimeKey {
        match self {
            BucketScheme::DayOfMonth => TimeKey::DayOfMonth,
            BucketScheme::DayOfWeek => TimeKey::DayOfWeek,
            BucketScheme::HourOfDay | BucketScheme::DayAndHour => TimeKey::HourOfDay,
            BucketScheme::Minute | BucketScheme::DayAndMinute => TimeKey::Minute,
        }
    }

    pub fn bucket_key(
        &self,
        timestamp_ms: i64,
        zone: &FixedOffset,
    ) -> Result<BucketKey, StatsError> {
        let extract = |key: TimeKey| {
            key.extract(timestamp_ms, zone)
                .ok_or(StatsError::UnmappableTimestamp(timestamp_ms, key.as_str()))
        };

        let day = match self.outer() {
            Some(outer) => Some(extract(outer)?),
            None => None,
        };
        Ok(BucketKey {
            day,
            key: extract(self.inner())?,
        })
    }
}

impl std::str::FromStr for BucketScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day_of_month" | "day" => Ok(BucketScheme::DayOfMonth),
            "day_of_week" | "weekday" => Ok(BucketScheme::DayOfWeek),
            "hour_of_day" | "hour" => Ok(BucketScheme::HourOfDay),
            "minute" => Ok(BucketScheme::Minute),
            "day_and_hour" => Ok(BucketScheme::DayAndHour),
            "day_and_minute" => Ok(BucketScheme::DayAndMinute),
            other => Err(ConfigError::InvalidValue {
                name: "bucket scheme".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Position of a bucket inside a category. `day` is only set for two-level
/// schemes; ordering is chronological (day first, then key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub day: Option<u32>,
    pub key: u32,
}

impl BucketKey {
    pub fn flat(key: u32) -> Self {
        Self { day: None, key }
    }

    pub fn nested(day: u32, key: u32) -> Self {
        Self { day: Some(day), key }
    }
}

/// Read-only bucket view for one category
#[derive(Debug, Clone)]
pub enum CategoryBuckets {
    Flat(TimeBucketAggregator),
    ByDay {
        inner: TimeKeyExtractor,
        days: BTreeMap<u32, TimeBucketAggregator>,
    },
}

impl CategoryBuckets {
    fn new(scheme: BucketScheme, zone: FixedOffset) -> Self {
        let inner = TimeKeyExtractor::new(scheme.inner(), zone);
        match scheme.outer() {
            Some(_) => CategoryBuckets::ByDay {
                inner,
                days: BTreeMap::new(),
            },
            None => CategoryBuckets::Flat(TimeBucketAggregator::new(inner)),
        }
    }

    fn record(&mut self, key: BucketKey, value: f64) -> Result<(), StatsError> {
        match (self, key.day) {
            (CategoryBuckets::Flat(agg), _) => agg.record(key.key, value),
            (CategoryBuckets::ByDay { inner, days }, day) => days
                .entry(day.unwrap_or_default())
                .or_insert_with(|| TimeBucketAggregator::new(*inner))
                .record(key.key, value),
        }
    }

    /// Buckets in chronological order
    pub fn iter(&self) -> Box<dyn Iterator<Item = (BucketKey, &OnlineStatistics)> + '_> {
        match self {
            CategoryBuckets::Flat(agg) => {
                Box::new(agg.iter().map(|(k, s)| (BucketKey::flat(k), s)))
            }
            CategoryBuckets::ByDay { days, .. } => Box::new(days.iter().flat_map(|(day, agg)| {
                let day = *day;
                agg.iter().map(move |(k, s)| (BucketKey::nested(day, k), s))
            })),
        }
    }

    pub fn get(&self, key: BucketKey) -> Option<StatisticalSummary> {
        match (self, key.day) {
            (CategoryBuckets::Flat(agg), None) => agg.get(key.key),
            (CategoryBuckets::ByDay { days, .. }, Some(day)) => days.get(&day)?.get(key.key),
            _ => None,
        }
    }

    pub fn as_flat(&self) -> Option<&TimeBucketAggregator> {
        match self {
            CategoryBuckets::Flat(agg) => Some(agg),
            CategoryBuckets::ByDay { .. } => None,
        }
    }

    /// Inner aggregator for one day of a two-level view
    pub fn day(&self, day: u32) -> Option<&TimeBucketAggregator> {
        match self {
            CategoryBuckets::Flat(_) => None,
            CategoryBuckets::ByDay { days, .. } => days.get(&day),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CategoryBuckets::Flat(agg) => agg.len(),
            CategoryBuckets::ByDay { days, .. } => {
                days.values().map(TimeBucketAggregator::len).sum()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_count(&self) -> u64 {
        self.iter().map(|(_, s)| s.count()).sum()
    }

    pub fn summary(&self) -> BucketSummary {
        BucketSummary::from_stats(self.iter().map(|(_, s)| s))
    }
}

/// Aggregates events per category and then per time bucket.
///
/// Not internally synchronised: one instance belongs to one pipeline run.
#[derive(Debug, Clone)]
pub struct HierarchicalAggregator {
    scheme: BucketScheme,
    zone: FixedOffset,
    categories: BTreeMap<String, CategoryBuckets>,
    overall: Option<TimeBucketAggregator>,
    rejected: u64,
}

#[derive(Debug, Clone)]
pub struct HierarchicalAggregatorBuilder {
    scheme: Option<BucketScheme>,
    zone: FixedOffset,
    track_overall: Option<bool>,
}

impl Default for HierarchicalAggregatorBuilder {
    fn default() -> Self {
        Self {
            scheme: None,
            zone: utc_offset(),
            track_overall: None,
        }
    }
}

impl HierarchicalAggregatorBuilder {
    pub fn scheme(mut self, scheme: BucketScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn time_zone(mut self, zone: FixedOffset) -> Self {
        self.zone = zone;
        self
    }

    /// Keep a cross-category aggregate keyed by day of week. On by default
    /// for the weekday scheme only.
    pub fn track_overall(mut self, enabled: bool) -> Self {
        self.track_overall = Some(enabled);
        self
    }

    pub fn build(self) -> Result<HierarchicalAggregator, ConfigError> {
        let scheme = self.scheme.ok_or(ConfigError::MissingExtractor)?;
        let track_overall = self
            .track_overall
            .unwrap_or(scheme == BucketScheme::DayOfWeek);

        Ok(HierarchicalAggregator {
            scheme,
            zone: self.zone,
            categories: BTreeMap::new(),
            overall: track_overall.then(|| {
                TimeBucketAggregator::new(TimeKeyExtractor::new(TimeKey::DayOfWeek, self.zone))
            }),
            rejected: 0,
        })
    }
}

impl HierarchicalAggregator {
    pub fn builder() -> HierarchicalAggregatorBuilder {
        HierarchicalAggregatorBuilder::default()
    }

    pub fn new(scheme: BucketScheme, zone: FixedOffset) -> Self {
        Self {
            scheme,
            zone,
            categories: BTreeMap::new(),
            overall: (scheme == BucketScheme::DayOfWeek).then(|| {
                TimeBucketAggregator::new(TimeKeyExtractor::new(TimeKey::DayOfWeek, zone))
            }),
            rejected: 0,
        }
    }

    pub fn scheme(&self) -> BucketScheme {
        self.scheme
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    pub fn add(&mut self, event: &Event) -> Result<(), StatsError> {
        let value = event.measurement();
        if !value.is_finite() {
            return Err(StatsError::NonFinite(value));
        }

        let (scheme, zone) = (self.scheme, self.zone);
        let timestamp = event.timestamp();
        let key = scheme.bucket_key(timestamp, &zone)?;
        let overall_key = match &self.overall {
            Some(overall) => {
                let weekday = overall.extractor().extract(timestamp).ok_or(
                    StatsError::UnmappableTimestamp(timestamp, TimeKey::DayOfWeek.as_str()),
                )?;
                // the category and overall buckets take the event together or not at all
                overall.check(weekday, value)?;
                Some(weekday)
            }
            None => None,
        };

        match self.categories.get_mut(event.category()) {
            Some(buckets) => buckets.record(key, value)?,
            None => {
                let mut buckets = CategoryBuckets::new(scheme, zone);
                buckets.record(key, value)?;
                self.categories.insert(event.category().to_string(), buckets);
            }
        }

        if let (Some(overall), Some(weekday)) = (self.overall.as_mut(), overall_key) {
            overall.record(weekday, value)?;
        }

        Ok(())
    }

    pub fn buckets_for(&self, category: &str) -> Option<&CategoryBuckets> {
        self.categories.get(category)
    }

    /// Categories in ascending order
    pub fn categories(&self) -> impl Iterator<Item = (&str, &CategoryBuckets)> + '_ {
        self.categories.iter().map(|(c, b)| (c.as_str(), b))
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn summary(&self, category: &str) -> Option<BucketSummary> {
        self.categories.get(category).map(CategoryBuckets::summary)
    }

    /// Weekday aggregate across every category, when tracked
    pub fn overall(&self) -> Option<&TimeBucketAggregator> {
        self.overall.as_ref()
    }

    /// Events a subscriber call could not record
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Scan each category's buckets chronologically and collect the ones the
    /// predicate flags. Categories without anomalies are left out.
    pub fn filter(&self, predicate: &dyn AnomalyPredicate) -> AnomalyReport {
        let mut report = AnomalyReport::new();
        for (category, buckets) in &self.categories {
            let flagged = scan_buckets(buckets.iter(), predicate);
            if !flagged.is_empty() {
                report.insert(category.clone(), flagged);
            }
        }
        report
    }

    /// Same scan over the cross-category weekday aggregate
    pub fn filter_overall(&self, predicate: &dyn AnomalyPredicate) -> Vec<FlaggedBucket> {
        match &self.overall {
            Some(overall) => {
                let buckets = overall.iter().map(|(k, s)| (BucketKey::flat(k), s));
                scan_buckets(buckets, predicate)
            }
            None => Vec::new(),
        }
    }
}

impl Subscriber for HierarchicalAggregator {
    fn consume(&mut self, event: &Event) {
        if let Err(e) = self.add(event) {
            self.rejected += 1;
            log::warn!("⚠️  {} aggregator skipped event: {}", self.scheme.as_str(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{PercentagePredicate, StandardDeviationPredicate};
    use chrono::NaiveDate;

    fn ms(d: u32, h: u32, mi: u32) -> i64 {
        // March 2024: the 3rd is a Sunday
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn event(category: &str, ts: i64, value: f64) -> Event {
        Event::new(ts, category, value, "").unwrap()
    }

    fn utc() -> FixedOffset {
        utc_offset()
    }

    #[test]
    fn test_builder_requires_scheme() {
        assert!(matches!(
            HierarchicalAggregator::builder().build(),
            Err(ConfigError::MissingExtractor)
        ));
        assert!(HierarchicalAggregator::builder()
            .scheme(BucketScheme::HourOfDay)
            .build()
            .is_ok());
    }

    #[test]
    fn test_day_scheme_counts_per_category() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayOfMonth, utc());
        for (i, category) in ["A", "B", "A", "B", "A", "B"].iter().enumerate() {
            agg.add(&event(category, ms(5, i as u32, 0), 10.0)).unwrap();
        }
        agg.add(&event("A", ms(6, 0, 0), 10.0)).unwrap();

        assert_eq!(agg.category_count(), 2);
        let a = agg.buckets_for("A").unwrap();
        assert_eq!(a.total_count(), 4);
        assert_eq!(a.get(BucketKey::flat(5)).unwrap().count, 3);
        assert_eq!(a.as_flat().unwrap().keys().collect::<Vec<_>>(), vec![5, 6]);
        assert_eq!(agg.buckets_for("B").unwrap().total_count(), 3);
        assert!(agg.buckets_for("C").is_none());
    }

    #[test]
    fn test_two_level_scheme_nests_by_day() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayAndHour, utc());
        agg.add(&event("A", ms(6, 9, 15), 1.0)).unwrap();
        agg.add(&event("A", ms(5, 14, 0), 2.0)).unwrap();
        agg.add(&event("A", ms(5, 9, 59), 3.0)).unwrap();
        agg.add(&event("A", ms(5, 9, 1), 5.0)).unwrap();

        let a = agg.buckets_for("A").unwrap();
        let keys: Vec<BucketKey> = a.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![BucketKey::nested(5, 9), BucketKey::nested(5, 14), BucketKey::nested(6, 9)]
        );
        assert_eq!(a.get(BucketKey::nested(5, 9)).unwrap().mean, 4.0);
        assert_eq!(a.day(5).unwrap().len(), 2);
        assert!(a.as_flat().is_none());
        assert_eq!(a.total_count(), 4);
    }

    #[test]
    fn test_minute_scheme() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayAndMinute, utc());
        agg.add(&event("A", ms(5, 9, 15), 1.0)).unwrap();
        agg.add(&event("A", ms(5, 10, 15), 3.0)).unwrap();

        let a = agg.buckets_for("A").unwrap();
        assert_eq!(a.get(BucketKey::nested(5, 15)).unwrap().count, 2);
    }

    #[test]
    fn test_weekday_tracks_overall() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayOfWeek, utc());
        agg.add(&event("A", ms(3, 1, 0), 10.0)).unwrap(); // Sunday
        agg.add(&event("B", ms(3, 2, 0), 20.0)).unwrap(); // Sunday
        agg.add(&event("B", ms(4, 2, 0), 30.0)).unwrap(); // Monday

        let overall = agg.overall().unwrap();
        assert_eq!(overall.get(1).unwrap().count, 2);
        assert_eq!(overall.get(1).unwrap().mean, 15.0);
        assert_eq!(overall.get(2).unwrap().count, 1);
        assert_eq!(agg.buckets_for("A").unwrap().get(BucketKey::flat(1)).unwrap().count, 1);

        let plain = HierarchicalAggregator::new(BucketScheme::DayOfMonth, utc());
        assert!(plain.overall().is_none());
    }

    #[test]
    fn test_time_zone_shifts_buckets() {
        let zone = FixedOffset::west_opt(5 * 3600).unwrap();
        let mut agg = HierarchicalAggregator::builder()
            .scheme(BucketScheme::DayOfMonth)
            .time_zone(zone)
            .build()
            .unwrap();
        agg.add(&event("A", ms(5, 2, 0), 1.0)).unwrap();

        assert!(agg.buckets_for("A").unwrap().get(BucketKey::flat(4)).is_some());
    }

    #[test]
    fn test_summary() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayOfMonth, utc());
        agg.add(&event("A", ms(5, 0, 0), 10.0)).unwrap();
        agg.add(&event("A", ms(5, 1, 0), 20.0)).unwrap();
        agg.add(&event("A", ms(5, 2, 0), 30.0)).unwrap();
        agg.add(&event("A", ms(6, 0, 0), 40.0)).unwrap();

        let summary = agg.summary("A").unwrap();
        assert_eq!(summary.buckets, 2);
        assert_eq!(summary.avg_count, 2);
        assert_eq!(summary.avg_mean, 30.0);
        assert_eq!(agg.summary("missing"), None);
    }

    #[test]
    fn test_filter_flags_spike_per_category() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayOfMonth, utc());
        for day in 1..=6 {
            agg.add(&event("steady", ms(day, 0, 0), 100.0)).unwrap();
            let spiky = if day == 6 { 900.0 } else { 100.0 + day as f64 };
            agg.add(&event("spiky", ms(day, 0, 0), spiky)).unwrap();
        }

        let report = agg.filter(&PercentagePredicate::new(50.0).unwrap());
        assert_eq!(report.len(), 1);
        let flagged = &report["spiky"];
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].key, BucketKey::flat(6));

        // no spread in "steady", so stddev never flags it
        let report = agg.filter(&StandardDeviationPredicate::new(1.0).unwrap());
        assert!(!report.contains_key("steady"));
    }

    #[test]
    fn test_filter_overall() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayOfWeek, utc());
        for day in 3..=8 {
            agg.add(&event("A", ms(day, 0, 0), 10.0)).unwrap();
        }
        agg.add(&event("B", ms(9, 0, 0), 1_000.0)).unwrap(); // Saturday

        let flagged = agg.filter_overall(&PercentagePredicate::new(100.0).unwrap());
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].key, BucketKey::flat(7));
    }

    #[test]
    fn test_consume_counts_rejections() {
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayOfMonth, utc());
        agg.consume(&event("A", ms(5, 0, 0), f64::MAX));
        agg.consume(&event("A", ms(5, 1, 0), -f64::MAX));
        agg.consume(&event("B", ms(6, 0, 0), 1.0));

        assert_eq!(agg.rejected(), 1);
        let a = agg.buckets_for("A").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.total_count(), 1);
        assert_eq!(a.get(BucketKey::flat(5)).unwrap().mean, f64::MAX);
        assert_eq!(agg.buckets_for("B").unwrap().total_count(), 1);
    }

    #[test]
    fn test_overall_rejection_leaves_category_untouched() {
        // same weekday, different categories: only the overall bucket overflows
        let mut agg = HierarchicalAggregator::new(BucketScheme::DayOfWeek, utc());
        agg.add(&event("A", ms(4, 0, 0), f64::MAX)).unwrap();

        let err = agg.add(&event("B", ms(4, 1, 0), -f64::MAX)).unwrap_err();
        assert!(matches!(err, StatsError::Overflow(_)));
        assert!(agg.buckets_for("B").is_none());
        assert_eq!(agg.overall().unwrap().total_count(), 1);

        agg.consume(&event("B", ms(4, 2, 0), -f64::MAX));
        assert_eq!(agg.rejected(), 1);
        assert_eq!(agg.category_count(), 1);
    }
}
