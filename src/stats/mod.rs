//! Streaming statistics over log events
//!
//! `online` holds the Welford accumulator, `buckets` groups it by a single
//! calendar key, `hierarchy` nests that per category, and `predicate`
//! scans bucket sequences for anomalies.

pub mod buckets;
pub mod hierarchy;
pub mod online;
pub mod predicate;
pub mod time_key;

pub use buckets::{BucketSummary, TimeBucketAggregator};
pub use hierarchy::{
    BucketKey, BucketScheme, CategoryBuckets, HierarchicalAggregator,
    HierarchicalAggregatorBuilder,
};
pub use online::{OnlineStatistics, StatisticalSummary};
pub use predicate::{
    scan_buckets, AnomalyPredicate, AnomalyReport, FlaggedBucket, PercentagePredicate,
    PredicateArguments, PredicateType, StandardDeviationPredicate,
};
pub use time_key::{TimeKey, TimeKeyExtractor};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("observation must be finite, got {0}")]
    NonFinite(f64),

    #[error("observation {0} overflows the running statistics")]
    Overflow(f64),

    #[error("timestamp {0}ms has no {1} key in the configured time zone")]
    UnmappableTimestamp(i64, &'static str),
}
