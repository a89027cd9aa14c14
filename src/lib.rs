//! Streaming statistics over log files
//!
//! Lines are turned into [`Event`]s by pluggable parsers, optionally thinned
//! by per-category samplers, and fanned out to subscribers such as the
//! time-bucketed [`HierarchicalAggregator`] or the whole-run [`LogSnapshot`].
//! Bucket sequences can then be scanned for anomalies with an
//! [`AnomalyPredicate`].
//!
//! ## Module Organization
//!
//! - `types` - the `Event` record
//! - `stats` - online statistics, time buckets, hierarchy, predicates
//! - `sampling` - parser trait and sampling decorators
//! - `interval` - time window filters
//! - `normalizer` - JSONL reference parser
//! - `pipeline` - filter chain, subscribers, sync and background ingestion
//! - `snapshot` - whole-run summary subscriber
//! - `config` - environment / JSON configuration

pub mod config;
pub mod interval;
pub mod normalizer;
pub mod pipeline;
pub mod sampling;
pub mod snapshot;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigError, PipelineConfig, RunMode};
pub use pipeline::{
    BackgroundFilter, FilterChain, LineByLineFilter, PipelineEngine, PipelineError, RunStats,
    Subscriber, SubscriberRegistry,
};
pub use sampling::EventParser;
pub use snapshot::LogSnapshot;
pub use stats::{
    AnomalyPredicate, BucketScheme, HierarchicalAggregator, OnlineStatistics, StatisticalSummary,
    TimeBucketAggregator,
};
pub use types::{Event, EventError};
