//! logflow - log file statistics and anomaly report
//!
//! Reads JSONL log records (`{"timestamp": ms, "category": "...",
//! "measurement": n}`), aggregates them by day, hour and weekday, and logs
//! per-category summaries plus the buckets the configured predicate flags.
//!
//! Usage:
//!   logflow [--config path/to/config.json] FILE...
//!
//! Environment variables (ignored when --config is given):
//!   LOGFLOW_MODE - sync | background (default: background)
//!   LOGFLOW_QUEUE_CAPACITY - background queue size (default: 5000)
//!   LOGFLOW_SAMPLE_BY / LOGFLOW_SAMPLE_VALUE / LOGFLOW_SAMPLE_UNIT - sampling
//!   LOGFLOW_PREDICATE / LOGFLOW_PREDICATE_VALUE - anomaly predicate
//!   LOGFLOW_GROUP_BY - snapshot time breakdown key
//!   LOGFLOW_UTC_OFFSET_MINUTES - time zone of all time keys

use {
    anyhow::{bail, Context, Result},
    dotenv::dotenv,
    log::{info, warn},
    logflow::{
        config::{PipelineConfig, RunMode},
        normalizer::JsonLineParser,
        pipeline::{shared, BackgroundFilter, FilterChain, LineByLineFilter, PipelineEngine},
        snapshot::LogSnapshot,
        stats::{AnomalyPredicate, BucketScheme, HierarchicalAggregator},
        PipelineError, RunStats,
    },
    std::{path::PathBuf, sync::Arc, sync::Mutex},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let (config, files) = parse_args(std::env::args().skip(1))?;
    if files.is_empty() {
        bail!("usage: logflow [--config FILE] LOGFILE...");
    }

    info!("🚀 logflow");
    info!("   ├─ Mode: {:?}", config.mode);
    info!("   ├─ Queue capacity: {}", config.queue_capacity);
    info!("   ├─ Sampling: {:?}", config.sample_by);
    info!("   ├─ Predicate: {:?} ({})", config.predicate, config.predicate_value);
    info!("   └─ Files: {}", files.len());

    let zone = config.time_zone()?;
    let predicate = config.build_predicate()?;
    let sampler = config.build_sampler(JsonLineParser::new())?;

    let by_day = shared(HierarchicalAggregator::new(BucketScheme::DayOfMonth, zone));
    let by_hour = shared(HierarchicalAggregator::new(BucketScheme::DayAndHour, zone));
    let by_weekday = shared(HierarchicalAggregator::new(BucketScheme::DayOfWeek, zone));
    let snapshot = shared(LogSnapshot::from_config(&config)?);

    let mut chain = FilterChain::new();
    chain.push_boxed(sampler);
    let mut engine = PipelineEngine::new(chain);
    engine.attach(by_day.clone());
    engine.attach(by_hour.clone());
    engine.attach(by_weekday.clone());
    engine.attach(snapshot.clone());

    let (stats, outcome) = ingest(&config, engine, &files).await?;

    if outcome.is_err() {
        warn!("⚠️  Ingestion stopped early, reporting what was read so far");
    }
    lock(&snapshot).record_run(stats);
    report(stats, &lock(&snapshot), &[&by_day, &by_hour, &by_weekday], predicate.as_ref());
    outcome.context("ingestion failed")?;
    Ok(())
}

/// Run every file through the engine. The totals cover every line delivered,
/// including those of a file that failed part way; the outcome carries the
/// first failure.
async fn ingest(
    config: &PipelineConfig,
    engine: PipelineEngine,
    files: &[PathBuf],
) -> Result<(RunStats, Result<RunStats, PipelineError>)> {
    Ok(match config.mode {
        RunMode::Sync => {
            let mut filter = LineByLineFilter::new(engine);
            let outcome = filter.filter_files(files.to_vec());
            let totals = filter.stats();
            filter.cleanup();
            (totals, outcome)
        }
        RunMode::Background => {
            let mut filter = BackgroundFilter::new(engine, config.queue_capacity)?;
            let outcome = filter.filter_files(files.to_vec()).await;
            let totals = filter.stats();
            filter.cleanup();
            (totals, outcome)
        }
    })
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(PipelineConfig, Vec<PathBuf>)> {
    let mut config_path = None;
    let mut files = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = Some(args.next().context("--config needs a file path")?);
        } else {
            files.push(PathBuf::from(arg));
        }
    }

    let config = match config_path {
        Some(path) => PipelineConfig::from_json_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => PipelineConfig::from_env().context("loading configuration from environment")?,
    };
    Ok((config, files))
}

fn lock<T>(handle: &Arc<Mutex<T>>) -> std::sync::MutexGuard<'_, T> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}

fn report(
    stats: RunStats,
    snapshot: &LogSnapshot,
    aggregators: &[&Arc<Mutex<HierarchicalAggregator>>],
    predicate: &dyn AnomalyPredicate,
) {
    info!(
        "📊 {} lines, {} events ({:.1}% accepted)",
        stats.total_lines,
        stats.accepted_events,
        snapshot.share_of_total(stats.accepted_events) * 100.0
    );

    for (category, action) in snapshot.actions() {
        info!(
            "   ├─ {}: {} events, mean {:.2}, stddev {:.2}, max {} ({}), min {}",
            category,
            action.count(),
            action.mean(),
            action.deviation(),
            action.maxima().measurement(),
            action.maxima().raw_text(),
            action.minima().measurement()
        );
    }

    for handle in aggregators {
        let aggregator = lock(handle);
        let scheme = aggregator.scheme();
        let inner = scheme.inner();

        for (category, buckets) in aggregator.categories() {
            let summary = buckets.summary();
            info!(
                "📈 [{}] {}: {} buckets, ~{} events/bucket, mean of means {:.2}",
                scheme.as_str(),
                category,
                summary.buckets,
                summary.avg_count,
                summary.avg_mean
            );
        }

        for (category, flagged) in aggregator.filter(predicate) {
            for bucket in flagged {
                let when = match bucket.key.day {
                    Some(day) => format!("day {} {}", day, inner.label(bucket.key.key)),
                    None => inner.label(bucket.key.key),
                };
                warn!(
                    "🚨 [{}] {} at {}: mean {:.2} vs moving mean {:.2} (stddev {:.2})",
                    scheme.as_str(),
                    category,
                    when,
                    bucket.summary.mean,
                    bucket.moving.mean,
                    bucket.moving.stddev
                );
            }
        }

        for bucket in aggregator.filter_overall(predicate) {
            warn!(
                "🚨 [{}] all categories on {}: mean {:.2} vs moving mean {:.2}",
                scheme.as_str(),
                inner.label(bucket.key.key),
                bucket.summary.mean,
                bucket.moving.mean
            );
        }

        if aggregator.rejected() > 0 {
            warn!(
                "⚠️  [{}] {} events could not be bucketed",
                scheme.as_str(),
                aggregator.rejected()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn log_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_ingest_keeps_totals_of_failed_run() {
        let good = log_file(&[
            r#"{"timestamp":0,"category":"a","measurement":1}"#,
            r#"{"timestamp":1,"category":"a","measurement":2}"#,
            "noise",
        ]);
        let files = vec![good.path().to_path_buf(), PathBuf::from("/no/such/access.log")];

        for mode in [RunMode::Sync, RunMode::Background] {
            let config = PipelineConfig { mode, ..PipelineConfig::default() };
            let snapshot = shared(LogSnapshot::new(
                logflow::stats::TimeKeyExtractor::utc(config.group_by),
                false,
            ));
            let mut engine = PipelineEngine::new(FilterChain::new().with(JsonLineParser::new()));
            engine.attach(snapshot.clone());

            let (stats, outcome) = ingest(&config, engine, &files).await.unwrap();

            assert!(matches!(outcome, Err(PipelineError::Io { .. })));
            assert_eq!(stats, RunStats { total_lines: 3, accepted_events: 2 });
            assert_eq!(lock(&snapshot).accepted(), 2);
        }
    }

    #[test]
    fn test_parse_args_collects_files() {
        let args = ["a.log", "b.log"].into_iter().map(String::from);
        let (_, files) = parse_args(args).unwrap();
        assert_eq!(files, vec![PathBuf::from("a.log"), PathBuf::from("b.log")]);
    }
}
