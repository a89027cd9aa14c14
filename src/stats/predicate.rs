//! Anomaly predicates evaluated over chronological bucket sequences

use {
    super::{BucketKey, OnlineStatistics, StatisticalSummary},
    crate::config::ConfigError,
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Inputs to a predicate: the running distribution of bucket means seen so
/// far (current bucket included) and the current bucket's mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateArguments {
    pub moving: StatisticalSummary,
    pub current: f64,
}

impl PredicateArguments {
    pub fn new(moving: StatisticalSummary, current: f64) -> Self {
        Self { moving, current }
    }
}

pub trait AnomalyPredicate: Send + Sync {
    fn apply(&self, args: &PredicateArguments) -> bool;

    fn name(&self) -> &'static str;
}

/// Flags a bucket whose mean deviates from the moving mean by more than
/// `threshold_percent` percent of the moving mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentagePredicate {
    threshold_percent: f64,
}

impl PercentagePredicate {
    pub fn new(threshold_percent: f64) -> Result<Self, ConfigError> {
        if !(threshold_percent.is_finite() && threshold_percent > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "percentage threshold",
                value: threshold_percent,
            });
        }
        Ok(Self { threshold_percent })
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }
}

impl AnomalyPredicate for PercentagePredicate {
    fn apply(&self, args: &PredicateArguments) -> bool {
        // Zero moving mean yields +-inf (flagged) or NaN (never flagged)
        let delta = (args.moving.mean - args.current) / args.moving.mean * 100.0;
        delta.abs() > self.threshold_percent
    }

    fn name(&self) -> &'static str {
        "percentage"
    }
}

/// Flags a bucket whose mean lies more than `multiplier` moving standard
/// deviations away from the moving mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardDeviationPredicate {
    multiplier: f64,
}

impl StandardDeviationPredicate {
    pub fn new(multiplier: f64) -> Result<Self, ConfigError> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "standard deviation multiplier",
                value: multiplier,
            });
        }
        Ok(Self { multiplier })
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl AnomalyPredicate for StandardDeviationPredicate {
    fn apply(&self, args: &PredicateArguments) -> bool {
        let delta = args.moving.mean - args.current;
        let bound = self.multiplier * args.moving.stddev;
        // zero spread (e.g. a single bucket) never flags
        bound > 0.0 && delta.abs() > bound
    }

    fn name(&self) -> &'static str {
        "stdev"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateType {
    #[default]
    Stdev,
    Percentage,
}

impl PredicateType {
    pub fn build(&self, value: f64) -> Result<Box<dyn AnomalyPredicate>, ConfigError> {
        Ok(match self {
            PredicateType::Stdev => Box::new(StandardDeviationPredicate::new(value)?),
            PredicateType::Percentage => Box::new(PercentagePredicate::new(value)?),
        })
    }
}

impl std::str::FromStr for PredicateType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdev" | "stddev" => Ok(PredicateType::Stdev),
            "percentage" | "percent" => Ok(PredicateType::Percentage),
            other => Err(ConfigError::InvalidValue {
                name: "predicate".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A bucket the predicate flagged, with the moving baseline it was judged
/// against
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlaggedBucket {
    pub key: BucketKey,
    pub summary: StatisticalSummary,
    pub moving: StatisticalSummary,
}

/// category -> flagged buckets in chronological order
pub type AnomalyReport = BTreeMap<String, Vec<FlaggedBucket>>;

/// Walk buckets in the given (chronological) order, feeding each bucket mean
/// into a fresh moving accumulator before asking the predicate about it.
pub fn scan_buckets<'a, I>(buckets: I, predicate: &dyn AnomalyPredicate) -> Vec<FlaggedBucket>
where
    I: IntoIterator<Item = (BucketKey, &'a OnlineStatistics)>,
{
    let mut moving = OnlineStatistics::new();
    let mut flagged = Vec::new();

    for (key, stats) in buckets {
        if stats.is_empty() {
            continue;
        }
        let current = stats.mean();
        if moving.observe(current).is_err() {
            continue;
        }

        let args = PredicateArguments::new(moving.summary(), current);
        if predicate.apply(&args) {
            flagged.push(FlaggedBucket {
                key,
                summary: stats.summary(),
                moving: args.moving,
            });
        }
    }

    flagged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving(mean: f64, stddev: f64) -> StatisticalSummary {
        StatisticalSummary {
            count: 3,
            mean,
            variance: stddev * stddev,
            stddev,
            max: mean,
            min: mean,
        }
    }

    #[test]
    fn test_percentage_thresholds() {
        // |80 - 100| / 80 = 25%
        let args = PredicateArguments::new(moving(80.0, 0.0), 100.0);

        assert!(!PercentagePredicate::new(30.0).unwrap().apply(&args));
        assert!(PercentagePredicate::new(20.0).unwrap().apply(&args));
        assert!(PercentagePredicate::new(10.0).unwrap().apply(&args));
    }

    #[test]
    fn test_percentage_zero_moving_mean() {
        let predicate = PercentagePredicate::new(5.0).unwrap();

        assert!(predicate.apply(&PredicateArguments::new(moving(0.0, 1.0), 3.0)));
        assert!(!predicate.apply(&PredicateArguments::new(moving(0.0, 0.0), 0.0)));
    }

    #[test]
    fn test_non_positive_thresholds_rejected() {
        assert!(PercentagePredicate::new(0.0).is_err());
        assert!(PercentagePredicate::new(-1.0).is_err());
        assert!(PercentagePredicate::new(f64::NAN).is_err());
        assert!(StandardDeviationPredicate::new(0.0).is_err());
        assert!(StandardDeviationPredicate::new(-2.0).is_err());
        assert!(StandardDeviationPredicate::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_stddev_predicate() {
        let predicate = StandardDeviationPredicate::new(2.0).unwrap();

        assert!(predicate.apply(&PredicateArguments::new(moving(10.0, 1.0), 12.5)));
        assert!(predicate.apply(&PredicateArguments::new(moving(10.0, 1.0), 7.0)));
        assert!(!predicate.apply(&PredicateArguments::new(moving(10.0, 1.0), 11.5)));
        // exactly on the bound is not an anomaly
        assert!(!predicate.apply(&PredicateArguments::new(moving(10.0, 1.0), 12.0)));
    }

    #[test]
    fn test_stddev_zero_spread_never_flags() {
        let predicate = StandardDeviationPredicate::new(0.5).unwrap();
        assert!(!predicate.apply(&PredicateArguments::new(moving(10.0, 0.0), 1_000.0)));
    }

    #[test]
    fn test_predicate_type_parse_and_build() {
        assert_eq!("stdev".parse::<PredicateType>().unwrap(), PredicateType::Stdev);
        assert_eq!(" Percentage ".parse::<PredicateType>().unwrap(), PredicateType::Percentage);
        assert!("median".parse::<PredicateType>().is_err());

        assert_eq!(PredicateType::Percentage.build(10.0).unwrap().name(), "percentage");
        assert!(PredicateType::Stdev.build(0.0).is_err());
    }

    #[test]
    fn test_scan_uses_bucket_means_in_order() {
        let mut buckets = Vec::new();
        let series = [
            (1u32, vec![10.0, 10.0]),
            (2, vec![12.0]),
            (3, vec![11.0]),
            (4, vec![90.0, 110.0]),
        ];
        for (key, values) in series {
            let mut stats = OnlineStatistics::new();
            for v in values {
                stats.observe(v).unwrap();
            }
            buckets.push((BucketKey::flat(key), stats));
        }

        let predicate = PercentagePredicate::new(50.0).unwrap();
        let flagged = scan_buckets(buckets.iter().map(|(k, s)| (*k, s)), &predicate);

        // bucket means 10, 12, 11, 100; moving mean at bucket 4 is 33.25
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].key, BucketKey::flat(4));
        assert_eq!(flagged[0].summary.count, 2);
        assert_eq!(flagged[0].moving.count, 4);
        assert!((flagged[0].moving.mean - 33.25).abs() < 1e-9);
    }

    #[test]
    fn test_scan_first_bucket_never_flagged_by_stddev() {
        let mut stats = OnlineStatistics::new();
        stats.observe(500.0).unwrap();

        let predicate = StandardDeviationPredicate::new(1.0).unwrap();
        let flagged = scan_buckets([(BucketKey::flat(0), &stats)], &predicate);
        assert!(flagged.is_empty());
    }
}
