use std::collections::BTreeMap;
use std::time::Duration;

use stampede_metrics::{MetricSeriesSummary, MetricValue, Registry, TrendSummary};

use crate::runner::metrics::{BuiltinMetrics, IterationOutcome, names};
use crate::thresholds::ThresholdOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationTotals {
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
}

impl IterationTotals {
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.aborted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Final snapshot of a run: every metric merged across tags plus threshold outcomes.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenario: String,
    pub elapsed: Duration,
    pub iterations: IterationTotals,
    /// One entry per observed metric, sorted by name.
    pub metrics: Vec<MetricSeriesSummary>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
    /// The drain was started early by an `abort_on_fail` threshold.
    pub aborted_by_threshold: bool,
}

impl RunReport {
    pub(crate) fn collect(
        metrics: &Registry,
        builtins: &BuiltinMetrics,
        scenario: &str,
        elapsed: Duration,
        thresholds: Vec<ThresholdOutcome>,
        aborted_by_threshold: bool,
    ) -> Self {
        let iterations_with = |outcome: IterationOutcome| {
            metrics
                .query(builtins.iterations())
                .where_tag("status", outcome.as_ref())
                .sum_counter_total()
        };
        let iterations = IterationTotals {
            completed: iterations_with(IterationOutcome::Completed),
            failed: iterations_with(IterationOutcome::Failed),
            aborted: iterations_with(IterationOutcome::Aborted),
        };

        let mut checks: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for series in metrics.summarize() {
            if series.name != names::CHECKS {
                continue;
            }
            let Some((_, name)) = series.tags.iter().find(|(k, _)| k == "check") else {
                continue;
            };
            if let MetricValue::Rate { total, hits, .. } = series.values {
                let entry = checks.entry(name.clone()).or_default();
                entry.0 += hits;
                entry.1 += total - hits;
            }
        }

        Self {
            scenario: scenario.to_string(),
            elapsed,
            iterations,
            metrics: metrics.summarize_metrics(),
            checks: checks
                .into_iter()
                .map(|(name, (passes, fails))| CheckSummary {
                    name,
                    passes,
                    fails,
                })
                .collect(),
            thresholds,
            aborted_by_threshold,
        }
    }

    /// Overall verdict: no threshold failed. Checks alone never fail a run.
    pub fn passed(&self) -> bool {
        !self.thresholds.iter().any(ThresholdOutcome::is_failed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| t.is_failed())
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSeriesSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.metric(name)?.values {
            MetricValue::Counter(v) => Some(v),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        match self.metric(name)?.values {
            MetricValue::Rate { rate, .. } => Some(rate),
            _ => None,
        }
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match &self.metric(name)?.values {
            MetricValue::Trend(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdStatus;

    fn outcome(status: ThresholdStatus) -> ThresholdOutcome {
        ThresholdOutcome {
            metric: "errors".to_string(),
            expression: "rate<0.1".to_string(),
            observed: None,
            status,
            abort_on_fail: false,
            detail: None,
        }
    }

    #[test]
    fn collects_iterations_and_checks() {
        let metrics = Registry::default();
        let builtins = BuiltinMetrics::register(&metrics).unwrap_or_else(|e| panic!("{e}"));
        for (outcome, n) in [
            (IterationOutcome::Completed, 3),
            (IterationOutcome::Failed, 2),
            (IterationOutcome::Aborted, 1),
        ] {
            for _ in 0..n {
                builtins
                    .record_iteration(&metrics, "s", outcome, Duration::from_millis(1))
                    .unwrap_or_else(|e| panic!("{e}"));
            }
        }
        for passed in [true, true, false] {
            builtins
                .record_check(&metrics, "s", "status is 200", passed)
                .unwrap_or_else(|e| panic!("{e}"));
        }

        let report = RunReport::collect(
            &metrics,
            &builtins,
            "s",
            Duration::from_secs(1),
            vec![outcome(ThresholdStatus::NoData)],
            false,
        );

        assert_eq!(
            report.iterations,
            IterationTotals {
                completed: 3,
                failed: 2,
                aborted: 1
            }
        );
        assert_eq!(report.iterations.total(), 6);
        assert_eq!(
            report.checks,
            vec![CheckSummary {
                name: "status is 200".to_string(),
                passes: 2,
                fails: 1
            }]
        );
        assert_eq!(report.counter(names::ITERATIONS), Some(6));
        assert!(report.metric(names::HTTP_REQS).is_none());
        assert!(report.passed());
    }

    #[test]
    fn any_failed_threshold_fails_the_run() {
        let metrics = Registry::default();
        let builtins = BuiltinMetrics::register(&metrics).unwrap_or_else(|e| panic!("{e}"));
        let report = RunReport::collect(
            &metrics,
            &builtins,
            "s",
            Duration::from_secs(1),
            vec![
                outcome(ThresholdStatus::Passed),
                outcome(ThresholdStatus::Failed),
            ],
            false,
        );
        assert!(!report.passed());
        assert_eq!(report.failed_thresholds().count(), 1);
    }
}
