use std::time::Duration;

use stampede_metrics::{MetricId, MetricKind, Registry, Result};

use crate::request::RequestResult;
use crate::scenario::ScenarioError;

/// Names of the metrics every run records.
pub mod names {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const HTTP_REQ_ERRORS: &str = "http_req_errors";
    pub const DATA_SENT: &str = "data_sent";
    pub const DATA_RECEIVED: &str = "data_received";
    pub const CHECKS: &str = "checks";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const SCENARIO_ERRORS: &str = "scenario_errors";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum IterationOutcome {
    Completed,
    Failed,
    /// Still running when the graceful stop expired.
    Aborted,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BuiltinMetrics {
    http_reqs: MetricId,
    /// Milliseconds.
    http_req_duration: MetricId,
    http_req_failed: MetricId,
    http_req_errors: MetricId,
    data_sent: MetricId,
    data_received: MetricId,
    checks: MetricId,
    iterations: MetricId,
    /// Milliseconds.
    iteration_duration: MetricId,
    scenario_errors: MetricId,
    vus: MetricId,
    vus_max: MetricId,
}

impl BuiltinMetrics {
    pub(crate) fn register(metrics: &Registry) -> Result<Self> {
        use names::*;
        Ok(Self {
            http_reqs: metrics.register(HTTP_REQS, MetricKind::Counter)?,
            http_req_duration: metrics.register(HTTP_REQ_DURATION, MetricKind::Trend)?,
            http_req_failed: metrics.register(HTTP_REQ_FAILED, MetricKind::Rate)?,
            http_req_errors: metrics.register(HTTP_REQ_ERRORS, MetricKind::Counter)?,
            data_sent: metrics.register(DATA_SENT, MetricKind::Counter)?,
            data_received: metrics.register(DATA_RECEIVED, MetricKind::Counter)?,
            checks: metrics.register(CHECKS, MetricKind::Rate)?,
            iterations: metrics.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: metrics.register(ITERATION_DURATION, MetricKind::Trend)?,
            scenario_errors: metrics.register(SCENARIO_ERRORS, MetricKind::Counter)?,
            vus: metrics.register(VUS, MetricKind::Gauge)?,
            vus_max: metrics.register(VUS_MAX, MetricKind::Gauge)?,
        })
    }

    pub(crate) fn http_reqs(&self) -> MetricId {
        self.http_reqs
    }

    pub(crate) fn http_req_failed(&self) -> MetricId {
        self.http_req_failed
    }

    pub(crate) fn iterations(&self) -> MetricId {
        self.iterations
    }

    pub(crate) fn checks(&self) -> MetricId {
        self.checks
    }

    pub(crate) fn record_request(
        &self,
        metrics: &Registry,
        scenario: &str,
        res: &RequestResult,
    ) -> Result<()> {
        let status = res.status.unwrap_or(0).to_string();
        let tags = metrics.resolve_tags(&[
            ("scenario", scenario),
            ("name", res.name.as_str()),
            ("method", res.method.as_str()),
            ("status", status.as_str()),
        ]);

        metrics.handle(self.http_reqs, tags.clone())?.increment(1);
        metrics
            .handle(self.http_req_failed, tags.clone())?
            .observe_rate(res.is_failed());
        metrics
            .handle(self.data_sent, tags.clone())?
            .increment(res.bytes_sent);
        metrics
            .handle(self.data_received, tags.clone())?
            .increment(res.bytes_received);

        // Latency of a call that never got a response would skew the distribution.
        if res.status.is_some() {
            metrics
                .handle(self.http_req_duration, tags)?
                .observe_trend(res.latency_ms());
        }

        if let Some(err) = &res.error {
            let kind = err.kind.to_string();
            let tags = metrics.resolve_tags(&[
                ("scenario", scenario),
                ("name", res.name.as_str()),
                ("method", res.method.as_str()),
                ("error_kind", kind.as_str()),
            ]);
            metrics.handle(self.http_req_errors, tags)?.increment(1);
        }

        Ok(())
    }

    pub(crate) fn record_check(
        &self,
        metrics: &Registry,
        scenario: &str,
        name: &str,
        passed: bool,
    ) -> Result<()> {
        let tags = metrics.resolve_tags(&[("scenario", scenario), ("check", name)]);
        metrics.handle(self.checks, tags)?.observe_rate(passed);
        Ok(())
    }

    pub(crate) fn record_iteration(
        &self,
        metrics: &Registry,
        scenario: &str,
        outcome: IterationOutcome,
        duration: Duration,
    ) -> Result<()> {
        let tags = metrics.resolve_tags(&[("scenario", scenario), ("status", outcome.as_ref())]);
        metrics.handle(self.iterations, tags.clone())?.increment(1);

        if outcome != IterationOutcome::Aborted {
            metrics
                .handle(self.iteration_duration, tags)?
                .observe_trend(duration.as_secs_f64() * 1000.0);
        }
        Ok(())
    }

    pub(crate) fn record_scenario_error(
        &self,
        metrics: &Registry,
        scenario: &str,
        err: &ScenarioError,
    ) -> Result<()> {
        let tags = metrics.resolve_tags(&[("scenario", scenario), ("error", err.kind())]);
        metrics.handle(self.scenario_errors, tags)?.increment(1);
        Ok(())
    }

    pub(crate) fn record_vus(&self, metrics: &Registry, active: u64) -> Result<()> {
        let active = i64::try_from(active).unwrap_or(i64::MAX);
        let tags = metrics.resolve_tags(&[]);
        metrics.handle(self.vus, tags.clone())?.set_gauge(active);
        metrics.handle(self.vus_max, tags)?.max_gauge(active);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_metrics::MetricValue;

    #[test]
    fn transport_errors_skip_latency_but_count_as_failed() {
        let metrics = Registry::default();
        let ids = BuiltinMetrics::register(&metrics).unwrap_or_else(|e| panic!("{e}"));

        let err = stampede_http::Error::Timeout(Duration::from_millis(5));
        let res = RequestResult::from_error(
            "hang".to_string(),
            http::Method::GET,
            "http://localhost/hang".to_string(),
            Duration::from_millis(5),
            &err,
        );
        ids.record_request(&metrics, "s", &res)
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(
            metrics.query(ids.http_reqs).value(),
            Some(MetricValue::Counter(1))
        );
        assert_eq!(metrics.query(ids.http_req_failed).sum_rate(), (1, 1));
        assert_eq!(metrics.query(ids.http_req_duration).value(), None);
        assert_eq!(
            metrics
                .query(ids.http_req_errors)
                .where_tag("error_kind", "timeout")
                .sum_counter_total(),
            1
        );
    }

    #[test]
    fn aborted_iterations_are_counted_without_duration() {
        let metrics = Registry::default();
        let ids = BuiltinMetrics::register(&metrics).unwrap_or_else(|e| panic!("{e}"));

        for outcome in [
            IterationOutcome::Completed,
            IterationOutcome::Failed,
            IterationOutcome::Aborted,
        ] {
            ids.record_iteration(&metrics, "s", outcome, Duration::from_millis(10))
                .unwrap_or_else(|e| panic!("{e}"));
        }

        assert_eq!(metrics.query(ids.iterations).sum_counter_total(), 3);
        assert_eq!(
            metrics
                .query(ids.iterations)
                .where_tag("status", "aborted")
                .sum_counter_total(),
            1
        );
        let durations = metrics
            .query(ids.iteration_duration)
            .merge_trend_single()
            .unwrap_or_else(|| panic!("missing trend"));
        assert_eq!(durations.count(), 2);
    }

    #[test]
    fn vus_max_keeps_the_peak() {
        let metrics = Registry::default();
        let ids = BuiltinMetrics::register(&metrics).unwrap_or_else(|e| panic!("{e}"));
        for n in [3, 9, 4] {
            ids.record_vus(&metrics, n).unwrap_or_else(|e| panic!("{e}"));
        }
        assert_eq!(metrics.query(ids.vus).max_gauge(), Some(4));
        assert_eq!(metrics.query(ids.vus_max).max_gauge(), Some(9));
    }
}
