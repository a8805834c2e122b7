use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use stampede_core::{MetricValue, ProgressUpdate, RunReport};

use super::OutputFormatter;
use crate::config::Settings;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario: &str, _settings: &Settings) {}

    fn progress(&self) -> Option<stampede_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_secs: f64,

    pub stage: usize,
    pub stages: usize,
    pub target_vus: u64,
    pub stage_remaining_secs: f64,

    pub desired_vus: u64,
    pub active_vus: u64,
    pub retiring_vus: u64,

    pub requests_total: u64,
    pub requests_per_sec: f64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub iterations_per_sec: f64,
    pub checks_failed_total: u64,
    pub draining: bool,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),

        stage: u.stage.index + 1,
        stages: u.stage.count,
        target_vus: u.stage.current_target,
        stage_remaining_secs: u.stage.stage_remaining.as_secs_f64(),

        desired_vus: u.desired_vus,
        active_vus: u.active_vus,
        retiring_vus: u.retiring_vus,

        requests_total: u.requests_total,
        requests_per_sec: u.requests_per_sec,
        failed_requests_total: u.failed_requests_total,
        iterations_total: u.iterations_total,
        iterations_per_sec: u.iterations_per_sec,
        checks_failed_total: u.checks_failed_total,
        draining: u.draining,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub passed: bool,
    pub aborted_by_threshold: bool,
    pub elapsed_secs: f64,
    pub iterations: JsonIterations,
    pub metrics: Vec<JsonMetric>,
    pub checks: Vec<JsonCheck>,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonIterations {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMetric {
    pub name: String,
    pub kind: String,
    pub values: JsonMetricValues,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum JsonMetricValues {
    Counter {
        count: u64,
    },
    Gauge {
        value: i64,
    },
    Rate {
        total: u64,
        hits: u64,
        rate: f64,
    },
    Trend {
        count: u64,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
        med: Option<f64>,
        #[serde(rename = "p(90)")]
        p90: Option<f64>,
        #[serde(rename = "p(95)")]
        p95: Option<f64>,
        #[serde(rename = "p(99)")]
        p99: Option<f64>,
    },
}

impl From<&MetricValue> for JsonMetricValues {
    fn from(v: &MetricValue) -> Self {
        match v {
            MetricValue::Counter(count) => Self::Counter { count: *count },
            MetricValue::Gauge(value) => Self::Gauge { value: *value },
            MetricValue::Rate { total, hits, rate } => Self::Rate {
                total: *total,
                hits: *hits,
                rate: *rate,
            },
            MetricValue::Trend(t) => Self::Trend {
                count: t.count,
                min: t.min,
                max: t.max,
                avg: t.avg,
                med: t.med,
                p90: t.p90,
                p95: t.p95,
                p99: t.p99,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub status: String,
    pub observed: Option<f64>,
    pub abort_on_fail: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let it = &report.iterations;
    JsonSummaryLine {
        kind: "summary",
        scenario: report.scenario.clone(),
        passed: report.passed(),
        aborted_by_threshold: report.aborted_by_threshold,
        elapsed_secs: report.elapsed.as_secs_f64(),
        iterations: JsonIterations {
            total: it.total(),
            completed: it.completed,
            failed: it.failed,
            aborted: it.aborted,
        },
        metrics: report
            .metrics
            .iter()
            .map(|m| JsonMetric {
                name: m.name.clone(),
                kind: m.kind.to_string(),
                values: (&m.values).into(),
            })
            .collect(),
        checks: report
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        thresholds: report
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                status: t.status.to_string(),
                observed: t.observed,
                abort_on_fail: t.abort_on_fail,
                detail: t.detail.clone(),
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
