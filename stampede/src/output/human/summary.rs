use std::fmt::Write as _;

use stampede_core::{MetricValue, RunReport, ThresholdStatus};

use super::duration::format_duration_single;
use super::format::{format_bytes, format_rate, format_tags_inline, format_trend_value};

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(out, "  scenario: {}", report.scenario).ok();
    writeln!(out, "  elapsed: {}", format_duration_single(report.elapsed)).ok();
    let it = &report.iterations;
    writeln!(
        out,
        "  iterations: {} (completed {} failed {} aborted {})",
        it.total(),
        it.completed,
        it.failed,
        it.aborted
    )
    .ok();
    if report.aborted_by_threshold {
        out.push_str("  stopped early: an abortOnFail threshold failed\n");
    }

    render_checks(report, &mut out);
    render_metrics(report, &mut out);
    render_thresholds(report, &mut out);

    writeln!(
        out,
        "\nresult: {}",
        if report.passed() { "PASSED" } else { "FAILED" }
    )
    .ok();
    out
}

fn render_checks(report: &RunReport, out: &mut String) {
    if report.checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for c in &report.checks {
        let status = if c.fails > 0 { "FAIL" } else { "OK" };
        writeln!(out, "    {}: pass={} fail={} [{status}]", c.name, c.passes, c.fails).ok();
    }
}

fn render_metrics(report: &RunReport, out: &mut String) {
    if report.metrics.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");

    let secs = report.elapsed.as_secs_f64().max(1e-9);
    let mut rows: Vec<_> = report.metrics.iter().collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));

    for s in rows {
        let key = format!("{}{}", s.name, format_tags_inline(&s.tags, &["scenario"]));
        match &s.values {
            MetricValue::Counter(v) if s.name.starts_with("data_") => {
                writeln!(
                    out,
                    "    {key} = {} ({}/s)",
                    format_bytes(*v),
                    format_bytes((*v as f64 / secs).round() as u64)
                )
                .ok();
            }
            MetricValue::Counter(v) => {
                writeln!(out, "    {key} = {v} ({}/s)", format_rate(*v as f64 / secs)).ok();
            }
            MetricValue::Gauge(v) => {
                writeln!(out, "    {key} = {v}").ok();
            }
            MetricValue::Rate { total, hits, rate } => {
                writeln!(
                    out,
                    "    {key} = {:.2}% ({hits} of {total})",
                    rate * 100.0
                )
                .ok();
            }
            MetricValue::Trend(t) => {
                let f = |v| format_trend_value(&s.name, v);
                writeln!(
                    out,
                    "    {key} = avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} (n={})",
                    f(t.avg),
                    f(t.min),
                    f(t.med),
                    f(t.max),
                    f(t.p90),
                    f(t.p95),
                    f(t.p99),
                    t.count
                )
                .ok();
            }
        }
    }
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    if report.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &report.thresholds {
        let status = match t.status {
            ThresholdStatus::Passed => "PASS",
            ThresholdStatus::Failed => "FAIL",
            ThresholdStatus::NoData => "SKIP",
        };
        let observed = match (t.observed, &t.detail) {
            (Some(v), _) => format!("observed={v:.3}"),
            (None, Some(detail)) => detail.clone(),
            (None, None) => "no data".to_string(),
        };
        writeln!(out, "    {}: {} {observed} [{status}]", t.metric, t.expression).ok();
    }
}
