use std::time::Duration;

use stampede_metrics::{MetricId, MetricKind, MetricValue, Query, Registry};

use crate::error::{Error, Result};
use crate::runner::NoDataPolicy;

/// One configured pass/fail predicate, e.g. `http_req_duration` / `p(95)<500`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSpec {
    /// Metric name, optionally narrowed by a tag selector: `http_req_duration{name=login}`.
    pub metric: String,
    pub expression: String,
    /// Stop the run as soon as this threshold fails.
    pub abort_on_fail: bool,
}

impl ThresholdSpec {
    pub fn new(metric: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            expression: expression.into(),
            abort_on_fail: false,
        }
    }

    #[must_use]
    pub fn with_abort_on_fail(mut self, abort: bool) -> Self {
        self.abort_on_fail = abort;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    /// Percentile in `(0, 100]`.
    P(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub name: String,
    pub tags: Vec<(String, String)>,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| "missing comparison operator".to_string())?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err("expected `<aggregation> <operator> <number>`".to_string());
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}`"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}`"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile {p} out of range (0, 100]"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid number `{right}`"))?;
    if !value.is_finite() {
        return Err(format!("invalid number `{right}`"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

pub fn parse_metric_selector(raw: &str) -> std::result::Result<MetricSelector, String> {
    let raw = raw.trim();
    let (name, tags) = match raw.split_once('{') {
        None => (raw, Vec::new()),
        Some((name, rest)) => {
            let body = rest
                .strip_suffix('}')
                .ok_or_else(|| "unterminated tag selector".to_string())?;
            let mut tags = Vec::new();
            for pair in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (k, v) = pair
                    .split_once(['=', ':'])
                    .ok_or_else(|| format!("tag selector `{pair}` must be `key=value`"))?;
                let (k, v) = (k.trim(), v.trim());
                if k.is_empty() {
                    return Err(format!("tag selector `{pair}` has an empty key"));
                }
                tags.push((k.to_string(), v.to_string()));
            }
            (name.trim(), tags)
        }
    };

    if name.is_empty() {
        return Err("empty metric name".to_string());
    }
    Ok(MetricSelector {
        name: name.to_string(),
        tags,
    })
}

/// A validated [`ThresholdSpec`].
#[derive(Debug, Clone)]
pub struct Threshold {
    spec: ThresholdSpec,
    selector: MetricSelector,
    expr: ThresholdExpr,
}

impl Threshold {
    pub fn parse(spec: ThresholdSpec) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidThreshold {
            metric: spec.metric.clone(),
            expression: spec.expression.clone(),
            reason,
        };
        let selector = parse_metric_selector(&spec.metric).map_err(invalid)?;
        let expr = parse_threshold_expr(&spec.expression).map_err(invalid)?;
        Ok(Self {
            spec,
            selector,
            expr,
        })
    }

    pub fn spec(&self) -> &ThresholdSpec {
        &self.spec
    }

    pub fn selector(&self) -> &MetricSelector {
        &self.selector
    }

    pub fn expr(&self) -> &ThresholdExpr {
        &self.expr
    }
}

pub fn parse_thresholds(specs: &[ThresholdSpec]) -> Result<Vec<Threshold>> {
    specs.iter().cloned().map(Threshold::parse).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdStatus {
    Passed,
    Failed,
    /// No observations and the policy is to skip.
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
    pub abort_on_fail: bool,
    /// Why no value could be compared, if any.
    pub detail: Option<String>,
}

impl ThresholdOutcome {
    pub fn is_failed(&self) -> bool {
        self.status == ThresholdStatus::Failed
    }
}

enum Observation {
    Value(f64),
    NoData,
    NotApplicable(MetricKind),
}

/// `elapsed` is the run time used for per-second counter rates.
pub fn evaluate_thresholds(
    metrics: &Registry,
    thresholds: &[Threshold],
    policy: NoDataPolicy,
    elapsed: Duration,
) -> Vec<ThresholdOutcome> {
    thresholds
        .iter()
        .map(|t| evaluate_one(metrics, t, policy, elapsed))
        .collect()
}

fn evaluate_one(
    metrics: &Registry,
    threshold: &Threshold,
    policy: NoDataPolicy,
    elapsed: Duration,
) -> ThresholdOutcome {
    let observation = match metrics.lookup(&threshold.selector.name) {
        None => Observation::NoData,
        Some((id, kind)) => observe(metrics, id, kind, &threshold.selector, threshold.expr.agg, elapsed),
    };

    let (observed, status, detail) = match observation {
        Observation::Value(v) => {
            let status = if compare(v, threshold.expr.op, threshold.expr.value) {
                ThresholdStatus::Passed
            } else {
                ThresholdStatus::Failed
            };
            (Some(v), status, None)
        }
        Observation::NoData => {
            let status = match policy {
                NoDataPolicy::Fail => ThresholdStatus::Failed,
                NoDataPolicy::Skip => ThresholdStatus::NoData,
            };
            (None, status, Some("no data".to_string()))
        }
        Observation::NotApplicable(kind) => (
            None,
            ThresholdStatus::Failed,
            Some(format!("aggregation does not apply to {kind} metrics")),
        ),
    };

    ThresholdOutcome {
        metric: threshold.spec.metric.clone(),
        expression: threshold.spec.expression.clone(),
        observed,
        status,
        abort_on_fail: threshold.spec.abort_on_fail,
        detail,
    }
}

fn select<'a>(metrics: &'a Registry, id: MetricId, selector: &MetricSelector) -> Query<'a> {
    selector
        .tags
        .iter()
        .fold(metrics.query(id), |q, (k, v)| q.where_tag(k, v))
}

fn observe(
    metrics: &Registry,
    id: MetricId,
    kind: MetricKind,
    selector: &MetricSelector,
    agg: ThresholdAgg,
    elapsed: Duration,
) -> Observation {
    let query = select(metrics, id, selector);

    if kind == MetricKind::Trend {
        let Some(snapshot) = query.merge_trend_single().filter(|s| !s.is_empty()) else {
            return Observation::NoData;
        };
        let value = match agg {
            ThresholdAgg::Avg => snapshot.avg(),
            ThresholdAgg::Min => snapshot.min(),
            ThresholdAgg::Max => snapshot.max(),
            ThresholdAgg::Med => snapshot.med(),
            ThresholdAgg::Count => Some(snapshot.count() as f64),
            ThresholdAgg::P(p) => snapshot.percentile(p),
            ThresholdAgg::Rate | ThresholdAgg::Value => return Observation::NotApplicable(kind),
        };
        return value.map_or(Observation::NoData, Observation::Value);
    }

    let Some(value) = query.value().filter(|v| v.observations() > 0) else {
        return Observation::NoData;
    };

    let observed = match (value, agg) {
        (MetricValue::Counter(n), ThresholdAgg::Count | ThresholdAgg::Value) => n as f64,
        (MetricValue::Counter(n), ThresholdAgg::Rate) => {
            let secs = elapsed.as_secs_f64();
            if secs > 0.0 { n as f64 / secs } else { 0.0 }
        }
        (MetricValue::Rate { rate, .. }, ThresholdAgg::Rate | ThresholdAgg::Value) => rate,
        (MetricValue::Rate { total, .. }, ThresholdAgg::Count) => total as f64,
        (
            MetricValue::Gauge(v),
            ThresholdAgg::Value
            | ThresholdAgg::Avg
            | ThresholdAgg::Min
            | ThresholdAgg::Max
            | ThresholdAgg::Med,
        ) => v as f64,
        _ => return Observation::NotApplicable(kind),
    };
    Observation::Value(observed)
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
        ThresholdOp::Eq => left == right,
        ThresholdOp::Ne => left != right,
    }
}
