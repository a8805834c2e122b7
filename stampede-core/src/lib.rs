//! Load-generation engine: a stage-driven scheduler that keeps a pool of virtual users
//! running a [`Scenario`], records built-in and custom metrics, and evaluates thresholds
//! into a [`RunReport`].

mod error;
mod report;
mod request;
mod scenario;
mod thresholds;

pub mod runner;

pub use error::{Error, Result};
pub use report::{CheckSummary, IterationTotals, RunReport};
pub use request::{RequestResult, TransportError};
pub use runner::{
    IterationOutcome, NoDataPolicy, ProgressFn, ProgressUpdate, RunConfig, Stage, StagePlan,
    StageSnapshot, VuContext, names, run,
};
pub use scenario::{Scenario, ScenarioError, ScenarioResult, SetupContext};
pub use stampede_http::{HttpRequest, HttpTransportErrorKind};
pub use stampede_metrics::{
    MetricKind, MetricSeriesSummary, MetricValue, MetricsError, TrendMode, TrendSummary,
};
pub use thresholds::{
    MetricSelector, Threshold, ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdOutcome,
    ThresholdSpec, ThresholdStatus, evaluate_thresholds, parse_metric_selector,
    parse_threshold_expr, parse_thresholds,
};

/// Re-exported so scenarios can name the VU random generator and its traits.
pub use rand;
