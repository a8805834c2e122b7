use async_trait::async_trait;
use stampede_metrics::MetricsError;

use crate::report::RunReport;
use crate::runner::{RunConfig, VuContext};

pub type ScenarioResult<T = ()> = std::result::Result<T, ScenarioError>;

/// An uncaught failure inside one iteration (or a hook). The iteration is abandoned and the
/// run continues.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("{0}")]
    Message(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("custom metric: {0}")]
    Metric(#[from] MetricsError),

    #[error("iteration panicked: {0}")]
    Panic(String),
}

impl ScenarioError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Short label used as the `error` tag of `scenario_errors`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Json(_) => "json",
            Self::Metric(_) => "metric",
            Self::Panic(_) => "panic",
        }
    }
}

/// Read-only view handed to [`Scenario::setup`].
#[derive(Debug, Clone, Copy)]
pub struct SetupContext<'a> {
    pub scenario: &'a str,
    pub config: &'a RunConfig,
}

/// A user-supplied step sequence. The engine calls [`Scenario::iteration`] once per VU
/// iteration; implementations must not share mutable state between VUs except through the
/// metrics exposed on [`VuContext`].
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    fn name(&self) -> &str {
        "default"
    }

    /// Runs once before the first VU starts. An error aborts the run before any traffic.
    async fn setup(&self, _ctx: &SetupContext<'_>) -> ScenarioResult {
        Ok(())
    }

    async fn iteration(&self, vu: &mut VuContext) -> ScenarioResult;

    /// Runs once after the run completes. Errors are logged and otherwise ignored.
    async fn teardown(&self, _report: &RunReport) -> ScenarioResult {
        Ok(())
    }
}
