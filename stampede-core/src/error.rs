use std::time::Duration;

use stampede_metrics::MetricsError;

use crate::scenario::ScenarioError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`stages` must contain at least one stage")]
    EmptyStagePlan,

    #[error("`stages` must add up to a positive total duration")]
    ZeroDurationPlan,

    #[error("`{0}` must be a positive duration")]
    InvalidDuration(&'static str),

    #[error("invalid threshold `{metric}: {expression}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("setup failed: {0}")]
    Setup(#[source] ScenarioError),

    #[error("metric storage fault: {0}")]
    Metrics(#[from] MetricsError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Configuration errors are reported before any traffic is generated.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyStagePlan
                | Self::ZeroDurationPlan
                | Self::InvalidDuration(_)
                | Self::InvalidThreshold { .. }
        )
    }

    pub(crate) fn require_positive(name: &'static str, value: Duration) -> Result<()> {
        if value.is_zero() {
            return Err(Self::InvalidDuration(name));
        }
        Ok(())
    }
}
