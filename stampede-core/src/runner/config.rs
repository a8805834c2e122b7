use std::time::Duration;

use stampede_http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use stampede_metrics::TrendMode;

use super::schedule::StagePlan;
use crate::error::{Error, Result};
use crate::thresholds::ThresholdSpec;

pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_CONTROL_INTERVAL: Duration = Duration::from_secs(1);

/// What a threshold over a metric with no observations evaluates to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum NoDataPolicy {
    /// Count the threshold as failed.
    #[default]
    Fail,
    /// Leave it out of the verdict and report it as `no data`.
    Skip,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub plan: StagePlan,
    pub thresholds: Vec<ThresholdSpec>,
    /// Pause between iterations of one VU.
    pub think_time: Duration,
    /// How long in-flight iterations may keep running once the plan ends.
    pub graceful_stop: Duration,
    pub control_interval: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Makes every VU's random stream reproducible.
    pub seed: Option<u64>,
    pub no_data: NoDataPolicy,
    pub trend_mode: TrendMode,
}

impl RunConfig {
    pub fn new(plan: StagePlan) -> Self {
        Self {
            plan,
            thresholds: Vec::new(),
            think_time: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            control_interval: DEFAULT_CONTROL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            seed: None,
            no_data: NoDataPolicy::default(),
            trend_mode: TrendMode::default(),
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Vec<ThresholdSpec>) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    #[must_use]
    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    #[must_use]
    pub fn with_control_interval(mut self, interval: Duration) -> Self {
        self.control_interval = interval;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_no_data(mut self, policy: NoDataPolicy) -> Self {
        self.no_data = policy;
        self
    }

    #[must_use]
    pub fn with_trend_mode(mut self, mode: TrendMode) -> Self {
        self.trend_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        Error::require_positive("controlInterval", self.control_interval)?;
        Error::require_positive("requestTimeout", self.request_timeout)?;
        Error::require_positive("connectTimeout", self.connect_timeout)?;
        Ok(())
    }
}
