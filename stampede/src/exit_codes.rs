#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Run completed and every threshold passed. Failed checks alone do not change this.
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// The scenario's setup hook failed; no traffic was generated.
    SetupError = 20,

    /// Invalid CLI/config (bad flags, invalid durations or stages, invalid threshold syntax).
    InvalidInput = 30,

    /// The load generator itself broke (metric storage fault, task panic, IO errors).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_failure_is_distinct_from_engine_faults() {
        assert_eq!(ExitCode::from_verdict(true).as_i32(), 0);
        assert_eq!(ExitCode::from_verdict(false).as_i32(), 11);
        assert_ne!(
            ExitCode::ThresholdsFailed.as_i32(),
            ExitCode::RuntimeError.as_i32()
        );
    }
}
