use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    SetupError(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::SetupError(_) => ExitCode::SetupError,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::SetupError(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl From<stampede_core::Error> for RunError {
    fn from(err: stampede_core::Error) -> Self {
        if err.is_configuration() {
            Self::InvalidInput(err.into())
        } else if matches!(err, stampede_core::Error::Setup(_)) {
            Self::SetupError(err.into())
        } else {
            Self::RuntimeError(err.into())
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (stampede_core::Error::EmptyStagePlan, ExitCode::InvalidInput),
            (
                stampede_core::Error::Setup(stampede_core::ScenarioError::msg("down")),
                ExitCode::SetupError,
            ),
            (
                stampede_core::Error::Metrics(stampede_core::MetricsError::UnknownMetric(7)),
                ExitCode::RuntimeError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(RunError::from(err).exit_code(), code);
        }
    }
}
