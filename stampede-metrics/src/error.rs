use crate::metrics::MetricKind;

pub type Result<T> = std::result::Result<T, MetricsError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("metric `{name}` is a {existing}, cannot record a {requested} sample")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("metric id {0} has no storage")]
    UnknownMetric(u32),
}
