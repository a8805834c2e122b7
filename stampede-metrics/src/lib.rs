pub mod agg;
pub mod error;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod tags;
pub mod trend;

pub use agg::{CounterSnapshot, Query, per_sec};
pub use error::{MetricsError, Result};
pub use key::KeyId;
pub use metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricValue, Sample};
pub use registry::{MetricId, Registry};
pub use tags::TagSet;
pub use trend::{TrendMode, TrendSnapshot, TrendSummary};
