mod config;
pub(crate) mod metrics;
mod progress;
mod run;
mod schedule;
mod signal;
mod vu;

pub use config::{DEFAULT_CONTROL_INTERVAL, DEFAULT_GRACEFUL_STOP, NoDataPolicy, RunConfig};
pub use metrics::{IterationOutcome, names};
pub use progress::{ProgressFn, ProgressUpdate};
pub use run::run;
pub use schedule::{Scheduler, Stage, StagePlan, StageSnapshot};
pub use vu::VuContext;
