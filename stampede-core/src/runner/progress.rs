use std::sync::Arc;
use std::time::{Duration, Instant};

use stampede_metrics::{CounterSnapshot, Registry};

use super::metrics::BuiltinMetrics;
use super::schedule::{StagePlan, StageSnapshot};

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub stage: StageSnapshot,
    pub desired_vus: u64,
    /// VUs still taking new iterations.
    pub active_vus: u64,
    /// Retired or draining VUs finishing their last iteration.
    pub retiring_vus: u64,
    pub requests_total: u64,
    /// Over the last tick.
    pub requests_per_sec: f64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    /// Over the last tick.
    pub iterations_per_sec: f64,
    pub checks_failed_total: u64,
    pub draining: bool,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct VuCounts {
    pub(crate) desired: u64,
    pub(crate) active: u64,
    pub(crate) retiring: u64,
}

#[derive(Debug, Clone, Copy)]
struct Previous {
    at: Instant,
    requests: CounterSnapshot,
    iterations: CounterSnapshot,
}

#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    tick: u64,
    prev: Option<Previous>,
}

impl ProgressTracker {
    pub(crate) fn sample(
        &mut self,
        metrics: &Registry,
        builtins: &BuiltinMetrics,
        plan: &StagePlan,
        elapsed: Duration,
        vus: VuCounts,
        draining: bool,
    ) -> ProgressUpdate {
        let now = Instant::now();
        self.tick = self.tick.saturating_add(1);

        let requests = CounterSnapshot::new(metrics.query(builtins.http_reqs()).sum_counter_total());
        let iterations =
            CounterSnapshot::new(metrics.query(builtins.iterations()).sum_counter_total());
        let (_, failed_requests_total) = metrics.query(builtins.http_req_failed()).sum_rate();
        let (checks_total, checks_passed) = metrics.query(builtins.checks()).sum_rate();

        let dt = self
            .prev
            .map(|p| now.saturating_duration_since(p.at).as_secs_f64())
            .unwrap_or_else(|| elapsed.as_secs_f64());
        let prev = self.prev;

        self.prev = Some(Previous {
            at: now,
            requests,
            iterations,
        });

        ProgressUpdate {
            tick: self.tick,
            elapsed,
            total_duration: plan.total_duration(),
            stage: plan.stage_snapshot_at(elapsed),
            desired_vus: vus.desired,
            active_vus: vus.active,
            retiring_vus: vus.retiring,
            requests_total: requests.total,
            requests_per_sec: requests.per_sec_since(prev.map(|p| p.requests), dt),
            failed_requests_total,
            iterations_total: iterations.total,
            iterations_per_sec: iterations.per_sec_since(prev.map(|p| p.iterations), dt),
            checks_failed_total: checks_total.saturating_sub(checks_passed),
            draining,
        }
    }
}
