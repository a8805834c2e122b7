use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    /// Zero-based.
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Ordered ramp/plateau stages. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    start_target: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        Self::with_start(0, stages)
    }

    /// `start_target` is the level the first stage ramps from.
    pub fn with_start(start_target: u64, stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::EmptyStagePlan);
        }

        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }
        if acc.is_zero() {
            return Err(Error::ZeroDurationPlan);
        }

        Ok(Self {
            start_target,
            stages,
            cumulative_ends,
        })
    }

    pub fn start_target(&self) -> u64 {
        self.start_target
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Highest concurrency the plan ever asks for.
    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start_target)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Index of the stage active at `elapsed`. Boundaries belong to the stage that starts
    /// there, so zero-duration stages are stepped over.
    fn stage_index(&self, elapsed: Duration) -> usize {
        self.cumulative_ends
            .partition_point(|end| *end <= elapsed)
            .min(self.stages.len().saturating_sub(1))
    }

    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 {
            self.start_target
        } else {
            self.stages[idx - 1].target
        };
        (
            stage_start,
            self.cumulative_ends[idx],
            start_target,
            self.stages[idx].target,
        )
    }

    /// Desired concurrency `elapsed` into the run. Zero once the plan is over.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.is_done(elapsed) {
            return 0;
        }

        let idx = self.stage_index(elapsed);
        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);
        interpolate(
            start_target,
            end_target,
            elapsed.saturating_sub(stage_start),
            stage_end.saturating_sub(stage_start),
        )
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> StageSnapshot {
        let total = self.total_duration();
        let clamped = elapsed.min(total);
        let idx = if clamped >= total {
            self.stages.len().saturating_sub(1)
        } else {
            self.stage_index(clamped)
        };

        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start).min(stage_duration);

        StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: interpolate(start_target, end_target, stage_elapsed, stage_duration),
        }
    }
}

fn interpolate(start: u64, end: u64, elapsed: Duration, duration: Duration) -> u64 {
    if duration.is_zero() {
        return end;
    }

    let start_i = start as i128;
    let delta = end as i128 - start_i;
    let num = elapsed.min(duration).as_nanos() as i128;
    let den = duration.as_nanos() as i128;

    let cur = start_i + delta.saturating_mul(num) / den.max(1);
    cur.clamp(0, u64::MAX as i128) as u64
}

/// A [`StagePlan`] anchored at a wall-clock start.
#[derive(Debug, Clone)]
pub struct Scheduler {
    plan: StagePlan,
    started: Instant,
}

impl Scheduler {
    pub fn new(plan: StagePlan, started: Instant) -> Self {
        Self { plan, started }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Zero before the start and after the last stage ends.
    pub fn desired_concurrency(&self, now: Instant) -> u64 {
        if now < self.started {
            return 0;
        }
        self.plan.target_at(self.elapsed(now))
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        now >= self.started && self.plan.is_done(self.elapsed(now))
    }
}
