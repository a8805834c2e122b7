use std::sync::Arc;
use std::time::{Duration, Instant};

use stampede_http::HttpClient;
use stampede_metrics::Registry;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::{NoDataPolicy, RunConfig};
use super::metrics::BuiltinMetrics;
use super::progress::{ProgressFn, ProgressTracker, VuCounts};
use super::schedule::Scheduler;
use super::signal::Signal;
use super::vu::{RunShared, VuContext, run_vu};
use crate::error::{Error, Result};
use crate::report::RunReport;
use crate::scenario::{Scenario, SetupContext};
use crate::thresholds::{Threshold, evaluate_thresholds, parse_thresholds};

/// Runs `scenario` under `config` and returns the final report.
///
/// Configuration errors and a failing setup hook are returned before any traffic is sent.
/// Threshold failures are part of the report, not errors.
pub async fn run(
    scenario: Arc<dyn Scenario>,
    config: RunConfig,
    progress: Option<ProgressFn>,
) -> Result<RunReport> {
    config.validate()?;
    let thresholds = parse_thresholds(&config.thresholds)?;

    let metrics = Arc::new(Registry::new(config.trend_mode));
    let builtins = BuiltinMetrics::register(&metrics)?;
    let client = HttpClient::new(config.connect_timeout, config.request_timeout);
    let name = scenario.name().to_string();

    info!(
        scenario = %name,
        stages = config.plan.stages().len(),
        duration = ?config.plan.total_duration(),
        max_vus = config.plan.max_target(),
        "running setup"
    );
    scenario
        .setup(&SetupContext {
            scenario: &name,
            config: &config,
        })
        .await
        .map_err(Error::Setup)?;

    let shared = Arc::new(RunShared::new(
        scenario.clone(),
        metrics.clone(),
        builtins,
        client,
        config.think_time,
        config.seed,
    ));

    let outcome = drive(&shared, &config, &thresholds, progress.as_ref()).await;
    if let Some(fault) = shared.take_fault() {
        return Err(Error::Metrics(fault));
    }
    let (elapsed, aborted_by_threshold) = outcome?;

    let outcomes = evaluate_thresholds(&metrics, &thresholds, config.no_data, elapsed);
    let report = RunReport::collect(
        &metrics,
        &builtins,
        &name,
        elapsed,
        outcomes,
        aborted_by_threshold,
    );
    info!(
        elapsed = ?elapsed,
        iterations = report.iterations.total(),
        aborted = report.iterations.aborted,
        passed = report.passed(),
        "run finished"
    );

    if let Err(err) = scenario.teardown(&report).await {
        warn!(error = %err, "teardown failed");
    }
    Ok(report)
}

struct VuSlot {
    id: u64,
    stop: Arc<Signal>,
}

/// The control loop: one tick per `control_interval` moves the running VU count toward the
/// scheduler's target, then drains. Returns the run time and whether a threshold stopped it.
async fn drive(
    shared: &Arc<RunShared>,
    config: &RunConfig,
    thresholds: &[Threshold],
    progress: Option<&ProgressFn>,
) -> Result<(Duration, bool)> {
    let abort_checks: Vec<Threshold> = thresholds
        .iter()
        .filter(|t| t.spec().abort_on_fail)
        .cloned()
        .collect();

    let started = Instant::now();
    let scheduler = Scheduler::new(config.plan.clone(), started);
    let mut tracker = ProgressTracker::default();
    let mut interval = tokio::time::interval(config.control_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut active: Vec<VuSlot> = Vec::new();
    let mut next_vu: u64 = 0;
    let mut aborted_by_threshold = false;
    let mut join_error: Option<JoinError> = None;

    loop {
        interval.tick().await;
        let now = Instant::now();

        while let Some(res) = tasks.try_join_next() {
            keep_first(&mut join_error, res);
        }
        if join_error.is_some() || shared.has_fault() || scheduler.is_complete(now) {
            break;
        }

        let desired = scheduler.desired_concurrency(now);
        while (active.len() as u64) < desired {
            next_vu += 1;
            let stop = Arc::new(Signal::new());
            let vu = VuContext::new(next_vu, shared.clone());
            tasks.spawn(run_vu(vu, stop.clone()));
            active.push(VuSlot { id: next_vu, stop });
        }
        while (active.len() as u64) > desired {
            // Most recently started first.
            if let Some(slot) = active.pop() {
                debug!(vu = slot.id, "retiring vu");
                slot.stop.raise();
            }
        }
        shared.track(
            shared
                .builtins
                .record_vus(&shared.metrics, active.len() as u64),
        );

        let elapsed = scheduler.elapsed(now);
        if !abort_checks.is_empty()
            && let Some(crossed) = evaluate_thresholds(
                &shared.metrics,
                &abort_checks,
                NoDataPolicy::Skip,
                elapsed,
            )
            .into_iter()
            .find(|o| o.is_failed())
        {
            warn!(
                metric = %crossed.metric,
                expression = %crossed.expression,
                observed = ?crossed.observed,
                "threshold crossed, stopping early"
            );
            aborted_by_threshold = true;
            break;
        }

        if let Some(progress) = progress {
            let vus = VuCounts {
                desired,
                active: active.len() as u64,
                retiring: tasks.len().saturating_sub(active.len()) as u64,
            };
            progress(tracker.sample(
                &shared.metrics,
                &shared.builtins,
                scheduler.plan(),
                elapsed,
                vus,
                false,
            ));
        }
    }

    info!(
        in_flight = tasks.len(),
        graceful_stop = ?config.graceful_stop,
        "draining"
    );
    shared.draining.raise();
    for slot in active.drain(..) {
        slot.stop.raise();
    }

    let deadline = tokio::time::Instant::now() + config.graceful_stop;
    loop {
        tokio::select! {
            res = tasks.join_next() => match res {
                Some(res) => keep_first(&mut join_error, res),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline) => {
                warn!(in_flight = tasks.len(), "graceful stop expired, abandoning iterations");
                shared.hard_stop.raise();
                break;
            }
            _ = interval.tick(), if progress.is_some() => {
                if let Some(progress) = progress {
                    let vus = VuCounts {
                        desired: 0,
                        active: 0,
                        retiring: tasks.len() as u64,
                    };
                    progress(tracker.sample(
                        &shared.metrics,
                        &shared.builtins,
                        scheduler.plan(),
                        started.elapsed(),
                        vus,
                        true,
                    ));
                }
            }
        }
    }

    // Abandoned iterations resolve as soon as they observe the hard stop.
    while let Some(res) = tasks.join_next().await {
        keep_first(&mut join_error, res);
    }

    match join_error {
        Some(err) => Err(Error::Join(err)),
        None => Ok((started.elapsed(), aborted_by_threshold)),
    }
}

fn keep_first(slot: &mut Option<JoinError>, res: std::result::Result<(), JoinError>) {
    if let Err(err) = res
        && slot.is_none()
    {
        *slot = Some(err);
    }
}
