use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt as _;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use serde::Serialize;
use stampede_http::{HttpClient, HttpRequest};
use stampede_metrics::{MetricsError, Registry, Sample};
use tracing::{debug, error, warn};

use super::metrics::{BuiltinMetrics, IterationOutcome};
use super::signal::Signal;
use crate::request::RequestResult;
use crate::scenario::{Scenario, ScenarioError, ScenarioResult};

/// State every VU of one run shares.
pub(crate) struct RunShared {
    pub(crate) scenario: Arc<dyn Scenario>,
    pub(crate) scenario_name: Arc<str>,
    pub(crate) metrics: Arc<Registry>,
    pub(crate) builtins: BuiltinMetrics,
    pub(crate) client: HttpClient,
    pub(crate) think_time: Duration,
    pub(crate) seed: Option<u64>,
    /// No new iterations may start.
    pub(crate) draining: Signal,
    /// In-flight iterations are abandoned.
    pub(crate) hard_stop: Signal,
    fault: Mutex<Option<MetricsError>>,
}

impl RunShared {
    pub(crate) fn new(
        scenario: Arc<dyn Scenario>,
        metrics: Arc<Registry>,
        builtins: BuiltinMetrics,
        client: HttpClient,
        think_time: Duration,
        seed: Option<u64>,
    ) -> Self {
        Self {
            scenario_name: Arc::from(scenario.name()),
            scenario,
            metrics,
            builtins,
            client,
            think_time,
            seed,
            draining: Signal::new(),
            hard_stop: Signal::new(),
            fault: Mutex::new(None),
        }
    }

    /// Built-in metric writes only fail if the registry is corrupt; the first such fault
    /// ends the run.
    pub(crate) fn track(&self, res: stampede_metrics::Result<()>) {
        let Err(err) = res else {
            return;
        };
        let mut slot = self
            .fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            error!(error = %err, "metric storage fault");
            *slot = Some(err);
        }
    }

    pub(crate) fn take_fault(&self) -> Option<MetricsError> {
        self.fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub(crate) fn has_fault(&self) -> bool {
        self.fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

const SEED_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

fn vu_rng(seed: Option<u64>, vu_id: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ vu_id.wrapping_mul(SEED_SPREAD)),
        None => StdRng::from_entropy(),
    }
}

/// Per-VU handle passed to every [`Scenario::iteration`].
pub struct VuContext {
    vu_id: u64,
    iteration: u64,
    rng: StdRng,
    shared: Arc<RunShared>,
}

impl VuContext {
    pub(crate) fn new(vu_id: u64, shared: Arc<RunShared>) -> Self {
        Self {
            vu_id,
            iteration: 0,
            rng: vu_rng(shared.seed, vu_id),
            shared,
        }
    }

    /// 1-based, in spawn order.
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// 1-based iteration counter of this VU.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn scenario(&self) -> &str {
        &self.shared.scenario_name
    }

    /// Reproducible when the run has a seed.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Executes `req` and records the built-in request metrics under `name` (the URL when
    /// empty). Transport failures come back as a result with `error` set.
    pub async fn http(&self, name: &str, req: HttpRequest) -> RequestResult {
        let method = req.method.clone();
        let url = req.url.clone();
        let name = if name.is_empty() {
            url.clone()
        } else {
            name.to_string()
        };

        let started = Instant::now();
        let res = match self.shared.client.request(req).await {
            Ok(res) => RequestResult::from_response(name, method, url, started.elapsed(), res),
            Err(err) => {
                debug!(vu = self.vu_id, request = %name, error = %err, "transport error");
                RequestResult::from_error(name, method, url, started.elapsed(), &err)
            }
        };

        self.shared.track(self.shared.builtins.record_request(
            &self.shared.metrics,
            &self.shared.scenario_name,
            &res,
        ));
        res
    }

    pub async fn get(&self, name: &str, url: impl Into<String>) -> RequestResult {
        self.http(name, HttpRequest::get(url)).await
    }

    /// POSTs `body` as JSON with the extra `headers`.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        name: &str,
        url: impl Into<String>,
        body: &T,
        headers: &[(&str, &str)],
    ) -> ScenarioResult<RequestResult> {
        let body = serde_json::to_vec(body)?;
        let req = headers.iter().fold(
            HttpRequest::post(url, body).with_header("Content-Type", "application/json"),
            |req, (k, v)| req.with_header(*k, *v),
        );
        Ok(self.http(name, req).await)
    }

    /// Records one `checks` observation and returns `passed`.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        self.shared.track(self.shared.builtins.record_check(
            &self.shared.metrics,
            &self.shared.scenario_name,
            name,
            passed,
        ));
        passed
    }

    /// Evaluates every predicate (no short-circuit) and reports whether all passed.
    pub fn check_all(
        &self,
        res: &RequestResult,
        checks: &[(&str, &dyn Fn(&RequestResult) -> bool)],
    ) -> bool {
        checks
            .iter()
            .fold(true, |all, (name, predicate)| {
                self.check(name, predicate(res)) && all
            })
    }

    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn custom_tags(&self) -> [(&str, &str); 1] {
        [("scenario", &*self.shared.scenario_name)]
    }

    pub fn add_counter(&self, name: &str, value: u64) -> ScenarioResult {
        self.shared
            .metrics
            .record(name, &self.custom_tags(), Sample::Counter(value))?;
        Ok(())
    }

    pub fn add_rate(&self, name: &str, hit: bool) -> ScenarioResult {
        self.shared
            .metrics
            .record(name, &self.custom_tags(), Sample::Rate(hit))?;
        Ok(())
    }

    pub fn add_trend(&self, name: &str, value: f64) -> ScenarioResult {
        self.shared
            .metrics
            .record(name, &self.custom_tags(), Sample::Trend(value))?;
        Ok(())
    }

    pub fn set_gauge(&self, name: &str, value: i64) -> ScenarioResult {
        self.shared
            .metrics
            .record(name, &self.custom_tags(), Sample::Gauge(value))?;
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Iterates until the VU is retired (`stop`) or the run drains. An iteration still running
/// at the hard stop is dropped and counted as aborted.
pub(crate) async fn run_vu(mut vu: VuContext, stop: Arc<Signal>) {
    let shared = vu.shared.clone();
    debug!(vu = vu.vu_id, "vu started");

    while !stop.is_raised() && !shared.draining.is_raised() {
        vu.iteration += 1;
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = shared.hard_stop.wait() => None,
            res = AssertUnwindSafe(shared.scenario.iteration(&mut vu)).catch_unwind() => Some(res),
        };

        let outcome = match result {
            None => {
                warn!(vu = vu.vu_id, iteration = vu.iteration, "iteration abandoned at hard stop");
                IterationOutcome::Aborted
            }
            Some(Ok(Ok(()))) => IterationOutcome::Completed,
            Some(Ok(Err(err))) => {
                debug!(vu = vu.vu_id, iteration = vu.iteration, error = %err, "iteration failed");
                shared.track(shared.builtins.record_scenario_error(
                    &shared.metrics,
                    &shared.scenario_name,
                    &err,
                ));
                IterationOutcome::Failed
            }
            Some(Err(payload)) => {
                let err = ScenarioError::Panic(panic_message(payload.as_ref()));
                warn!(vu = vu.vu_id, iteration = vu.iteration, error = %err, "iteration panicked");
                shared.track(shared.builtins.record_scenario_error(
                    &shared.metrics,
                    &shared.scenario_name,
                    &err,
                ));
                IterationOutcome::Failed
            }
        };

        shared.track(shared.builtins.record_iteration(
            &shared.metrics,
            &shared.scenario_name,
            outcome,
            started.elapsed(),
        ));
        if outcome == IterationOutcome::Aborted {
            break;
        }

        if !shared.think_time.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(shared.think_time) => {}
                _ = stop.wait() => {}
                _ = shared.draining.wait() => {}
            }
        }
    }

    debug!(vu = vu.vu_id, iterations = vu.iteration, "vu finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng as _;

    #[test]
    fn seeded_streams_are_reproducible_per_vu() {
        let draw = |seed, vu| {
            let mut rng = vu_rng(Some(seed), vu);
            (0..8).map(|_| rng.gen_range(0..1000u32)).collect::<Vec<_>>()
        };
        assert_eq!(draw(7, 1), draw(7, 1));
        assert_ne!(draw(7, 1), draw(7, 2));
        assert_ne!(draw(7, 1), draw(8, 1));
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
