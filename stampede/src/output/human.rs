use std::sync::Arc;

mod duration;
mod format;
mod progress;
mod summary;

use duration::format_duration_single;
use format::format_rate;
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;
use crate::config::Settings;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

pub(crate) fn progress_message(u: &stampede_core::ProgressUpdate) -> String {
    let stage = &u.stage;
    let mut msg = format!(
        "stage={}/{} target={} vus={}/{} elapsed={} stage_remaining={} iters/s={} rps={} failed={} checks_failed={}",
        stage.index + 1,
        stage.count,
        stage.current_target,
        u.active_vus,
        u.desired_vus,
        format_duration_single(u.elapsed),
        format_duration_single(stage.stage_remaining),
        format_rate(u.iterations_per_sec),
        format_rate(u.requests_per_sec),
        u.failed_requests_total,
        u.checks_failed_total,
    );
    if u.draining {
        msg.push_str(&format!(" draining={}", u.retiring_vus));
    }
    msg
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario: &str, settings: &Settings) {
        let plan = &settings.run.plan;
        self.progress.set_prefix(scenario);
        println!("scenario: {scenario}");
        println!("target: {}", settings.base_url);
        println!(
            "stages: {} duration={} max_vus={} think_time={}",
            plan.stages().len(),
            format_duration_single(plan.total_duration()),
            plan.max_target(),
            format_duration_single(settings.run.think_time),
        );
        println!();
    }

    fn progress(&self) -> Option<stampede_core::ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u| {
            progress.update(u.total_duration, u.elapsed, progress_message(&u));
        }))
    }

    fn print_summary(&self, report: &stampede_core::RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        let failed: Vec<_> = report.failed_thresholds().collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                match (t.observed, &t.detail) {
                    (Some(obs), _) => eprintln!("  {}: {} (observed {obs})", t.metric, t.expression),
                    (None, Some(detail)) => {
                        eprintln!("  {}: {} ({detail})", t.metric, t.expression)
                    }
                    (None, None) => eprintln!("  {}: {}", t.metric, t.expression),
                }
            }
        }

        Ok(())
    }
}
