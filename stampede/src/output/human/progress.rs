use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

struct Inner {
    multi: MultiProgress,
    prefix: String,
    bar: Option<ProgressBar>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        Self {
            inner: Mutex::new(Inner {
                multi,
                prefix: "run".to_string(),
                bar: None,
            }),
        }
    }

    pub(crate) fn set_prefix(&self, prefix: &str) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.prefix = prefix.to_string();
        if let Some(pb) = &inner.bar {
            pb.set_prefix(prefix.to_string());
        }
    }

    /// Positions the bar at `elapsed` out of `total`. Drain time past `total` pins it at 100%.
    pub(crate) fn update(&self, total: Duration, elapsed: Duration, message: String) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let total_ms = total.as_millis() as u64;
        let elapsed_ms = elapsed.as_millis() as u64;
        let pb = inner.get_or_create_bar();
        pb.set_message(message);
        pb.set_length(total_ms);
        pb.set_position(elapsed_ms.min(total_ms));
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(pb) = inner.bar.take() {
            pb.finish_and_clear();
        }

        let _ = inner.multi.clear();
    }
}

impl Inner {
    fn get_or_create_bar(&mut self) -> &ProgressBar {
        let Self { multi, prefix, bar } = self;
        bar.get_or_insert_with(|| {
            let pb = multi.add(ProgressBar::new(0));
            pb.set_style(bar_style());
            pb.set_prefix(prefix.clone());
            pb
        })
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_clamps_position_to_total() {
        let progress = HumanProgress::new();
        progress.set_prefix("ecommerce");
        progress.update(Duration::from_secs(10), Duration::from_secs(12), "draining".to_string());

        let inner = progress
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let pb = inner.bar.as_ref().unwrap_or_else(|| panic!("bar not created"));
        assert_eq!(pb.length(), Some(10_000));
        assert_eq!(pb.position(), 10_000);
        assert_eq!(pb.prefix(), "ecommerce");
        drop(inner);

        progress.finish();
    }
}
