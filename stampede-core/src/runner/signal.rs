use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot latch: once raised it stays raised and wakes every waiter.
#[derive(Debug, Default)]
pub struct Signal {
    raised: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            // Register before checking the flag so a concurrent `raise` is never missed.
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wakes_waiters_raised_after_they_started_waiting() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.raise();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap_or_else(|e| panic!("{e}"))
            .unwrap_or_else(|e| panic!("{e}"));
    }

    #[tokio::test]
    async fn wait_returns_immediately_once_raised() {
        let signal = Signal::new();
        signal.raise();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(signal.is_raised());
    }
}
