use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tracing::warn;

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Cooperative cancellation flag, cloned into everything that loops.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag on SIGINT or SIGTERM. Call once per process.
    pub fn install_signal_handler(&self) -> Result<()> {
        let flag = self.flag.clone();
        ctrlc::set_handler(move || {
            warn!("shutdown requested, finishing current step");
            flag.store(true, Ordering::Relaxed);
        })
        .context("failed to install signal handler")
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleeps for `duration` in short slices. Returns `false` if cancelled
    /// before the time ran out.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_shared_between_clones() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        assert!(!clone.is_triggered());
        shutdown.trigger();
        assert!(clone.is_triggered());
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::ZERO));
        shutdown.trigger();
        let started = Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
