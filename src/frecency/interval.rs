//! Recalculation check interval

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Periodic wake-up source for the recalculator's deferred task.
///
/// Ticks only wake the task; the task itself checks the database before
/// doing any work.
#[cfg_attr(test, mockall::automock)]
pub trait RecalculationInterval: Send + Sync {
    /// Begin waking `wake` periodically. Starting twice is a no-op.
    fn start(&self, wake: Arc<Notify>);

    /// Stop waking. Stopping a stopped interval is a no-op.
    fn stop(&self);
}

/// Interval backed by a tokio task
pub struct TokioInterval {
    period: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TokioInterval {
    /// Create a stopped interval
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            handle: Mutex::new(None),
        }
    }

    /// Whether the ticking task is alive
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }
}

impl RecalculationInterval for TokioInterval {
    /// Must be called from within a tokio runtime.
    fn start(&self, wake: Arc<Notify>) {
        let Ok(mut handle) = self.handle.lock() else {
            return;
        };
        if handle.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let period = self.period;
        log::debug!("Starting frecency recalculation check every {:?}", period);
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                wake.notify_one();
            }
        }));
    }

    fn stop(&self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(task) = handle.take() {
                log::debug!("Stopping frecency recalculation check");
                task.abort();
            }
        }
    }
}

impl Drop for TokioInterval {
    fn drop(&mut self) {
        self.stop();
    }
}
