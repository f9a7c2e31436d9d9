//! Watchdog timer
//!
//! Runs on the tokio timer, independent of the Script Host thread. Expiry is
//! only ever posted back through the callback; the watchdog never touches
//! session state itself.

use std::time::Duration;

use jsrunner_protocol::RunId;
use tokio::task::JoinHandle;

/// Cancelable one-shot timer for a single run
#[derive(Debug)]
pub struct Watchdog {
    run_id: RunId,
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Arm a timer that calls `on_expire` once `timeout` elapses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(run_id: RunId, timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce(RunId) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::debug!(%run_id, ?timeout, "Watchdog expired");
            on_expire(run_id);
        });

        Self { run_id, handle }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Cancel the timer. A no-op if it already fired.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let run_id = RunId::new();

        let watchdog = Watchdog::arm(run_id, Duration::from_millis(500), move |id| {
            assert_eq!(id, run_id);
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watchdog.run_id(), run_id);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_watchdog_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        let watchdog = Watchdog::arm(RunId::new(), Duration::from_millis(100), move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        watchdog.cancel();
        // Cancelling twice is harmless
        watchdog.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        drop(Watchdog::arm(RunId::new(), Duration::from_millis(100), move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
