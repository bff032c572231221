use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// ShutdownSignal
// ---------------------------------------------------------------------------

/// Process-wide shutdown request.
///
/// Cloning shares the same flag. Loops either poll [`is_shutting_down`]
/// or await [`wait`] inside a `select!`.
///
/// ```ignore
/// let shutdown = ShutdownSignal::new();
/// shutdown.trigger_on(os_signals::wait_for_shutdown_signal());
/// daemon.run(source, shutdown.wait()).await;
/// ```
///
/// [`is_shutting_down`]: ShutdownSignal::is_shutting_down
/// [`wait`]: ShutdownSignal::wait
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    trigger: broadcast::Sender<()>,
    shutting_down: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (trigger, _) = broadcast::channel(1);
        Self {
            trigger,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.trigger.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    /// Request shutdown. Only the first call has an effect.
    pub fn trigger(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            info!("shutdown signal triggered");
            let _ = self.trigger.send(());
        } else {
            debug!("shutdown already triggered");
        }
    }

    /// Resolve once shutdown has been requested, including requests made
    /// before this call.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Spawn a task that triggers shutdown when `source` resolves.
    ///
    /// An `Err` from the source is logged and still treated as a request,
    /// so a broken signal handler cannot leave the process unkillable.
    pub fn trigger_on<F, E>(&self, source: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let signal = self.clone();
        tokio::spawn(async move {
            if let Err(e) = source.await {
                tracing::error!(error = %e, "shutdown source failed");
            }
            signal.trigger();
        })
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_signal_is_not_shutting_down() {
        assert!(!ShutdownSignal::new().is_shutting_down());
    }

    #[test]
    fn double_trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutting_down());
    }

    #[test]
    fn clone_shares_state() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        signal.trigger();
        assert!(clone.is_shutting_down());
    }

    #[tokio::test]
    async fn wait_returns_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::task::yield_now().await;
        signal.trigger();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn wait_after_trigger_is_immediate() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .expect("already triggered");
    }

    #[tokio::test]
    async fn trigger_on_failed_source_still_triggers() {
        let signal = ShutdownSignal::new();
        let handle = signal.trigger_on(async { Err::<(), _>("no signal handler") });
        handle.await.unwrap();
        assert!(signal.is_shutting_down());
    }
}
