//! Scoped supervision of one long-running background operation.
//!
//! [`TaskSupervisor::enter`] spawns the operation and returns a
//! [`SupervisedTask`] that owns its cancellation token and join handle.
//! Leaving the scope ([`SupervisedTask::exit`], [`SupervisedTask::scoped`],
//! or simply dropping the handle) always stops the operation:
//!
//! ```text
//! finished already      → capture result
//! still running         → cancel token → wait ≤ cleanup_timeout
//!   stopped in time     → capture result
//!   ignored cancellation→ abort + record Abandoned
//! ```
//!
//! Failures (errors and panics) are recorded in the [`TaskOutcome`] and
//! logged; they never propagate to the caller.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

// ---------------------------------------------------------------------------
// TaskOutcome
// ---------------------------------------------------------------------------

/// Terminal outcome of a supervised operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    /// The operation returned a value, on its own or after cancellation.
    Completed(T),
    /// The operation returned an error or panicked.
    Failed(String),
    /// The operation was aborted before it produced anything.
    Cancelled,
    /// The operation ignored cancellation past the cleanup timeout and was
    /// left to the runtime.
    Abandoned,
}

impl<T> TaskOutcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            TaskOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed(_) => "completed",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Cancelled => "cancelled",
            TaskOutcome::Abandoned => "abandoned",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskSupervisor
// ---------------------------------------------------------------------------

/// Factory side of a supervised scope: a diagnostic name and a cleanup
/// timeout.
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    name: String,
    cleanup_timeout: Duration,
}

impl TaskSupervisor {
    pub fn new(name: impl Into<String>, cleanup_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            cleanup_timeout,
        }
    }

    /// Start the operation and return immediately.
    ///
    /// `factory` receives the token the operation must watch; the returned
    /// future runs on the tokio runtime until it finishes or is stopped.
    pub fn enter<F, Fut, T, E>(self, factory: F) -> SupervisedTask<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let operation = factory(cancel.clone());
        let handle = tokio::spawn(async move { operation.await.map_err(|e| e.to_string()) });
        debug!(task = %self.name, "supervised task started");

        SupervisedTask {
            name: self.name,
            cleanup_timeout: self.cleanup_timeout,
            cancel,
            handle: Some(handle),
            outcome: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SupervisedTask
// ---------------------------------------------------------------------------

/// Handle to a running supervised operation. Exclusively owns the
/// operation's token and join handle until the scope is exited.
pub struct SupervisedTask<T> {
    name: String,
    cleanup_timeout: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<T, String>>>,
    outcome: Option<TaskOutcome<T>>,
}

impl<T> SupervisedTask<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once the operation has stopped on its own or the scope exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Outcome recorded at scope exit; `None` while the scope is open.
    pub fn outcome(&self) -> Option<&TaskOutcome<T>> {
        self.outcome.as_ref()
    }

    /// Captured result after scope exit. `None` is a valid terminal answer
    /// (cancelled, failed, abandoned, or not exited yet).
    pub fn result(&self) -> Option<&T> {
        self.outcome.as_ref().and_then(TaskOutcome::value)
    }

    /// Leave the scope: stop the operation and record its outcome.
    ///
    /// Completes within `cleanup_timeout` (plus scheduling slack) no matter
    /// what the operation does. Calling it again returns the recorded
    /// outcome.
    pub async fn exit(&mut self) -> &TaskOutcome<T> {
        let outcome = match self.outcome.take() {
            Some(outcome) => outcome,
            None => self.teardown().await,
        };
        self.outcome.insert(outcome)
    }

    /// Exit and hand the outcome over by value.
    pub async fn into_outcome(mut self) -> TaskOutcome<T> {
        self.exit().await;
        self.outcome.take().unwrap_or(TaskOutcome::Cancelled)
    }

    /// Run `body` while the operation is active, then exit the scope.
    ///
    /// If `body` panics or the returned future is dropped, [`Drop`] still
    /// cancels and aborts the operation.
    pub async fn scoped<B, R>(mut self, body: B) -> (R, TaskOutcome<T>)
    where
        B: Future<Output = R>,
    {
        let r = body.await;
        self.exit().await;
        let outcome = self.outcome.take().unwrap_or(TaskOutcome::Cancelled);
        (r, outcome)
    }

    async fn teardown(&mut self) -> TaskOutcome<T> {
        let Some(mut handle) = self.handle.take() else {
            return TaskOutcome::Cancelled;
        };

        if handle.is_finished() {
            let outcome = self.record(handle.await);
            debug!(task = %self.name, outcome = outcome.label(), "supervised task already finished");
            return outcome;
        }

        self.cancel.cancel();
        match tokio::time::timeout(self.cleanup_timeout, &mut handle).await {
            Ok(joined) => {
                let outcome = self.record(joined);
                debug!(task = %self.name, outcome = outcome.label(), "supervised task stopped");
                outcome
            }
            Err(_) => {
                warn!(
                    task = %self.name,
                    timeout_ms = self.cleanup_timeout.as_millis() as u64,
                    "supervised task ignored cancellation, abandoning it"
                );
                handle.abort();
                TaskOutcome::Abandoned
            }
        }
    }

    fn record(&self, joined: Result<Result<T, String>, JoinError>) -> TaskOutcome<T> {
        match joined {
            Ok(Ok(value)) => TaskOutcome::Completed(value),
            Ok(Err(message)) => {
                error!(task = %self.name, error = %message, "supervised task failed");
                TaskOutcome::Failed(message)
            }
            Err(e) if e.is_panic() => {
                let message = format!("panicked: {}", panic_message(e.into_panic()));
                error!(task = %self.name, error = %message, "supervised task failed");
                TaskOutcome::Failed(message)
            }
            Err(_) => TaskOutcome::Cancelled,
        }
    }
}

impl<T> Drop for SupervisedTask<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel.cancel();
            handle.abort();
            debug!(task = %self.name, "supervised task dropped without exit, aborted");
        }
    }
}

impl<T> fmt::Debug for SupervisedTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedTask")
            .field("name", &self.name)
            .field("cleanup_timeout", &self.cleanup_timeout)
            .field("finished", &self.is_finished())
            .field("outcome", &self.outcome.as_ref().map(TaskOutcome::label))
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
