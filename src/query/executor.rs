//! Worker pool for asynchronous statement runs.
//!
//! Runs are blocking backend calls, so they execute on the blocking pool of a
//! dedicated tokio runtime. Each run reports through an [`AsyncResult`], a
//! future-like handle the caller blocks on with an optional timeout.

use crate::error::{DataError, StatementError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum number of runs executing concurrently
    pub worker_threads: usize,
    /// Name given to worker threads
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            thread_name: "sqlstmt-worker".to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }
}

type Outcome = Result<usize, DataError>;

#[derive(Debug, Default)]
struct Slot {
    outcome: Option<Outcome>,
    /// Whether a caller has read the outcome
    observed: bool,
}

/// Completion handle of one asynchronous run.
///
/// Clones observe the same run; the outcome can be read any number of times.
#[derive(Debug, Clone)]
pub struct AsyncResult {
    inner: Arc<(Mutex<Slot>, Condvar)>,
}

impl AsyncResult {
    pub(crate) fn pending() -> Self {
        Self {
            inner: Arc::new((Mutex::new(Slot::default()), Condvar::new())),
        }
    }

    /// A handle that is already resolved.
    pub(crate) fn ready(outcome: Outcome) -> Self {
        let result = Self::pending();
        result.complete(outcome);
        result
    }

    pub(crate) fn complete(&self, outcome: Outcome) {
        let (slot, ready) = &*self.inner;
        slot.lock().outcome = Some(outcome);
        ready.notify_all();
    }

    /// Whether the run has finished.
    pub fn is_ready(&self) -> bool {
        self.inner.0.lock().outcome.is_some()
    }

    /// Outcome of the run if it has finished.
    pub fn try_result(&self) -> Option<Outcome> {
        let mut slot = self.inner.0.lock();
        let outcome = slot.outcome.clone();
        slot.observed |= outcome.is_some();
        outcome
    }

    /// Block until the run finishes and return its row count or error.
    pub fn wait(&self) -> Outcome {
        let (slot, ready) = &*self.inner;
        let mut guard = slot.lock();
        loop {
            if let Some(outcome) = guard.outcome.clone() {
                guard.observed = true;
                return outcome;
            }
            ready.wait(&mut guard);
        }
    }

    /// Block for at most `timeout_ms` milliseconds.
    ///
    /// A timeout releases the caller only; the run continues in the background.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Timeout` if the run has not finished in time,
    /// otherwise the run's own error.
    pub fn wait_timeout(&self, timeout_ms: u64) -> Outcome {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let (slot, ready) = &*self.inner;
        let mut guard = slot.lock();
        loop {
            if let Some(outcome) = guard.outcome.clone() {
                guard.observed = true;
                return outcome;
            }
            if ready.wait_until(&mut guard, deadline).timed_out() && guard.outcome.is_none() {
                return Err(StatementError::Timeout { timeout_ms }.into());
            }
        }
    }

    /// Block until the run finishes without reading its outcome.
    pub(crate) fn join(&self) {
        let (slot, ready) = &*self.inner;
        let mut guard = slot.lock();
        while guard.outcome.is_none() {
            ready.wait(&mut guard);
        }
    }

    /// Block until the run finishes; return its error if no caller has read it.
    ///
    /// Marks the outcome as read.
    pub(crate) fn join_unobserved(&self) -> Result<(), DataError> {
        let (slot, ready) = &*self.inner;
        let mut guard = slot.lock();
        while guard.outcome.is_none() {
            ready.wait(&mut guard);
        }
        let unread = match &guard.outcome {
            Some(Err(e)) if !guard.observed => Some(e.clone()),
            _ => None,
        };
        guard.observed = true;
        unread.map_or(Ok(()), Err)
    }
}

/// Pool executing asynchronous statement runs.
#[derive(Debug)]
pub struct Executor {
    runtime: Option<Runtime>,
    config: ExecutorConfig,
}

impl Executor {
    /// Build a pool.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero worker threads and
    /// `WorkerFailed` if the runtime cannot be started.
    pub fn new(config: ExecutorConfig) -> Result<Self, DataError> {
        if config.worker_threads == 0 {
            return Err(DataError::config("worker_threads must be at least 1"));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .build()
            .map_err(|e| StatementError::WorkerFailed(format!("cannot start runtime: {}", e)))?;
        debug!(workers = config.worker_threads, name = %config.thread_name, "executor started");
        Ok(Self {
            runtime: Some(runtime),
            config,
        })
    }

    /// Process-wide pool with default settings, built on first use.
    pub fn shared() -> Result<Arc<Executor>, DataError> {
        static SHARED: OnceLock<Result<Arc<Executor>, DataError>> = OnceLock::new();
        SHARED
            .get_or_init(|| Executor::new(ExecutorConfig::default()).map(Arc::new))
            .clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `job` on a worker; a panic inside the job resolves the handle with
    /// `WorkerFailed`.
    pub(crate) fn spawn<F>(&self, job: F) -> AsyncResult
    where
        F: FnOnce() -> Outcome + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return AsyncResult::ready(Err(StatementError::WorkerFailed(
                "executor is shut down".to_string(),
            )
            .into()));
        };

        let result = AsyncResult::pending();
        let completion = result.clone();
        runtime.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(error = %message, "asynchronous run panicked");
                Err(StatementError::WorkerFailed(message).into())
            });
            completion.complete(outcome);
        });
        result
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
