//! SQL statement handle.
//!
//! This module provides the `Statement` type: SQL text, parameter bindings and
//! result extractions over a backend, executed synchronously on the caller's
//! thread or asynchronously on a worker pool.

use crate::backend::Backend;
use crate::error::DataError;
use crate::query::binding::{Direction, Param, TypedBinding};
use crate::query::config::StatementConfig;
use crate::query::core::{StatementCore, StatementState};
use crate::query::executor::{AsyncResult, Executor};
use crate::query::extraction::{ExtractOptions, Extraction};
use crate::query::paging::Paging;
use crate::query::storage::Storage;
use crate::types::{ColumnDescriptor, SqlType};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared by every handle to one statement.
struct Shared {
    core: Mutex<StatementCore>,
    /// Most recent asynchronous run
    pending: Mutex<Option<AsyncResult>>,
    /// Serializes asynchronous launches
    launch: Mutex<()>,
}

/// SQL statement for query execution.
///
/// A statement is built by appending SQL text and registering parameter
/// bindings and result extractions, then executed. Execution honours the
/// statement's paging policy: a run stopped by the policy is paused and the next
/// `execute()` call resumes it.
///
/// # Example
///
/// ```
/// use sqlstmt::backend::{MemoryBackend, MemoryTable};
/// use sqlstmt::query::{Paging, Statement};
/// use sqlstmt::types::{ColumnType, Value};
///
/// # fn main() -> Result<(), sqlstmt::DataError> {
/// let table = (1..=5).fold(MemoryTable::new().column("n", ColumnType::Int32), |t, i| {
///     t.row(vec![Value::Int32(i)])
/// });
/// let mut stmt = Statement::new(MemoryBackend::new().with_table("SELECT n FROM t", table));
/// stmt.append("SELECT n FROM t")?;
/// let n = stmt.extract::<i32>(0)?;
/// stmt.set_paging(Paging::step(2)?)?;
///
/// let mut total = 0;
/// while !stmt.is_done() {
///     total += stmt.execute()?;
/// }
/// assert_eq!(total, 5);
/// assert_eq!(n.len(), 5);
/// # Ok(())
/// # }
/// ```
pub struct Statement {
    shared: Arc<Shared>,
    executor: Option<Arc<Executor>>,
    is_async: bool,
}

impl Statement {
    /// Create a synchronous statement with default settings.
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_parts(Box::new(backend), StatementConfig::default())
    }

    /// Create a statement with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid.
    pub fn with_config(
        backend: impl Backend + 'static,
        config: StatementConfig,
    ) -> Result<Self, DataError> {
        config.validate()?;
        Ok(Self::from_parts(Box::new(backend), config))
    }

    fn from_parts(backend: Box<dyn Backend>, config: StatementConfig) -> Self {
        let is_async = config.is_async;
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(StatementCore::new(backend, config)),
                pending: Mutex::new(None),
                launch: Mutex::new(()),
            }),
            executor: None,
            is_async,
        }
    }

    /// Run asynchronous executions on `executor` instead of the shared pool.
    pub fn with_executor(mut self, executor: Arc<Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Apply a configuration, including the asynchronous flag.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings and a state error if
    /// the storage kind cannot change any more.
    pub fn configure(&mut self, config: StatementConfig) -> Result<&mut Self, DataError> {
        let is_async = config.is_async;
        self.shared.core.lock().configure(config)?;
        self.is_async = is_async;
        Ok(self)
    }

    /// Current configuration.
    pub fn config(&self) -> StatementConfig {
        let mut config = self.shared.core.lock().config().clone();
        config.is_async = self.is_async;
        config
    }

    /// Append a SQL fragment.
    ///
    /// # Errors
    ///
    /// Returns a state error unless the statement is initialized.
    pub fn append(&mut self, fragment: impl fmt::Display) -> Result<&mut Self, DataError> {
        self.shared.core.lock().append(&fragment.to_string())?;
        Ok(self)
    }

    /// SQL text.
    pub fn sql(&self) -> String {
        self.shared.core.lock().sql().to_string()
    }

    /// Bind an input value at a 1-based position.
    ///
    /// # Errors
    ///
    /// Returns a registration error for position 0 or a position already bound,
    /// and a state error unless the statement is initialized.
    pub fn bind<T: SqlType>(&mut self, position: usize, value: T) -> Result<&mut Self, DataError> {
        self.bind_param(position, &Param::new(value), Direction::In)
    }

    /// Bind a shared slot; output directions receive the backend's value after
    /// each run.
    pub fn bind_param<T: SqlType>(
        &mut self,
        position: usize,
        param: &Param<T>,
        direction: Direction,
    ) -> Result<&mut Self, DataError> {
        let binding = TypedBinding::new(position, param.clone(), direction);
        self.shared.core.lock().add_binding(Box::new(binding))?;
        Ok(self)
    }

    /// Remove all bindings.
    pub fn clear_bindings(&mut self) -> Result<&mut Self, DataError> {
        self.shared.core.lock().clear_bindings()?;
        Ok(self)
    }

    pub fn binding_count(&self) -> usize {
        self.shared.core.lock().binding_count()
    }

    /// Extract column `position` of the first result set in bound mode.
    pub fn extract<T: SqlType>(&mut self, position: usize) -> Result<Extraction<T>, DataError> {
        self.extract_with(position, ExtractOptions::default())
    }

    /// Extract a column with explicit options.
    ///
    /// # Errors
    ///
    /// Returns a state error unless the statement is initialized, and a
    /// registration error for a duplicate column or a storage kind that
    /// conflicts with existing extractions.
    pub fn extract_with<T: SqlType>(
        &mut self,
        position: usize,
        options: ExtractOptions,
    ) -> Result<Extraction<T>, DataError> {
        self.shared.core.lock().add_extraction(position, options)
    }

    /// Number of extractions, including the ones created for record sets.
    pub fn extraction_count(&self) -> usize {
        self.shared.core.lock().extraction_count()
    }

    /// Execute or resume the statement and return the rows produced.
    ///
    /// An asynchronous statement starts a worker run and returns 0; the row
    /// count is retrieved through [`Statement::wait`].
    ///
    /// # Errors
    ///
    /// Returns any error raised while preparing, binding or fetching, and the
    /// error of an earlier asynchronous run that no caller has read yet.
    pub fn execute(&mut self) -> Result<usize, DataError> {
        if self.is_async {
            self.execute_async()?;
            return Ok(0);
        }
        self.join_pending()?;
        self.shared.core.lock().execute()
    }

    /// Execute once on a worker.
    ///
    /// Blocks until an outstanding asynchronous run has finished before the new
    /// run starts. Does not change the asynchronous flag.
    ///
    /// # Errors
    ///
    /// Returns `WorkerFailed` if no worker pool is available, and the error of
    /// the previous run if no caller has read it; no new run starts then.
    /// Errors of the new run are reported by the returned handle.
    pub fn execute_async(&self) -> Result<AsyncResult, DataError> {
        let _launch = self.shared.launch.lock();
        self.join_pending()?;

        let executor = match &self.executor {
            Some(executor) => Arc::clone(executor),
            None => Executor::shared()?,
        };
        let shared = Arc::clone(&self.shared);
        let result = executor.spawn(move || shared.core.lock().execute());
        *self.shared.pending.lock() = Some(result.clone());
        debug!("asynchronous run launched");
        Ok(result)
    }

    /// Wait for the most recent asynchronous run.
    ///
    /// Returns 0 immediately if no asynchronous run was started.
    pub fn wait(&self) -> Result<usize, DataError> {
        let pending = self.shared.pending.lock().clone();
        match pending {
            Some(result) => result.wait(),
            None => Ok(0),
        }
    }

    /// Wait for the most recent asynchronous run for at most `timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns a timeout error if the run is still in flight; the run keeps going.
    pub fn wait_timeout(&self, timeout_ms: u64) -> Result<usize, DataError> {
        let pending = self.shared.pending.lock().clone();
        match pending {
            Some(result) => result.wait_timeout(timeout_ms),
            None => Ok(0),
        }
    }

    /// Block until an outstanding asynchronous run has finished.
    fn synchronize(&self) {
        let pending = self.shared.pending.lock().clone();
        if let Some(result) = pending {
            result.join();
        }
    }

    /// Like `synchronize`, but surfaces a failure nobody has read.
    fn join_pending(&self) -> Result<(), DataError> {
        let pending = self.shared.pending.lock().clone();
        let Some(previous) = pending else {
            return Ok(());
        };
        if !previous.is_ready() {
            debug!("waiting for outstanding asynchronous run");
        }
        previous.join_unobserved().map_err(|e| {
            warn!(error = %e, "earlier asynchronous run failed");
            e
        })
    }

    /// Route `execute()` through the worker pool.
    pub fn set_async(&mut self, is_async: bool) -> &mut Self {
        self.is_async = is_async;
        self
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// New handle to the same statement.
    ///
    /// Blocks until an outstanding asynchronous run has finished, so the new
    /// handle never observes a run in flight.
    pub fn share(&self) -> Statement {
        self.synchronize();
        Statement {
            shared: Arc::clone(&self.shared),
            executor: self.executor.clone(),
            is_async: self.is_async,
        }
    }

    /// Return to the initialized state, keeping SQL text and registrations.
    ///
    /// Waits for an outstanding asynchronous run first.
    pub fn reset(&mut self) -> &mut Self {
        self.synchronize();
        self.shared.core.lock().reset();
        *self.shared.pending.lock() = None;
        self
    }

    /// Lifecycle state; `Executing` while a run holds the statement.
    pub fn state(&self) -> StatementState {
        match self.shared.core.try_lock() {
            Some(core) => core.state(),
            None => StatementState::Executing,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == StatementState::Initialized
    }

    pub fn is_paused(&self) -> bool {
        self.state() == StatementState::Paused
    }

    pub fn is_done(&self) -> bool {
        self.state() == StatementState::Done
    }

    /// Change the storage kind.
    ///
    /// # Errors
    ///
    /// Returns a state error once extractions exist or while a run is active.
    pub fn set_storage(&mut self, storage: Storage) -> Result<&mut Self, DataError> {
        self.shared.core.lock().set_storage(storage)?;
        Ok(self)
    }

    pub fn storage(&self) -> Storage {
        self.shared.core.lock().config().storage
    }

    pub fn can_modify_storage(&self) -> bool {
        self.shared.core.lock().can_modify_storage()
    }

    /// Change the paging policy; applies from the next `execute()` call.
    pub fn set_paging(&mut self, paging: Paging) -> Result<&mut Self, DataError> {
        self.shared.core.lock().set_paging(paging)?;
        Ok(self)
    }

    pub fn paging(&self) -> Paging {
        self.shared.core.lock().config().paging
    }

    /// Columns of the first result set, known once the statement is prepared.
    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.columns_for(0)
    }

    /// Columns of a result set reached by the current run.
    pub fn columns_for(&self, result_set: usize) -> Vec<ColumnDescriptor> {
        self.shared
            .core
            .lock()
            .columns(result_set)
            .map(<[ColumnDescriptor]>::to_vec)
            .unwrap_or_default()
    }

    pub fn column_count(&self) -> usize {
        self.columns().len()
    }

    /// Whether column `position` of the last fetched row is NULL.
    pub fn is_null(&self, position: usize) -> bool {
        self.shared.core.lock().is_null(position)
    }

    /// Rows extracted by the current run, across all result sets.
    pub fn rows_extracted(&self) -> usize {
        self.shared.core.lock().rows_extracted()
    }

    /// Rows extracted from one result set by the current run.
    pub fn row_count(&self, result_set: usize) -> usize {
        self.shared.core.lock().row_count(result_set)
    }

    /// Rows affected by the last run, for statements that report it.
    pub fn affected_rows(&self) -> Option<u64> {
        self.shared.core.lock().affected_rows()
    }

    /// Diagnostic text of the backend's most recent failure.
    pub fn last_error(&self) -> String {
        self.shared.core.lock().last_error()
    }

    pub fn begin(&mut self) -> Result<(), DataError> {
        self.shared.core.lock().begin()
    }

    pub fn commit(&mut self) -> Result<(), DataError> {
        self.shared.core.lock().commit()
    }

    pub fn rollback(&mut self) -> Result<(), DataError> {
        self.shared.core.lock().rollback()
    }

    /// Run `f` against the core.
    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&StatementCore) -> R) -> R {
        f(&self.shared.core.lock())
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("state", &self.state())
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}
