//! Backend protocol abstraction trait.
//!
//! This module defines the `Backend` trait that abstracts the concrete database
//! driver behind a statement. Every backend (SQL dialect, driver API, type
//! system) satisfies the same contract, so the statement core, extraction
//! dispatch and record sets work unchanged on top of any of them.

use crate::error::{BackendError, DataError};
use crate::query::binding::Direction;
use crate::types::{ColumnDescriptor, ColumnType, Value};

/// Outcome of one fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOutcome {
    /// Number of rows delivered to the sink during this cycle
    pub rows_returned: usize,
    /// Whether the current result set has no more rows
    pub exhausted: bool,
}

impl FetchOutcome {
    /// Create a fetch outcome.
    pub fn new(rows_returned: usize, exhausted: bool) -> Self {
        Self {
            rows_returned,
            exhausted,
        }
    }
}

/// Result of a chunked read of a variable-length column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRead {
    /// The value is SQL NULL; no further chunks will be requested
    Null,
    /// Number of bytes written into the buffer, `0` once the value is consumed
    Data(usize),
}

/// Read access to the row a backend is currently delivering.
pub trait RowReader {
    /// Number of columns in the row.
    fn column_count(&self) -> usize;

    /// Backend-reported type of the column.
    fn column_type(&self, position: usize) -> ColumnType;

    /// Whether the column value is SQL NULL.
    fn is_null(&self, position: usize) -> bool;

    /// Read the complete value of a column.
    ///
    /// # Errors
    ///
    /// Returns an error if the position is invalid or the driver fails.
    fn value(&mut self, position: usize) -> Result<Value, DataError>;

    /// Read the next chunk of a variable-length column starting at `offset`.
    ///
    /// Returns [`ChunkRead::Null`] for NULL values and `ChunkRead::Data(0)` once
    /// the value has been transferred completely.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is not variable-length or the driver fails.
    fn read_chunk(
        &mut self,
        position: usize,
        offset: usize,
        buffer: &mut [u8],
    ) -> Result<ChunkRead, DataError>;
}

/// Receiver of fetched rows, implemented by the statement's extraction registry.
pub trait RowSink {
    /// Accept one row; every registered extraction reads its column from it.
    ///
    /// # Errors
    ///
    /// Returns an error if an extraction fails. The backend must stop fetching
    /// and propagate the error.
    fn accept_row(&mut self, row: &mut dyn RowReader) -> Result<(), DataError>;
}

/// Backend implementation contract for statement execution.
///
/// A statement prepares its SQL text once, then for every run binds each
/// parameter, calls [`Backend::execute`], and drives fetch cycles until the
/// paging policy stops it or the backend reports exhaustion.
///
/// Calls are blocking from the statement's point of view.
pub trait Backend: Send {
    /// Prepare SQL text and describe the columns of its first result set.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Prepare` on malformed SQL.
    fn prepare(&mut self, sql: &str) -> Result<Vec<ColumnDescriptor>, BackendError>;

    /// Bind a parameter value for the next run.
    ///
    /// Positions are 1-based.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Bind` if the position is invalid for the prepared text.
    fn bind_parameter(
        &mut self,
        position: usize,
        value: &Value,
        direction: Direction,
    ) -> Result<(), BackendError>;

    /// Start a run of the prepared statement with the bound parameters.
    ///
    /// Restarts from the first row when called again. Returns the number of
    /// affected rows for statements that report one.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Execution` if the run cannot be started.
    fn execute(&mut self) -> Result<Option<u64>, BackendError>;

    /// Deliver up to `max_rows` rows of the current result set to the sink.
    ///
    /// # Errors
    ///
    /// Returns sink errors unchanged and `BackendError::Fetch` for driver failures.
    fn fetch(&mut self, max_rows: usize, sink: &mut dyn RowSink)
        -> Result<FetchOutcome, DataError>;

    /// Advance to the next result set, returning its columns.
    ///
    /// Backends without multiple result sets keep the default.
    fn next_result_set(&mut self) -> Result<Option<Vec<ColumnDescriptor>>, BackendError> {
        Ok(None)
    }

    /// Type of the column in the current result set.
    fn column_type(&self, position: usize) -> Option<ColumnType>;

    /// Name of the column in the current result set.
    fn column_name(&self, position: usize) -> Option<String>;

    /// Whether the column of the most recently fetched row is NULL.
    fn is_null(&self, position: usize) -> bool;

    /// Value of an output parameter after a run.
    fn output_parameter(&mut self, position: usize) -> Result<Value, BackendError> {
        Err(BackendError::Unsupported(format!(
            "output parameter {}",
            position
        )))
    }

    /// Diagnostic text for the most recent failure.
    fn last_error(&self) -> String;

    /// Begin a transaction.
    fn begin(&mut self) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("begin transaction".to_string()))
    }

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("commit".to_string()))
    }

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("rollback".to_string()))
    }
}
