//! Error types for sqlstmt.
//!
//! This module defines domain-specific error types organized by functional area.

use crate::query::core::StatementState;
use crate::types::ColumnType;
use std::fmt;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Statement lifecycle, registration and paging errors
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Data extraction and record access errors
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Errors reported by the backend implementation
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to the statement lifecycle and configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatementError {
    /// Operation is not valid in the current lifecycle state
    #[error("Cannot {operation} while statement is {state}")]
    InvalidState {
        operation: &'static str,
        state: StatementState,
    },

    /// Invalid binder or extractor registration
    #[error("Registration error at position {position}: {message}")]
    Registration { position: usize, message: String },

    /// Invalid paging or statement configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A hard limit was not satisfied before the end of data
    #[error("Limit of {limit} rows not reached: end of data after {rows} rows")]
    LimitNotReached { limit: usize, rows: usize },

    /// Waiting for an asynchronous execution timed out
    #[error("Asynchronous execution did not complete within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The asynchronous worker failed outside of statement execution
    #[error("Asynchronous worker failed: {0}")]
    WorkerFailed(String),
}

/// Errors related to extracting and accessing result data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// Requested type differs from the type reported by the backend
    #[error("Type mismatch at column {position}: expected {expected}, backend reports {actual}")]
    TypeMismatch {
        position: usize,
        expected: ColumnType,
        actual: ColumnType,
    },

    /// Returned data does not fit into the extraction buffer
    #[error("Data truncation at column {position}: {size} bytes exceed buffer capacity of {capacity} bytes")]
    DataTruncation {
        position: usize,
        size: usize,
        capacity: usize,
    },

    /// Dynamic extraction hit a backend type that has no value cell
    #[error("Unsupported type '{type_name}' at column {position}")]
    UnsupportedType { position: usize, type_name: String },

    /// Record access hit a column type that cannot be represented
    #[error("Unknown type '{type_name}' for column {column}")]
    UnknownType { column: usize, type_name: String },

    /// Row index outside of the extracted rows
    #[error("Row {row} out of range (row count {row_count})")]
    RowOutOfRange { row: usize, row_count: usize },

    /// Column index outside of the available columns
    #[error("Column {column} out of range (column count {column_count})")]
    ColumnOutOfRange { column: usize, column_count: usize },

    /// No column with the given name
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),
}

/// Errors reported by a backend implementation.
///
/// The message carries whatever the backend reported through `last_error()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Statement preparation failed (e.g. malformed SQL)
    #[error("Failed to prepare statement: {0}")]
    Prepare(String),

    /// Parameter binding failed
    #[error("Failed to bind parameter {position}: {message}")]
    Bind { position: usize, message: String },

    /// Statement execution failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Fetching rows failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Backend does not support the requested operation
    #[error("Operation not supported by backend: {0}")]
    Unsupported(String),
}

/// Error kinds, one per named failure category of the execution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid operation for the current lifecycle state
    State,
    /// Bad binder/extractor position or conflicting storage change
    Registration,
    /// Bound-mode type disagreement
    TypeMismatch,
    /// Caller buffer too small for returned data
    DataTruncation,
    /// Dynamic dispatch hit an unsupported backend type
    UnsupportedType,
    /// Record access hit an unknown column type
    UnknownType,
    /// Invalid paging configuration
    Config,
    /// Hard limit not satisfied before end of data
    LimitNotReached,
    /// Out-of-bounds row or column access
    Range,
    /// Waiting for an asynchronous run timed out
    Timeout,
    /// Pass-through backend failure
    Backend,
    /// An asynchronous worker crashed or could not be started
    WorkerFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::State => write!(f, "STATE"),
            ErrorKind::Registration => write!(f, "REGISTRATION"),
            ErrorKind::TypeMismatch => write!(f, "TYPE_MISMATCH"),
            ErrorKind::DataTruncation => write!(f, "DATA_TRUNCATION"),
            ErrorKind::UnsupportedType => write!(f, "UNSUPPORTED_TYPE"),
            ErrorKind::UnknownType => write!(f, "UNKNOWN_TYPE"),
            ErrorKind::Config => write!(f, "CONFIG"),
            ErrorKind::LimitNotReached => write!(f, "LIMIT_NOT_REACHED"),
            ErrorKind::Range => write!(f, "RANGE"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::Backend => write!(f, "BACKEND"),
            ErrorKind::WorkerFailed => write!(f, "WORKER_FAILED"),
        }
    }
}

impl DataError {
    /// Map to the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::Statement(e) => e.kind(),
            DataError::Extraction(e) => e.kind(),
            DataError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Shorthand for an invalid-state error.
    pub(crate) fn state(operation: &'static str, state: StatementState) -> Self {
        StatementError::InvalidState { operation, state }.into()
    }

    /// Shorthand for a registration error.
    pub(crate) fn registration(position: usize, message: impl Into<String>) -> Self {
        StatementError::Registration {
            position,
            message: message.into(),
        }
        .into()
    }

    /// Shorthand for a configuration error.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        StatementError::Config(message.into()).into()
    }
}

impl StatementError {
    /// Map to the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StatementError::InvalidState { .. } => ErrorKind::State,
            StatementError::Registration { .. } => ErrorKind::Registration,
            StatementError::Config(_) => ErrorKind::Config,
            StatementError::LimitNotReached { .. } => ErrorKind::LimitNotReached,
            StatementError::Timeout { .. } => ErrorKind::Timeout,
            StatementError::WorkerFailed(_) => ErrorKind::WorkerFailed,
        }
    }
}

impl ExtractionError {
    /// Map to the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ExtractionError::DataTruncation { .. } => ErrorKind::DataTruncation,
            ExtractionError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            ExtractionError::UnknownType { .. } => ErrorKind::UnknownType,
            ExtractionError::RowOutOfRange { .. }
            | ExtractionError::ColumnOutOfRange { .. }
            | ExtractionError::UnknownColumn(_) => ErrorKind::Range,
        }
    }
}
