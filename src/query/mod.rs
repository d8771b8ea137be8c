//! Statement execution and result handling.
//!
//! This module provides the statement layer on top of a [`Backend`](crate::backend::Backend):
//! SQL text, parameter bindings, result extractions, paging and record sets.
//!
//! # Overview
//!
//! The query module is organized into:
//! - `statement` - the public statement handle, synchronous and asynchronous execution
//! - `core` - lifecycle state machine and fetch driver
//! - `binding` / `extraction` - typed parameter slots and result columns
//! - `paging` - limit, range and step policies
//! - `record_set` / `row` - cached random-access views over extracted rows
//!
//! # Example
//!
//! ```
//! use sqlstmt::backend::{MemoryBackend, MemoryTable};
//! use sqlstmt::query::{RecordSet, Statement};
//! use sqlstmt::types::{ColumnDescriptor, ColumnType, Value};
//!
//! # fn main() -> Result<(), sqlstmt::DataError> {
//! let backend = MemoryBackend::new().with_echo(
//!     "SELECT ?, ?",
//!     vec![
//!         ColumnDescriptor::new("a", ColumnType::Int32),
//!         ColumnDescriptor::new("b", ColumnType::String),
//!     ],
//! );
//! let mut stmt = Statement::new(backend);
//! stmt.append("SELECT ?, ?")?.bind(1, 7i32)?.bind(2, "seven".to_string())?;
//!
//! let rs = RecordSet::new(stmt)?;
//! assert_eq!(rs.value(0, 0)?, Value::Int32(7));
//! assert_eq!(rs.value("b", 0)?, Value::from("seven"));
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod config;
pub(crate) mod core;
pub mod executor;
pub mod extraction;
pub mod paging;
pub mod record_set;
pub mod row;
pub mod statement;
pub mod storage;

// Re-export commonly used types
pub use binding::{Direction, Param};
pub use config::{StatementConfig, DEFAULT_FETCH_SIZE};
pub use self::core::StatementState;
pub use executor::{AsyncResult, Executor, ExecutorConfig};
pub use extraction::{ExtractOptions, Extraction, ExtractionMode, CHUNK_SIZE, DEFAULT_MAX_FIELD_SIZE};
pub use paging::Paging;
pub use record_set::{ColumnRef, RecordSet, Rows};
pub use row::Row;
pub use statement::Statement;
pub use storage::Storage;
