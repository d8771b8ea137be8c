//! # sqlstmt
//!
//! Backend-agnostic SQL statement execution and result extraction.
//!
//! Client code builds a [`Statement`] from SQL text, typed parameter bindings
//! and typed result extractions, executes it synchronously or on a worker pool
//! against a pluggable [`Backend`](backend::Backend), and reads results through
//! a lazily materialized, randomly addressable [`RecordSet`]. Paging policies
//! (limit, range, step) bound how many rows each execution fetches; a paused
//! statement resumes where it stopped.
//!
//! ## Example
//!
//! ```
//! # use sqlstmt::*;
//! # use sqlstmt::backend::{MemoryBackend, MemoryTable};
//! # fn main() -> Result<(), DataError> {
//! let table = MemoryTable::new()
//!     .column("id", ColumnType::Int64)
//!     .column("name", ColumnType::String)
//!     .row(vec![Value::Int64(1), Value::from("Ada")])
//!     .row(vec![Value::Int64(2), Value::from("Grace")])
//!     .row(vec![Value::Int64(3), Value::Null]);
//!
//! let mut stmt = Statement::new(MemoryBackend::new().with_table("SELECT id, name FROM people", table));
//! stmt.append("SELECT id, name FROM people")?;
//! stmt.set_paging(Paging::limit(2))?;
//!
//! // The limit pauses the statement after two rows
//! let mut rs = RecordSet::new(stmt)?;
//! assert_eq!(rs.row_count(), 2);
//! assert_eq!(rs.fetch_more()?, 1);
//!
//! for row in &rs {
//!     let row = row?;
//!     println!("{}", row);
//! }
//! rs.move_last();
//! assert_eq!(rs.nvl("name", "unknown")?, Value::from("unknown"));
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod backend;
pub mod error;
pub mod query;
pub mod types;

// Re-export public API
pub use error::{BackendError, DataError, ErrorKind, ExtractionError, StatementError};
pub use query::{
    Direction, ExtractOptions, Extraction, ExtractionMode, Param, Paging, RecordSet, Row,
    Statement, StatementConfig, StatementState, Storage,
};
pub use types::{ColumnDescriptor, ColumnType, SqlType, Value};
