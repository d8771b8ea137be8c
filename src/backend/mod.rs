//! Backend implementation contract.
//!
//! The statement core never talks to a database driver directly. It drives an
//! implementation of [`Backend`], which prepares SQL text, binds parameters,
//! and pushes fetched rows into the registered extractions through a
//! [`RowSink`].
//!
//! # Architecture
//!
//! - `protocol` - Backend trait and the row reading interface
//! - `memory` - In-memory reference backend
//!
//! # Example
//!
//! ```
//! use sqlstmt::backend::{MemoryBackend, MemoryTable};
//! use sqlstmt::types::{ColumnType, Value};
//! use sqlstmt::Statement;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let table = MemoryTable::new()
//!     .column("id", ColumnType::Int64)
//!     .row(vec![Value::Int64(1)])
//!     .row(vec![Value::Int64(2)]);
//! let backend = MemoryBackend::new().with_table("SELECT id FROM t", table);
//!
//! let mut stmt = Statement::new(backend);
//! stmt.append("SELECT id FROM t")?;
//! let ids = stmt.extract::<i64>(0)?;
//! assert_eq!(stmt.execute()?, 2);
//! assert_eq!(ids.values(), vec![Some(1), Some(2)]);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod memory;
pub mod protocol;

// Re-export commonly used types
pub use memory::{MemoryBackend, MemoryStats, MemoryTable};
pub use protocol::{Backend, ChunkRead, FetchOutcome, RowReader, RowSink};
