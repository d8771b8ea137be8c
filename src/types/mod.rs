//! Value cells, column type tags and column metadata.

mod mapping;
mod schema;
mod value;

pub use mapping::{ColumnType, SqlType};
pub use schema::{ColumnDescriptor, SchemaBuilder};
pub use value::Value;
