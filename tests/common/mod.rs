//! Common test utilities for sqlstmt integration tests.
//!
//! Fixtures are served by the in-memory backend, so the tests need no database.
//! Set `RUST_LOG=sqlstmt=trace` to see the statement's fetch cycles.

#![allow(dead_code)]

use sqlstmt::backend::{MemoryBackend, MemoryTable};
use sqlstmt::{ColumnDescriptor, ColumnType, Statement, Value};
use tracing_subscriber::EnvFilter;

// ============================================================================
// SQL Text of the Fixture Queries
// ============================================================================

pub const NUMBERS_SQL: &str = "SELECT n FROM numbers";
pub const PEOPLE_SQL: &str = "SELECT id, name, age FROM people";
pub const EMPTY_SQL: &str = "SELECT id FROM empty";
pub const UPDATE_SQL: &str = "UPDATE people SET age = age + 1";
pub const MULTI_SQL: &str = "CALL numbers_and_people()";
pub const PROCEDURE_SQL: &str = "CALL next_id(?, ?)";
pub const ECHO_SQL: &str = "SELECT ?";

/// Declared size of the `name` column.
pub const NAME_SIZE: usize = 32;

// ============================================================================
// Tables
// ============================================================================

/// Single `n` column holding `0..rows`.
pub fn numbers_table(rows: usize) -> MemoryTable {
    (0..rows as i64).fold(MemoryTable::new().column("n", ColumnType::Int64), |t, i| {
        t.row(vec![Value::Int64(i)])
    })
}

/// Five people; Bob has no age, Eve has no name.
pub fn people_table() -> MemoryTable {
    let person = |id: i64, name: Option<&str>, age: Option<i32>| {
        vec![
            Value::Int64(id),
            name.map_or(Value::Null, Value::from),
            Value::from(age),
        ]
    };
    MemoryTable::new()
        .column("id", ColumnType::Int64)
        .add_column(
            ColumnDescriptor::new("name", ColumnType::String)
                .with_size(NAME_SIZE)
                .with_type_name("VARCHAR(32)"),
        )
        .column("age", ColumnType::Int32)
        .row(person(1, Some("Alice"), Some(34)))
        .row(person(2, Some("Bob"), None))
        .row(person(3, Some("Carol"), Some(51)))
        .row(person(4, Some("Dave"), Some(27)))
        .row(person(5, None, Some(45)))
}

// ============================================================================
// Backends and Statements
// ============================================================================

/// Backend serving every fixture query, with `numbers` holding `rows` rows.
pub fn fixture_backend(rows: usize) -> MemoryBackend {
    MemoryBackend::new()
        .with_table(NUMBERS_SQL, numbers_table(rows))
        .with_table(PEOPLE_SQL, people_table())
        .with_table(EMPTY_SQL, MemoryTable::new().column("id", ColumnType::Int32))
        .with_update(UPDATE_SQL, 4)
        .with_result_sets(MULTI_SQL, vec![numbers_table(3), people_table()])
        .with_procedure(PROCEDURE_SQL, vec![Value::Null, Value::Int64(100)])
}

/// Statement over `sql` on a fixture backend.
pub fn statement(backend: MemoryBackend, sql: &str) -> Statement {
    let mut stmt = Statement::new(backend);
    stmt.append(sql).expect("fresh statement accepts SQL");
    stmt
}

/// Statement selecting `rows` numbers.
pub fn numbers_statement(rows: usize) -> Statement {
    statement(fixture_backend(rows), NUMBERS_SQL)
}

/// Backend echoing its single parameter as a column of the given type.
pub fn echo_backend(column_type: ColumnType) -> MemoryBackend {
    MemoryBackend::new().with_echo(ECHO_SQL, vec![ColumnDescriptor::new("v", column_type)])
}

// ============================================================================
// Logging
// ============================================================================

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
