//! Basic usage example for sqlstmt.
//!
//! Runs against the in-memory backend, so no database is needed:
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use sqlstmt::backend::{MemoryBackend, MemoryTable};
use sqlstmt::{ColumnType, Direction, Param, Paging, RecordSet, Statement, Value};
use std::error::Error;

const PEOPLE_SQL: &str = "SELECT id, name FROM people";
const UPDATE_SQL: &str = "UPDATE people SET name = upper(name)";
const NEXT_ID_SQL: &str = "CALL next_id(?, ?)";

/// In-memory backend with a small people table.
fn example_backend() -> MemoryBackend {
    let people = ["Ada", "Grace", "Edsger", "Barbara", "Niklaus"]
        .iter()
        .enumerate()
        .fold(
            MemoryTable::new()
                .column("id", ColumnType::Int64)
                .column("name", ColumnType::String),
            |table, (i, name)| table.row(vec![Value::Int64(i as i64 + 1), Value::from(*name)]),
        )
        .row(vec![Value::Int64(6), Value::Null]);

    MemoryBackend::new()
        .with_table(PEOPLE_SQL, people)
        .with_update(UPDATE_SQL, 6)
        .with_procedure(NEXT_ID_SQL, vec![Value::Null, Value::Int64(7)])
}

/// Example: extract into typed columns, two rows per execution.
fn example_paged_extraction() -> Result<usize, Box<dyn Error>> {
    let mut stmt = Statement::new(example_backend());
    stmt.append(PEOPLE_SQL)?;
    stmt.set_paging(Paging::step(2)?)?;

    let ids = stmt.extract::<i64>(0)?;
    let names = stmt.extract::<String>(1)?;

    let mut pages = 0;
    while !stmt.is_done() {
        let rows = stmt.execute()?;
        pages += 1;
        println!("  page {}: {} row(s)", pages, rows);
    }

    for (id, name) in ids.values().into_iter().zip(names.values()) {
        println!("  {:?} {}", id, name.unwrap_or_else(|| "<null>".to_string()));
    }
    Ok(ids.len())
}

/// Example: read a record set by name, with a default for NULL.
fn example_record_set() -> Result<usize, Box<dyn Error>> {
    let mut stmt = Statement::new(example_backend());
    stmt.append(PEOPLE_SQL)?;
    stmt.set_paging(Paging::limit(4))?;

    let mut rs = RecordSet::new(stmt)?;
    println!("  first page: {} row(s)", rs.row_count());
    rs.fetch_more()?;

    for row in &rs {
        println!("  {}", row?);
    }
    rs.move_last();
    println!("  last name: {}", rs.nvl("name", "unknown")?);
    Ok(rs.row_count())
}

/// Example: input and output parameters.
fn example_parameters() -> Result<Option<i64>, Box<dyn Error>> {
    let seed = Param::new(1i64);
    let next = Param::<i64>::null();

    let mut stmt = Statement::new(example_backend());
    stmt.append(NEXT_ID_SQL)?;
    stmt.bind_param(1, &seed, Direction::In)?;
    stmt.bind_param(2, &next, Direction::Out)?;
    stmt.execute()?;

    Ok(next.get())
}

/// Example: run an update on the worker pool and wait for it.
fn example_async() -> Result<Option<u64>, Box<dyn Error>> {
    let mut stmt = Statement::new(example_backend());
    stmt.append(UPDATE_SQL)?;

    let result = stmt.execute_async()?;
    result.wait()?;

    Ok(stmt.affected_rows())
}

fn main() -> Result<(), Box<dyn Error>> {
    let rows = example_paged_extraction()?;
    println!("Paged extraction: {} row(s)", rows);

    let rows = example_record_set()?;
    println!("Record set: {} row(s)", rows);

    let next = example_parameters()?;
    println!("Next id: {:?}", next);

    let affected = example_async()?;
    println!("Async update: {:?} row(s) affected", affected);

    println!("Done");
    Ok(())
}
