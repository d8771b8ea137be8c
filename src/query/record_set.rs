//! Record set: a cached, randomly addressable view over extracted rows.
//!
//! A record set reads cells from the statement's extractions. Rows are
//! materialized on first access and kept for the lifetime of the record set;
//! all rows share one column name list.

use crate::error::{DataError, ExtractionError};
use crate::query::row::Row;
use crate::query::statement::Statement;
use crate::query::StatementState;
use crate::types::{ColumnDescriptor, ColumnType, SqlType, Value};
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Column addressed by index or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for ColumnRef<'_> {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl<'a> From<&'a str> for ColumnRef<'a> {
    fn from(name: &'a str) -> Self {
        ColumnRef::Name(name)
    }
}

impl fmt::Display for ColumnRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "{}", i),
            ColumnRef::Name(n) => write!(f, "'{}'", n),
        }
    }
}

/// Read-only view over the rows a statement has extracted.
///
/// # Example
///
/// ```
/// use sqlstmt::backend::{MemoryBackend, MemoryTable};
/// use sqlstmt::query::{RecordSet, Statement};
/// use sqlstmt::types::{ColumnType, Value};
///
/// # fn main() -> Result<(), sqlstmt::DataError> {
/// let table = MemoryTable::new()
///     .column("name", ColumnType::String)
///     .column("age", ColumnType::Int32)
///     .row(vec![Value::from("Ada"), Value::Int32(36)])
///     .row(vec![Value::from("Bob"), Value::Null]);
/// let mut stmt = Statement::new(MemoryBackend::new().with_table("SELECT * FROM person", table));
/// stmt.append("SELECT * FROM person")?;
///
/// let mut rs = RecordSet::new(stmt)?;
/// assert_eq!(rs.row_count(), 2);
/// assert_eq!(rs.value("name", 0)?, Value::from("Ada"));
///
/// rs.move_last();
/// assert_eq!(rs.nvl("age", Value::Int32(-1))?, Value::Int32(-1));
/// # Ok(())
/// # }
/// ```
pub struct RecordSet {
    statement: Statement,
    result_set: usize,
    columns: Vec<ColumnDescriptor>,
    /// Statement column position behind each record set column
    positions: Vec<usize>,
    names: Arc<[String]>,
    rows: Vec<OnceCell<Row>>,
    current: usize,
}

impl RecordSet {
    /// View the first result set of `statement`, executing it first if it has
    /// not run yet.
    ///
    /// An asynchronous statement is waited for.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the execution.
    pub fn new(statement: Statement) -> Result<Self, DataError> {
        Self::for_result_set(statement, 0)
    }

    /// View result set `result_set` of `statement`.
    pub fn for_result_set(mut statement: Statement, result_set: usize) -> Result<Self, DataError> {
        if statement.state() == StatementState::Initialized {
            statement.execute()?;
        }
        statement.wait()?;

        let mut record_set = Self {
            statement,
            result_set,
            columns: Vec::new(),
            positions: Vec::new(),
            names: Arc::from(Vec::new()),
            rows: Vec::new(),
            current: 0,
        };
        record_set.refresh();
        Ok(record_set)
    }

    /// Pick up columns and rows extracted since the last refresh.
    ///
    /// With user extractions the record set shows exactly the extracted
    /// columns, in position order; otherwise every column of the result set.
    fn refresh(&mut self) {
        let (all, positions, row_count) = self.statement.with_core(|core| {
            (
                core.columns(self.result_set)
                    .map(<[ColumnDescriptor]>::to_vec)
                    .unwrap_or_default(),
                core.user_positions(self.result_set),
                core.row_count(self.result_set),
            )
        });
        let positions: Vec<usize> = match positions {
            Some(positions) => positions.into_iter().filter(|&p| p < all.len()).collect(),
            None => (0..all.len()).collect(),
        };
        let columns: Vec<ColumnDescriptor> = positions.iter().map(|&p| all[p].clone()).collect();
        if columns != self.columns || positions != self.positions {
            self.names = columns.iter().map(|c| c.name.clone()).collect();
            self.columns = columns;
            self.positions = positions;
        }
        if row_count < self.rows.len() {
            self.rows.clear();
            self.current = 0;
        }
        self.rows.resize_with(row_count, OnceCell::new);
        trace!(result_set = self.result_set, rows = row_count, "record set refreshed");
    }

    /// Resume a paused statement and extend the view with the new rows.
    ///
    /// Returns the number of rows added; 0 once the statement is done.
    pub fn fetch_more(&mut self) -> Result<usize, DataError> {
        let before = self.rows.len();
        if self.statement.is_paused() {
            self.statement.execute()?;
            self.statement.wait()?;
        }
        self.refresh();
        Ok(self.rows.len().saturating_sub(before))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn column(&self, index: usize) -> Result<&ColumnDescriptor, DataError> {
        self.columns.get(index).ok_or_else(|| {
            ExtractionError::ColumnOutOfRange {
                column: index,
                column_count: self.columns.len(),
            }
            .into()
        })
    }

    pub fn column_name(&self, index: usize) -> Result<&str, DataError> {
        Ok(&self.column(index)?.name)
    }

    pub fn column_type(&self, index: usize) -> Result<ColumnType, DataError> {
        Ok(self.column(index)?.column_type)
    }

    /// Index of the first column named `name`.
    pub fn column_index(&self, name: &str) -> Result<usize, DataError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ExtractionError::UnknownColumn(name.to_string()).into())
    }

    fn resolve<'a>(&self, column: impl Into<ColumnRef<'a>>) -> Result<usize, DataError> {
        match column.into() {
            ColumnRef::Index(index) => self.column(index).map(|_| index),
            ColumnRef::Name(name) => self.column_index(name),
        }
    }

    fn check_row(&self, row: usize) -> Result<(), DataError> {
        if row < self.rows.len() {
            Ok(())
        } else {
            Err(ExtractionError::RowOutOfRange {
                row,
                row_count: self.rows.len(),
            }
            .into())
        }
    }

    fn cell(&self, column: usize, row: usize) -> Result<Value, DataError> {
        let descriptor = self.column(column)?;
        self.check_row(row)?;
        if descriptor.column_type == ColumnType::Unknown {
            return Err(ExtractionError::UnknownType {
                column,
                type_name: descriptor.type_name.clone(),
            }
            .into());
        }
        let position = self.positions[column];
        self.statement
            .with_core(|core| core.cell(self.result_set, position, row))
            .ok_or_else(|| DataError::registration(position, "column has no extraction"))
    }

    /// Value of one cell.
    ///
    /// # Errors
    ///
    /// Returns a range error for an unknown column or row and `UnknownType` for
    /// columns of a type without a value cell representation.
    pub fn value<'a>(&self, column: impl Into<ColumnRef<'a>>, row: usize) -> Result<Value, DataError> {
        let column = self.resolve(column)?;
        self.cell(column, row)
    }

    /// Value of one cell as a typed value, `None` for NULL.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the cell holds a different type.
    pub fn value_as<'a, T: SqlType>(
        &self,
        column: impl Into<ColumnRef<'a>>,
        row: usize,
    ) -> Result<Option<T>, DataError> {
        let column = self.resolve(column)?;
        let value = self.cell(column, row)?;
        if value.is_null() {
            return Ok(None);
        }
        let actual = value.type_tag().unwrap_or(ColumnType::Unknown);
        match T::from_value(value) {
            Some(v) => Ok(Some(v)),
            None => Err(ExtractionError::TypeMismatch {
                position: column,
                expected: T::column_type().unwrap_or(ColumnType::Unknown),
                actual,
            }
            .into()),
        }
    }

    /// Whether one cell is NULL.
    pub fn is_null<'a>(&self, column: impl Into<ColumnRef<'a>>, row: usize) -> Result<bool, DataError> {
        Ok(self.value(column, row)?.is_null())
    }

    /// Row `index`, materialized and cached on first access.
    ///
    /// # Errors
    ///
    /// Returns a range error if `index >= row_count()`.
    pub fn row(&self, index: usize) -> Result<&Row, DataError> {
        self.check_row(index)?;
        let slot = &self.rows[index];
        if let Some(row) = slot.get() {
            return Ok(row);
        }
        let values = (0..self.columns.len())
            .map(|column| self.cell(column, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slot.get_or_init(|| Row::new(Arc::clone(&self.names), values)))
    }

    /// Cursor position.
    pub fn current_row(&self) -> usize {
        self.current
    }

    pub fn move_first(&mut self) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        self.current = 0;
        true
    }

    pub fn move_next(&mut self) -> bool {
        if self.current + 1 >= self.rows.len() {
            return false;
        }
        self.current += 1;
        true
    }

    pub fn move_previous(&mut self) -> bool {
        if self.current == 0 || self.rows.is_empty() {
            return false;
        }
        self.current -= 1;
        true
    }

    pub fn move_last(&mut self) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        self.current = self.rows.len() - 1;
        true
    }

    /// Value at the cursor, or `default` if it is NULL or the view is empty.
    ///
    /// # Errors
    ///
    /// Returns a range error for an unknown column.
    pub fn nvl<'a>(
        &self,
        column: impl Into<ColumnRef<'a>>,
        default: impl Into<Value>,
    ) -> Result<Value, DataError> {
        let column = self.resolve(column)?;
        if self.rows.is_empty() {
            return Ok(default.into());
        }
        let value = self.cell(column, self.current)?;
        Ok(if value.is_null() { default.into() } else { value })
    }

    /// Rows in ascending order, materializing each on demand.
    pub fn iter(&self) -> Rows<'_> {
        Rows {
            record_set: self,
            next: 0,
        }
    }

    /// Convert all rows to a JSON array of objects.
    pub fn to_json(&self) -> Result<serde_json::Value, DataError> {
        self.iter()
            .map(|row| row.map(Row::to_json))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array)
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn into_statement(self) -> Statement {
        self.statement
    }
}

impl fmt::Debug for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSet")
            .field("result_set", &self.result_set)
            .field("columns", &self.names)
            .field("row_count", &self.rows.len())
            .field("current", &self.current)
            .finish()
    }
}

/// Iterator over the rows of a record set.
pub struct Rows<'a> {
    record_set: &'a RecordSet,
    next: usize,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Result<&'a Row, DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.record_set.row_count() {
            return None;
        }
        let row = self.record_set.row(self.next);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.record_set.row_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = Result<&'a Row, DataError>;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
