//! In-memory backend.
//!
//! `MemoryBackend` answers SQL text from a table of canned queries registered up
//! front. It implements the full backend contract (prepare, positional binding,
//! paged fetching, multiple result sets, output parameters and transaction
//! hooks) and is used to prototype host applications and to test statements
//! without a database.

use crate::backend::protocol::{Backend, ChunkRead, FetchOutcome, RowReader, RowSink};
use crate::error::{BackendError, DataError, ExtractionError};
use crate::query::binding::Direction;
use crate::types::{ColumnDescriptor, ColumnType, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A result set held in memory: column descriptors plus rows of value cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    /// Create an empty table with no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a nullable column of the given type.
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDescriptor::new(name, column_type));
        self
    }

    /// Add a fully described column, e.g. one with a declared size.
    pub fn add_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Append a row. Missing trailing cells read as NULL.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Column descriptors.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Counters shared between a `MemoryBackend` and the test code observing it.
///
/// Cloning yields another handle to the same counters, so the handle stays
/// usable after the backend has been moved into a statement.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    prepares: AtomicUsize,
    executes: AtomicUsize,
    fetches: AtomicUsize,
    rows_served: AtomicUsize,
}

impl MemoryStats {
    /// Number of `prepare` calls.
    pub fn prepares(&self) -> usize {
        self.inner.prepares.load(Ordering::SeqCst)
    }

    /// Number of `execute` calls.
    pub fn executes(&self) -> usize {
        self.inner.executes.load(Ordering::SeqCst)
    }

    /// Number of fetch cycles.
    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Total rows delivered to sinks.
    pub fn rows_served(&self) -> usize {
        self.inner.rows_served.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
enum MemoryQuery {
    ResultSets(Arc<Vec<MemoryTable>>),
    Echo(Vec<ColumnDescriptor>),
    Update(u64),
    Procedure(Vec<Value>),
}

impl MemoryQuery {
    fn first_columns(&self) -> Vec<ColumnDescriptor> {
        match self {
            MemoryQuery::ResultSets(sets) => sets
                .first()
                .map(|t| t.columns.clone())
                .unwrap_or_default(),
            MemoryQuery::Echo(columns) => columns.clone(),
            MemoryQuery::Update(_) | MemoryQuery::Procedure(_) => Vec::new(),
        }
    }
}

/// Backend serving canned results for registered SQL text.
///
/// Parameter markers are `?`; a statement has as many parameters as its text has
/// markers.
///
/// # Example
///
/// ```
/// use sqlstmt::backend::{Backend, MemoryBackend, MemoryTable};
/// use sqlstmt::types::{ColumnType, Value};
///
/// let mut backend = MemoryBackend::new().with_table(
///     "SELECT n FROM numbers",
///     MemoryTable::new()
///         .column("n", ColumnType::Int32)
///         .row(vec![Value::Int32(1)]),
/// );
/// let columns = backend.prepare("SELECT n FROM numbers").unwrap();
/// assert_eq!(columns[0].name, "n");
/// assert!(backend.prepare("SELECT * FROM missing").is_err());
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    queries: HashMap<String, MemoryQuery>,
    prepared: Option<MemoryQuery>,
    param_count: usize,
    params: Vec<Option<Value>>,
    sets: Arc<Vec<MemoryTable>>,
    current_set: usize,
    cursor: usize,
    last_row: Option<usize>,
    outputs: Vec<Value>,
    in_transaction: bool,
    fetch_delay: Option<Duration>,
    fail_fetch_at: Option<usize>,
    last_error: String,
    stats: MemoryStats,
}

impl MemoryBackend {
    /// Create a backend with no registered queries.
    pub fn new() -> Self {
        Self {
            queries: HashMap::new(),
            prepared: None,
            param_count: 0,
            params: Vec::new(),
            sets: Arc::new(Vec::new()),
            current_set: 0,
            cursor: 0,
            last_row: None,
            outputs: Vec::new(),
            in_transaction: false,
            fetch_delay: None,
            fail_fetch_at: None,
            last_error: String::new(),
            stats: MemoryStats::default(),
        }
    }

    /// Register a query returning one result set.
    pub fn with_table(self, sql: impl Into<String>, table: MemoryTable) -> Self {
        self.with_result_sets(sql, vec![table])
    }

    /// Register a query returning several result sets in order.
    pub fn with_result_sets(mut self, sql: impl Into<String>, tables: Vec<MemoryTable>) -> Self {
        self.queries
            .insert(sql.into(), MemoryQuery::ResultSets(Arc::new(tables)));
        self
    }

    /// Register a query returning a single row made of its bound parameters.
    ///
    /// The row has one column per descriptor; the cell of column `i` is the
    /// value bound at position `i + 1`.
    pub fn with_echo(mut self, sql: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        self.queries.insert(sql.into(), MemoryQuery::Echo(columns));
        self
    }

    /// Register a statement without result columns reporting `affected` rows.
    pub fn with_update(mut self, sql: impl Into<String>, affected: u64) -> Self {
        self.queries.insert(sql.into(), MemoryQuery::Update(affected));
        self
    }

    /// Register a procedure call producing output parameters.
    ///
    /// `outputs[i]` is the value of parameter `i + 1` after the call. Positions
    /// without an entry (or with a NULL entry) return their bound input.
    pub fn with_procedure(mut self, sql: impl Into<String>, outputs: Vec<Value>) -> Self {
        self.queries.insert(sql.into(), MemoryQuery::Procedure(outputs));
        self
    }

    /// Sleep for `delay` at the start of every fetch cycle.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Fail the fetch cycle that would deliver the row at index `row`.
    pub fn fail_fetch_at(mut self, row: usize) -> Self {
        self.fail_fetch_at = Some(row);
        self
    }

    /// Handle to the call counters.
    pub fn stats(&self) -> MemoryStats {
        self.stats.clone()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn fail(&mut self, message: impl Into<String>) -> String {
        self.last_error = message.into();
        warn!(error = %self.last_error, "memory backend failure");
        self.last_error.clone()
    }

    fn current_table(&self) -> Option<&MemoryTable> {
        self.sets.get(self.current_set)
    }

    fn param_value(&self, position: usize) -> Value {
        self.params
            .get(position.wrapping_sub(1))
            .cloned()
            .flatten()
            .unwrap_or(Value::Null)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn count_markers(sql: &str) -> usize {
    let mut in_literal = false;
    let mut count = 0;
    for c in sql.chars() {
        match c {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}

impl Backend for MemoryBackend {
    fn prepare(&mut self, sql: &str) -> Result<Vec<ColumnDescriptor>, BackendError> {
        MemoryStats::bump(&self.stats.inner.prepares, 1);
        let query = match self.queries.get(sql.trim()) {
            Some(query) => query.clone(),
            None => {
                let message = self.fail(format!("no such query: {}", sql.trim()));
                return Err(BackendError::Prepare(message));
            }
        };

        self.param_count = count_markers(sql);
        self.params = vec![None; self.param_count];
        self.sets = Arc::new(Vec::new());
        self.current_set = 0;
        self.cursor = 0;
        self.last_row = None;
        let columns = query.first_columns();
        self.prepared = Some(query);
        debug!(sql = sql.trim(), params = self.param_count, columns = columns.len(), "prepared");
        Ok(columns)
    }

    fn bind_parameter(
        &mut self,
        position: usize,
        value: &Value,
        direction: Direction,
    ) -> Result<(), BackendError> {
        if position == 0 || position > self.param_count {
            let message = self.fail(format!(
                "parameter position {} outside 1..={}",
                position, self.param_count
            ));
            return Err(BackendError::Bind { position, message });
        }
        trace!(position, ?direction, value = %value, "bind parameter");
        self.params[position - 1] = Some(value.clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<Option<u64>, BackendError> {
        MemoryStats::bump(&self.stats.inner.executes, 1);
        let query = match &self.prepared {
            Some(query) => query.clone(),
            None => {
                let message = self.fail("execute called before prepare");
                return Err(BackendError::Execution(message));
            }
        };
        if let Some(missing) = self.params.iter().position(Option::is_none) {
            let message = self.fail(format!("parameter {} is not bound", missing + 1));
            return Err(BackendError::Execution(message));
        }

        self.current_set = 0;
        self.cursor = 0;
        self.last_row = None;
        self.outputs.clear();

        let affected = match query {
            MemoryQuery::ResultSets(sets) => {
                self.sets = sets;
                None
            }
            MemoryQuery::Echo(columns) => {
                let row: Vec<Value> = (1..=columns.len()).map(|p| self.param_value(p)).collect();
                self.sets = Arc::new(vec![MemoryTable {
                    columns,
                    rows: vec![row],
                }]);
                None
            }
            MemoryQuery::Update(affected) => {
                self.sets = Arc::new(Vec::new());
                Some(affected)
            }
            MemoryQuery::Procedure(outputs) => {
                self.sets = Arc::new(Vec::new());
                self.outputs = (1..=self.param_count)
                    .map(|p| match outputs.get(p - 1) {
                        Some(value) if !value.is_null() => value.clone(),
                        _ => self.param_value(p),
                    })
                    .collect();
                Some(0)
            }
        };
        Ok(affected)
    }

    fn fetch(
        &mut self,
        max_rows: usize,
        sink: &mut dyn RowSink,
    ) -> Result<FetchOutcome, DataError> {
        MemoryStats::bump(&self.stats.inner.fetches, 1);
        if let Some(delay) = self.fetch_delay {
            std::thread::sleep(delay);
        }

        let total = self.current_table().map(MemoryTable::len).unwrap_or(0);
        let end = total.min(self.cursor.saturating_add(max_rows));
        if let Some(fail_at) = self.fail_fetch_at {
            if (self.cursor..end).contains(&fail_at) {
                let message = self.fail(format!("simulated fetch failure at row {}", fail_at));
                return Err(BackendError::Fetch(message).into());
            }
        }

        let sets = Arc::clone(&self.sets);
        let mut returned = 0;
        if let Some(table) = sets.get(self.current_set) {
            for index in self.cursor..end {
                let mut row = MemoryRow {
                    columns: &table.columns,
                    values: &table.rows[index],
                };
                self.last_row = Some(index);
                sink.accept_row(&mut row)?;
                self.cursor = index + 1;
                returned += 1;
            }
        }
        MemoryStats::bump(&self.stats.inner.rows_served, returned);

        let exhausted = self.cursor >= total;
        trace!(requested = max_rows, returned, exhausted, "memory fetch");
        Ok(FetchOutcome::new(returned, exhausted))
    }

    fn next_result_set(&mut self) -> Result<Option<Vec<ColumnDescriptor>>, BackendError> {
        if self.current_set + 1 >= self.sets.len() {
            return Ok(None);
        }
        self.current_set += 1;
        self.cursor = 0;
        self.last_row = None;
        debug!(result_set = self.current_set, "advanced to next result set");
        Ok(self.current_table().map(|t| t.columns.clone()))
    }

    fn column_type(&self, position: usize) -> Option<ColumnType> {
        self.current_table()
            .and_then(|t| t.columns.get(position))
            .map(|c| c.column_type)
    }

    fn column_name(&self, position: usize) -> Option<String> {
        self.current_table()
            .and_then(|t| t.columns.get(position))
            .map(|c| c.name.clone())
    }

    fn is_null(&self, position: usize) -> bool {
        match (self.current_table(), self.last_row) {
            (Some(table), Some(row)) => table.rows[row]
                .get(position)
                .map_or(true, Value::is_null),
            _ => false,
        }
    }

    fn output_parameter(&mut self, position: usize) -> Result<Value, BackendError> {
        match self.outputs.get(position.wrapping_sub(1)) {
            Some(value) => Ok(value.clone()),
            None => {
                let message = self.fail(format!("no output parameter at position {}", position));
                Err(BackendError::Bind { position, message })
            }
        }
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }

    fn begin(&mut self) -> Result<(), BackendError> {
        if self.in_transaction {
            let message = self.fail("transaction already active");
            return Err(BackendError::Execution(message));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        if !self.in_transaction {
            let message = self.fail("no active transaction");
            return Err(BackendError::Execution(message));
        }
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        self.commit()
    }
}

/// The row under the fetch cursor.
struct MemoryRow<'a> {
    columns: &'a [ColumnDescriptor],
    values: &'a [Value],
}

impl MemoryRow<'_> {
    fn cell(&self, position: usize) -> Result<&Value, DataError> {
        if position >= self.columns.len() {
            return Err(ExtractionError::ColumnOutOfRange {
                column: position,
                column_count: self.columns.len(),
            }
            .into());
        }
        Ok(self.values.get(position).unwrap_or(&Value::Null))
    }
}

impl RowReader for MemoryRow<'_> {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_type(&self, position: usize) -> ColumnType {
        self.columns
            .get(position)
            .map_or(ColumnType::Unknown, |c| c.column_type)
    }

    fn is_null(&self, position: usize) -> bool {
        self.values.get(position).map_or(true, Value::is_null)
    }

    fn value(&mut self, position: usize) -> Result<Value, DataError> {
        self.cell(position).cloned()
    }

    fn read_chunk(
        &mut self,
        position: usize,
        offset: usize,
        buffer: &mut [u8],
    ) -> Result<ChunkRead, DataError> {
        let bytes: &[u8] = match self.cell(position)? {
            Value::Null => return Ok(ChunkRead::Null),
            Value::String(s) => s.as_bytes(),
            Value::Blob(b) => b,
            other => {
                return Err(BackendError::Fetch(format!(
                    "column {} holds {} which cannot be read in chunks",
                    position,
                    other.type_tag().map_or("NULL", |t| t.name())
                ))
                .into())
            }
        };
        let remaining = bytes.get(offset..).unwrap_or(&[]);
        let n = remaining.len().min(buffer.len());
        buffer[..n].copy_from_slice(&remaining[..n]);
        Ok(ChunkRead::Data(n))
    }
}
