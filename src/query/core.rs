//! Statement core: lifecycle state machine and fetch driver.
//!
//! The core owns the SQL text, the binding and extraction registries and the
//! backend. One `execute()` call prepares the text if it changed, binds every
//! parameter, starts a run and then drives fetch cycles until the paging policy
//! or the end of data stops it.

use crate::backend::{Backend, FetchOutcome, RowReader, RowSink};
use crate::error::{BackendError, DataError};
use crate::query::binding::{AbstractBinding, Bindings};
use crate::query::config::StatementConfig;
use crate::query::extraction::{
    AbstractExtraction, ExtractOptions, Extraction, ExtractionMode, TypedExtraction,
};
use crate::query::paging::{Paging, PagingController};
use crate::query::storage::Storage;
use crate::types::{ColumnDescriptor, ColumnType, SqlType, Value};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace, warn};

/// Lifecycle state of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatementState {
    /// Registrations and SQL text may change
    #[default]
    Initialized,
    /// A run is fetching rows
    Executing,
    /// The paging policy stopped the run; more rows are available
    Paused,
    /// All result sets are exhausted, or the run failed while fetching
    Done,
}

impl fmt::Display for StatementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementState::Initialized => write!(f, "initialized"),
            StatementState::Executing => write!(f, "executing"),
            StatementState::Paused => write!(f, "paused"),
            StatementState::Done => write!(f, "done"),
        }
    }
}

/// Sink handing each fetched row to the extractions of one result set.
struct ExtractionSink<'a> {
    extractions: &'a mut [Box<dyn AbstractExtraction>],
    result_set: usize,
    rows: usize,
}

impl RowSink for ExtractionSink<'_> {
    /// Extract every column of the row, or none of them.
    fn accept_row(&mut self, row: &mut dyn RowReader) -> Result<(), DataError> {
        let result_set = self.result_set;
        let mut extracted = 0;
        let outcome = self
            .extractions
            .iter_mut()
            .filter(|e| e.result_set() == result_set)
            .try_for_each(|extraction| {
                extraction.extract(row)?;
                extracted += 1;
                Ok::<_, DataError>(())
            });

        if let Err(e) = outcome {
            for extraction in self
                .extractions
                .iter_mut()
                .filter(|e| e.result_set() == result_set)
                .take(extracted)
            {
                let len = extraction.len();
                extraction.truncate(len.saturating_sub(1));
            }
            trace!(result_set, rolled_back = extracted, "partial row discarded");
            return Err(e);
        }
        self.rows += 1;
        Ok(())
    }
}

pub(crate) struct StatementCore {
    backend: Box<dyn Backend>,
    sql: String,
    prepared_sql: Option<String>,
    prepared_columns: Vec<ColumnDescriptor>,
    state: StatementState,
    config: StatementConfig,
    bindings: Bindings,
    extractions: Vec<Box<dyn AbstractExtraction>>,
    result_columns: Vec<Vec<ColumnDescriptor>>,
    current_result_set: usize,
    row_counts: Vec<usize>,
    affected_rows: Option<u64>,
}

impl StatementCore {
    pub(crate) fn new(backend: Box<dyn Backend>, config: StatementConfig) -> Self {
        Self {
            backend,
            sql: String::new(),
            prepared_sql: None,
            prepared_columns: Vec::new(),
            state: StatementState::Initialized,
            config,
            bindings: Bindings::default(),
            extractions: Vec::new(),
            result_columns: Vec::new(),
            current_result_set: 0,
            row_counts: Vec::new(),
            affected_rows: None,
        }
    }

    pub(crate) fn state(&self) -> StatementState {
        self.state
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn config(&self) -> &StatementConfig {
        &self.config
    }

    fn require_initialized(&self, operation: &'static str) -> Result<(), DataError> {
        if self.state == StatementState::Initialized {
            Ok(())
        } else {
            Err(DataError::state(operation, self.state))
        }
    }

    fn transition(&mut self, next: StatementState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "statement state change");
            self.state = next;
        }
    }

    pub(crate) fn append(&mut self, fragment: &str) -> Result<(), DataError> {
        self.require_initialized("append SQL")?;
        self.sql.push_str(fragment);
        Ok(())
    }

    pub(crate) fn add_binding(&mut self, binding: Box<dyn AbstractBinding>) -> Result<(), DataError> {
        self.require_initialized("bind a parameter")?;
        self.bindings.add(binding)
    }

    pub(crate) fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub(crate) fn clear_bindings(&mut self) -> Result<(), DataError> {
        self.require_initialized("clear bindings")?;
        self.bindings.clear();
        Ok(())
    }

    fn user_extractions(&self) -> impl Iterator<Item = &Box<dyn AbstractExtraction>> {
        self.extractions.iter().filter(|e| !e.is_internal())
    }

    /// Register a typed extraction and return the caller's handle.
    pub(crate) fn add_extraction<T: SqlType>(
        &mut self,
        position: usize,
        options: ExtractOptions,
    ) -> Result<Extraction<T>, DataError> {
        self.require_initialized("register an extraction")?;

        if let Some(storage) = options.storage {
            if storage != self.config.storage {
                if self.user_extractions().next().is_some() {
                    return Err(DataError::registration(
                        position,
                        format!(
                            "storage is fixed to {} by existing extractions, cannot switch to {}",
                            self.config.storage, storage
                        ),
                    ));
                }
                self.config.storage = storage;
            }
        }
        if self
            .user_extractions()
            .any(|e| e.position() == position && e.result_set() == options.result_set)
        {
            return Err(DataError::registration(
                position,
                format!(
                    "column already extracted in result set {}",
                    options.result_set
                ),
            ));
        }

        let result_set = options.result_set;
        self.extractions
            .retain(|e| !(e.is_internal() && e.result_set() == result_set));

        let capacity = options.capacity.unwrap_or(self.config.max_field_size);
        let extraction =
            TypedExtraction::<T>::new(position, result_set, options.mode, capacity, self.config.storage);
        let handle = extraction.handle();
        self.extractions.push(Box::new(extraction));
        trace!(position, result_set, mode = ?options.mode, "registered extraction");
        Ok(handle)
    }

    /// Number of registered extractions, including ones created for record sets.
    pub(crate) fn extraction_count(&self) -> usize {
        self.extractions.len()
    }

    pub(crate) fn can_modify_storage(&self) -> bool {
        self.extractions.is_empty()
            && matches!(
                self.state,
                StatementState::Initialized | StatementState::Done
            )
    }

    pub(crate) fn set_storage(&mut self, storage: Storage) -> Result<(), DataError> {
        if storage == self.config.storage {
            return Ok(());
        }
        if !self.can_modify_storage() {
            return Err(DataError::state("change the storage kind", self.state));
        }
        self.config.storage = storage;
        Ok(())
    }

    pub(crate) fn set_paging(&mut self, paging: Paging) -> Result<(), DataError> {
        paging.validate()?;
        self.config.paging = paging;
        Ok(())
    }

    /// Apply a configuration under the same rules as the individual setters.
    pub(crate) fn configure(&mut self, config: StatementConfig) -> Result<(), DataError> {
        config.validate()?;
        self.set_storage(config.storage)?;
        self.config = config;
        Ok(())
    }

    /// Return to `Initialized`, keeping SQL text and registrations.
    pub(crate) fn reset(&mut self) {
        self.extractions.retain(|e| !e.is_internal());
        for extraction in self.extractions.iter_mut() {
            extraction.clear();
        }
        self.result_columns.clear();
        self.row_counts.clear();
        self.current_result_set = 0;
        self.affected_rows = None;
        self.transition(StatementState::Initialized);
    }

    /// Run or resume the statement; returns the rows produced by this call.
    pub(crate) fn execute(&mut self) -> Result<usize, DataError> {
        match self.state {
            StatementState::Done => {
                trace!("execute on a finished statement");
                return Ok(0);
            }
            StatementState::Executing => {
                return Err(DataError::state("execute", self.state));
            }
            StatementState::Initialized => self.start_run()?,
            StatementState::Paused => {}
        }

        self.transition(StatementState::Executing);
        let mut controller = PagingController::new(self.config.paging, self.config.fetch_size);
        let driven = panic::catch_unwind(AssertUnwindSafe(|| self.drive(&mut controller)));
        let driven = match driven {
            Ok(driven) => driven,
            Err(payload) => {
                warn!(rows = controller.produced(), "backend panicked while fetching");
                self.transition(StatementState::Done);
                panic::resume_unwind(payload);
            }
        };
        match driven {
            Ok(finished) => {
                let next = if finished {
                    StatementState::Done
                } else {
                    StatementState::Paused
                };
                debug!(rows = controller.produced(), paging = %self.config.paging, state = %next, "execute finished");
                self.transition(next);
                Ok(controller.produced())
            }
            Err(e) => {
                warn!(error = %e, rows = controller.produced(), "execute failed while fetching");
                self.transition(StatementState::Done);
                Err(e)
            }
        }
    }

    fn backend_failure(&self, error: BackendError) -> DataError {
        warn!(error = %error, last_error = %self.backend.last_error(), "backend failure");
        error.into()
    }

    fn start_run(&mut self) -> Result<(), DataError> {
        if self.sql.trim().is_empty() {
            return Err(DataError::state("execute an empty statement", self.state));
        }
        self.config.validate()?;
        self.bindings.validate()?;

        if self.prepared_sql.as_deref() != Some(self.sql.as_str()) {
            let columns = match self.backend.prepare(&self.sql) {
                Ok(columns) => columns,
                Err(e) => return Err(self.backend_failure(e)),
            };
            debug!(sql = %self.sql, columns = columns.len(), "prepared statement");
            self.prepared_sql = Some(self.sql.clone());
            self.prepared_columns = columns;
        }

        self.extractions.retain(|e| !e.is_internal());
        for extraction in self.extractions.iter_mut() {
            extraction.clear();
        }
        self.result_columns = vec![self.prepared_columns.clone()];
        self.row_counts = vec![0];
        self.current_result_set = 0;
        self.affected_rows = None;
        self.enter_result_set(0)?;

        self.bindings.bind_all(self.backend.as_mut())?;
        self.affected_rows = match self.backend.execute() {
            Ok(affected) => affected,
            Err(e) => return Err(self.backend_failure(e)),
        };
        self.bindings.collect_outputs(self.backend.as_mut())?;
        debug!(
            bindings = self.bindings.len(),
            extractions = self.extractions.len(),
            affected = ?self.affected_rows,
            "run started"
        );
        Ok(())
    }

    /// Create internal extractions if needed and validate those of the set.
    fn enter_result_set(&mut self, result_set: usize) -> Result<(), DataError> {
        let columns = self
            .result_columns
            .get(result_set)
            .cloned()
            .unwrap_or_default();

        let has_user = self
            .user_extractions()
            .any(|e| e.result_set() == result_set);
        if !has_user {
            for (position, column) in columns.iter().enumerate() {
                if column.column_type == ColumnType::Unknown {
                    continue;
                }
                let extraction = TypedExtraction::<Value>::new(
                    position,
                    result_set,
                    ExtractionMode::Bound,
                    self.config.max_field_size,
                    self.config.storage,
                )
                .internal();
                self.extractions.push(Box::new(extraction));
            }
        }

        for extraction in self
            .extractions
            .iter_mut()
            .filter(|e| e.result_set() == result_set)
        {
            let position = extraction.position();
            let column = columns.get(position).ok_or_else(|| {
                DataError::registration(
                    position,
                    format!(
                        "column position out of range, result set {} has {} columns",
                        result_set,
                        columns.len()
                    ),
                )
            })?;
            extraction.validate(column)?;
        }
        Ok(())
    }

    /// Fetch until the policy pauses the call (`false`) or data ends (`true`).
    fn drive(&mut self, controller: &mut PagingController) -> Result<bool, DataError> {
        loop {
            let has_columns = self
                .result_columns
                .get(self.current_result_set)
                .map_or(false, |c| !c.is_empty());

            if has_columns {
                let Some(request) = controller.next_request() else {
                    return Ok(false);
                };
                let outcome = self.fetch_cycle(request)?;
                controller.record(outcome.rows_returned);
                if !outcome.exhausted {
                    continue;
                }
            }

            let next = match self.backend.next_result_set() {
                Ok(next) => next,
                Err(e) => return Err(self.backend_failure(e)),
            };
            match next {
                Some(columns) => {
                    self.current_result_set += 1;
                    debug!(result_set = self.current_result_set, columns = columns.len(), "next result set");
                    self.result_columns.push(columns);
                    self.row_counts.push(0);
                    self.enter_result_set(self.current_result_set)?;
                }
                None => {
                    if self.result_columns.iter().any(|c| !c.is_empty()) {
                        controller.finish()?;
                    }
                    return Ok(true);
                }
            }
        }
    }

    fn fetch_cycle(&mut self, request: usize) -> Result<FetchOutcome, DataError> {
        let result_set = self.current_result_set;
        let mut sink = ExtractionSink {
            extractions: &mut self.extractions,
            result_set,
            rows: 0,
        };
        let fetched = self.backend.fetch(request, &mut sink);
        let delivered = sink.rows;
        if let Some(count) = self.row_counts.get_mut(result_set) {
            *count += delivered;
        }

        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(DataError::Backend(e)) => return Err(self.backend_failure(e)),
            Err(e) => return Err(e),
        };
        trace!(
            result_set,
            requested = request,
            returned = outcome.rows_returned,
            exhausted = outcome.exhausted,
            "fetch cycle"
        );

        if outcome.rows_returned != delivered {
            return Err(self.backend_failure(BackendError::Fetch(format!(
                "backend reported {} rows but delivered {}",
                outcome.rows_returned, delivered
            ))));
        }
        if outcome.rows_returned == 0 && !outcome.exhausted {
            return Err(self.backend_failure(BackendError::Fetch(
                "backend returned no rows without signalling end of data".to_string(),
            )));
        }
        Ok(outcome)
    }

    /// Columns of a result set seen so far; the first set is known after prepare.
    pub(crate) fn columns(&self, result_set: usize) -> Option<&[ColumnDescriptor]> {
        match self.result_columns.get(result_set) {
            Some(columns) => Some(columns),
            None if result_set == 0 && self.prepared_sql.is_some() => Some(&self.prepared_columns),
            None => None,
        }
    }

    /// Rows extracted from a result set during the current run.
    pub(crate) fn row_count(&self, result_set: usize) -> usize {
        self.row_counts.get(result_set).copied().unwrap_or(0)
    }

    /// Rows extracted across all result sets during the current run.
    pub(crate) fn rows_extracted(&self) -> usize {
        self.row_counts.iter().sum()
    }

    pub(crate) fn affected_rows(&self) -> Option<u64> {
        self.affected_rows
    }

    fn extraction(&self, result_set: usize, column: usize) -> Option<&dyn AbstractExtraction> {
        self.extractions
            .iter()
            .find(|e| e.result_set() == result_set && e.position() == column)
            .map(|e| e.as_ref())
    }

    /// Sorted column positions the caller extracts from a result set, `None`
    /// if the set is read through internal extractions.
    pub(crate) fn user_positions(&self, result_set: usize) -> Option<Vec<usize>> {
        let mut positions: Vec<usize> = self
            .user_extractions()
            .filter(|e| e.result_set() == result_set)
            .map(|e| e.position())
            .collect();
        if positions.is_empty() {
            return None;
        }
        positions.sort_unstable();
        Some(positions)
    }

    /// Extracted cell, `None` if the column has no extraction or the row is missing.
    pub(crate) fn cell(&self, result_set: usize, column: usize, row: usize) -> Option<Value> {
        self.extraction(result_set, column)?.cell(row)
    }

    /// NULL indicator of the last fetched row.
    pub(crate) fn is_null(&self, position: usize) -> bool {
        self.backend.is_null(position)
    }

    pub(crate) fn last_error(&self) -> String {
        self.backend.last_error()
    }

    pub(crate) fn begin(&mut self) -> Result<(), DataError> {
        self.backend.begin().map_err(|e| self.backend_failure(e))
    }

    pub(crate) fn commit(&mut self) -> Result<(), DataError> {
        self.backend.commit().map_err(|e| self.backend_failure(e))
    }

    pub(crate) fn rollback(&mut self) -> Result<(), DataError> {
        self.backend.rollback().map_err(|e| self.backend_failure(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryTable};
    use crate::error::{ErrorKind, StatementError};
    use crate::query::binding::{Direction, Param, TypedBinding};

    fn numbers(n: i64) -> MemoryTable {
        (0..n).fold(MemoryTable::new().column("n", ColumnType::Int64), |t, i| {
            t.row(vec![Value::Int64(i)])
        })
    }

    fn core_over(table: MemoryTable) -> StatementCore {
        let backend = MemoryBackend::new().with_table("SELECT n FROM t", table);
        let mut core = StatementCore::new(Box::new(backend), StatementConfig::default());
        core.append("SELECT n FROM t").unwrap();
        core
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StatementState::Initialized.to_string(), "initialized");
        assert_eq!(StatementState::Done.to_string(), "done");
        assert_eq!(StatementState::default(), StatementState::Initialized);
    }

    #[test]
    fn test_execute_unlimited() {
        let mut core = core_over(numbers(5));
        let ids = core.add_extraction::<i64>(0, ExtractOptions::new()).unwrap();
        assert_eq!(core.execute().unwrap(), 5);
        assert_eq!(core.state(), StatementState::Done);
        assert_eq!(ids.len(), 5);
        assert_eq!(core.execute().unwrap(), 0);
    }

    #[test]
    fn test_append_only_while_initialized() {
        let mut core = core_over(numbers(1));
        core.execute().unwrap();
        let err = core.append(" WHERE 1 = 1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        core.reset();
        assert!(core.append(" ").is_ok());
    }

    #[test]
    fn test_empty_sql_is_state_error() {
        let mut core = StatementCore::new(Box::new(MemoryBackend::new()), StatementConfig::default());
        assert_eq!(core.execute().unwrap_err().kind(), ErrorKind::State);
        assert_eq!(core.state(), StatementState::Initialized);
    }

    #[test]
    fn test_internal_extractions_for_unregistered_columns() {
        let mut core = core_over(numbers(3));
        core.execute().unwrap();
        assert_eq!(core.extraction_count(), 1);
        assert_eq!(core.cell(0, 0, 2), Some(Value::Int64(2)));
        assert_eq!(core.row_count(0), 3);
        core.reset();
        assert_eq!(core.extraction_count(), 0);
        assert_eq!(core.row_count(0), 0);
    }

    #[test]
    fn test_user_positions() {
        let backend = MemoryBackend::new().with_table(
            "SELECT a, b, c FROM t",
            MemoryTable::new()
                .column("a", ColumnType::Int32)
                .column("b", ColumnType::Int32)
                .column("c", ColumnType::Int32),
        );
        let mut core = StatementCore::new(Box::new(backend), StatementConfig::default());
        core.append("SELECT a, b, c FROM t").unwrap();
        assert_eq!(core.user_positions(0), None);
        core.add_extraction::<i32>(2, ExtractOptions::new()).unwrap();
        core.add_extraction::<i32>(0, ExtractOptions::new()).unwrap();
        assert_eq!(core.user_positions(0), Some(vec![0, 2]));
        assert_eq!(core.user_positions(1), None);
    }

    #[test]
    fn test_failing_column_discards_partial_row() {
        let backend = MemoryBackend::new().with_table(
            "SELECT id, name FROM t",
            MemoryTable::new()
                .column("id", ColumnType::Int64)
                .column("name", ColumnType::String)
                .row(vec![Value::Int64(1), Value::from("Ann")])
                .row(vec![Value::Int64(2), Value::from("Bartholomew")]),
        );
        let mut core = StatementCore::new(Box::new(backend), StatementConfig::default());
        core.append("SELECT id, name FROM t").unwrap();
        let id = core.add_extraction::<i64>(0, ExtractOptions::new()).unwrap();
        let name = core
            .add_extraction::<String>(1, ExtractOptions::new().with_capacity(4))
            .unwrap();

        assert_eq!(core.execute().unwrap_err().kind(), ErrorKind::DataTruncation);
        assert_eq!(id.len(), 1);
        assert_eq!(name.len(), 1);
        assert_eq!(core.rows_extracted(), 1);
    }

    #[test]
    fn test_extraction_position_out_of_range() {
        let mut core = core_over(numbers(3));
        core.add_extraction::<i64>(4, ExtractOptions::new()).unwrap();
        let err = core.execute().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registration);
        assert_eq!(core.state(), StatementState::Initialized);
    }

    #[test]
    fn test_storage_rules() {
        let mut core = core_over(numbers(2));
        assert!(core.can_modify_storage());
        core.set_storage(Storage::List).unwrap();
        let handle = core.add_extraction::<i64>(0, ExtractOptions::new()).unwrap();
        assert_eq!(handle.storage(), Storage::List);
        assert_eq!(
            core.set_storage(Storage::Vector).unwrap_err().kind(),
            ErrorKind::State
        );
        let err = core
            .add_extraction::<i64>(1, ExtractOptions::new().with_storage(Storage::Vector))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registration);
    }

    #[test]
    fn test_duplicate_extraction_rejected() {
        let mut core = core_over(numbers(2));
        core.add_extraction::<i64>(0, ExtractOptions::new()).unwrap();
        assert_eq!(
            core.add_extraction::<Value>(0, ExtractOptions::new())
                .unwrap_err()
                .kind(),
            ErrorKind::Registration
        );
    }

    #[test]
    fn test_paused_resume_and_limit_error() {
        let mut core = core_over(numbers(5));
        core.set_paging(Paging::hard_limit(3)).unwrap();
        assert_eq!(core.execute().unwrap(), 3);
        assert_eq!(core.state(), StatementState::Paused);

        let err = core.execute().unwrap_err();
        assert_eq!(
            err,
            DataError::Statement(StatementError::LimitNotReached { limit: 3, rows: 2 })
        );
        assert_eq!(core.state(), StatementState::Done);
        assert_eq!(core.rows_extracted(), 5);
    }

    #[test]
    fn test_statement_without_columns() {
        let backend = MemoryBackend::new().with_update("DELETE FROM t", 4);
        let mut core = StatementCore::new(Box::new(backend), StatementConfig::default());
        core.append("DELETE FROM t").unwrap();
        core.set_paging(Paging::hard_limit(10)).unwrap();
        assert_eq!(core.execute().unwrap(), 0);
        assert_eq!(core.state(), StatementState::Done);
        assert_eq!(core.affected_rows(), Some(4));
    }

    #[test]
    fn test_output_binding() {
        let backend = MemoryBackend::new().with_procedure("CALL f(?)", vec![Value::Int32(8)]);
        let mut core = StatementCore::new(Box::new(backend), StatementConfig::default());
        core.append("CALL f(?)").unwrap();
        let out = Param::<i32>::null();
        core.add_binding(Box::new(TypedBinding::new(1, out.clone(), Direction::Out)))
            .unwrap();
        core.execute().unwrap();
        assert_eq!(out.get(), Some(8));
    }

    #[test]
    fn test_prepare_once_per_text() {
        let backend = MemoryBackend::new().with_table("SELECT n FROM t", numbers(2));
        let stats = backend.stats();
        let mut core = StatementCore::new(Box::new(backend), StatementConfig::default());
        core.append("SELECT n FROM t").unwrap();
        core.execute().unwrap();
        core.reset();
        core.execute().unwrap();
        assert_eq!(stats.prepares(), 1);
        assert_eq!(stats.executes(), 2);
    }
}
