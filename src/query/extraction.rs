//! Result extractions.
//!
//! An extraction associates a 0-based result column with a typed column store
//! shared with the caller. Three read paths exist:
//!
//! - bound mode: the slot type must match the backend-reported column type
//!   exactly and variable-length data must fit the slot's buffer capacity;
//! - manual mode: variable-length columns are read chunk by chunk in units of
//!   [`CHUNK_SIZE`] bytes until the backend signals the end of the value;
//! - dynamic mode: a [`Value`] slot asks the row for its column type and
//!   dispatches to the typed read for that type.

use crate::backend::{ChunkRead, RowReader};
use crate::error::{BackendError, DataError, ExtractionError};
use crate::query::storage::{ColumnStore, Storage};
use crate::types::{ColumnDescriptor, ColumnType, SqlType, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Transfer unit of manual extraction in bytes.
pub const CHUNK_SIZE: usize = 1024;

/// Default buffer capacity of bound variable-length extractions in bytes.
pub const DEFAULT_MAX_FIELD_SIZE: usize = 64 * 1024;

/// How column data is transferred into the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Whole values, type and size checked against the column description
    #[default]
    Bound,
    /// Variable-length values pulled chunk by chunk
    Manual,
}

/// Options for registering an extraction.
///
/// # Example
///
/// ```
/// use sqlstmt::query::{ExtractOptions, ExtractionMode, Storage};
///
/// let options = ExtractOptions::new()
///     .manual()
///     .with_storage(Storage::Vector)
///     .for_result_set(1);
/// assert_eq!(options.mode, ExtractionMode::Manual);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOptions {
    /// Transfer mode
    pub mode: ExtractionMode,
    /// Buffer capacity for bound variable-length data, statement default if unset
    pub capacity: Option<usize>,
    /// Result set the column belongs to
    pub result_set: usize,
    /// Storage kind; fixes the statement's storage when set
    pub storage: Option<Storage>,
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use manual (chunked) mode.
    pub fn manual(mut self) -> Self {
        self.mode = ExtractionMode::Manual;
        self
    }

    /// Use bound mode.
    pub fn bound(mut self) -> Self {
        self.mode = ExtractionMode::Bound;
        self
    }

    /// Set the buffer capacity in bytes.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Extract from a result set other than the first.
    pub fn for_result_set(mut self, result_set: usize) -> Self {
        self.result_set = result_set;
        self
    }

    /// Request a storage kind.
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }
}

/// Caller handle to the values extracted for one column.
///
/// The statement writes into the same store during fetch cycles; reading the
/// handle while an asynchronous run is in flight observes the rows extracted so
/// far.
#[derive(Debug)]
pub struct Extraction<T> {
    position: usize,
    result_set: usize,
    store: Arc<Mutex<ColumnStore<T>>>,
}

impl<T> Clone for Extraction<T> {
    fn clone(&self) -> Self {
        Self {
            position: self.position,
            result_set: self.result_set,
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: SqlType> Extraction<T> {
    /// All extracted cells in row order; `None` is SQL NULL.
    pub fn values(&self) -> Vec<Option<T>> {
        self.store.lock().to_vec()
    }

    /// Value at `row`, `None` if the row is NULL or was not extracted.
    pub fn get(&self, row: usize) -> Option<T> {
        self.store.lock().get(row).cloned().flatten()
    }

    /// Whether the cell at `row` is NULL.
    pub fn is_null(&self, row: usize) -> bool {
        matches!(self.store.lock().get(row), Some(None))
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage kind of the underlying container.
    pub fn storage(&self) -> Storage {
        self.store.lock().storage()
    }

    /// Column position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Result set index.
    pub fn result_set(&self) -> usize {
        self.result_set
    }
}

/// Type-erased extraction as held by the statement.
pub trait AbstractExtraction: Send {
    /// 0-based column position.
    fn position(&self) -> usize;

    fn result_set(&self) -> usize;

    fn storage(&self) -> Storage;

    /// Whether the statement created this extraction for a record set.
    fn is_internal(&self) -> bool;

    /// Check the slot against the column described by the backend.
    ///
    /// Runs before any row is fetched.
    fn validate(&mut self, column: &ColumnDescriptor) -> Result<(), DataError>;

    /// Read this extraction's column from the current row.
    fn extract(&mut self, row: &mut dyn RowReader) -> Result<(), DataError>;

    /// Number of extracted rows.
    fn len(&self) -> usize;

    /// Cell at `row` as a value cell.
    fn cell(&self, row: usize) -> Option<Value>;

    fn is_null(&self, row: usize) -> bool;

    /// Drop all extracted rows.
    fn clear(&mut self);

    /// Keep the first `len` rows.
    fn truncate(&mut self, len: usize);
}

pub(crate) struct TypedExtraction<T: SqlType> {
    position: usize,
    result_set: usize,
    mode: ExtractionMode,
    capacity: usize,
    internal: bool,
    type_name: String,
    store: Arc<Mutex<ColumnStore<T>>>,
}

impl<T: SqlType> TypedExtraction<T> {
    pub(crate) fn new(
        position: usize,
        result_set: usize,
        mode: ExtractionMode,
        capacity: usize,
        storage: Storage,
    ) -> Self {
        Self {
            position,
            result_set,
            mode,
            capacity,
            internal: false,
            type_name: String::new(),
            store: Arc::new(Mutex::new(ColumnStore::new(storage))),
        }
    }

    /// Mark as created by the statement rather than the caller.
    pub(crate) fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Handle sharing this extraction's store.
    pub(crate) fn handle(&self) -> Extraction<T> {
        Extraction {
            position: self.position,
            result_set: self.result_set,
            store: Arc::clone(&self.store),
        }
    }

    fn read(&self, row: &mut dyn RowReader) -> Result<Option<T>, DataError> {
        match T::column_type() {
            Some(_) => read_cell::<T>(row, self.position, self.mode, self.capacity),
            None => match self.dispatch(row)? {
                Value::Null => Ok(None),
                value => Ok(T::from_value(value)),
            },
        }
    }

    /// Dynamic read: one arm per column type.
    fn dispatch(&self, row: &mut dyn RowReader) -> Result<Value, DataError> {
        let (pos, mode, cap) = (self.position, self.mode, self.capacity);
        let cell = match row.column_type(pos) {
            ColumnType::Bool => read_cell::<bool>(row, pos, mode, cap)?.map(Value::Bool),
            ColumnType::Int8 => read_cell::<i8>(row, pos, mode, cap)?.map(Value::Int8),
            ColumnType::Int16 => read_cell::<i16>(row, pos, mode, cap)?.map(Value::Int16),
            ColumnType::Int32 => read_cell::<i32>(row, pos, mode, cap)?.map(Value::Int32),
            ColumnType::Int64 => read_cell::<i64>(row, pos, mode, cap)?.map(Value::Int64),
            ColumnType::UInt8 => read_cell::<u8>(row, pos, mode, cap)?.map(Value::UInt8),
            ColumnType::UInt16 => read_cell::<u16>(row, pos, mode, cap)?.map(Value::UInt16),
            ColumnType::UInt32 => read_cell::<u32>(row, pos, mode, cap)?.map(Value::UInt32),
            ColumnType::UInt64 => read_cell::<u64>(row, pos, mode, cap)?.map(Value::UInt64),
            ColumnType::Float32 => read_cell::<f32>(row, pos, mode, cap)?.map(Value::Float32),
            ColumnType::Float64 => read_cell::<f64>(row, pos, mode, cap)?.map(Value::Float64),
            ColumnType::Char => read_cell::<char>(row, pos, mode, cap)?.map(Value::Char),
            ColumnType::String => read_cell::<String>(row, pos, mode, cap)?.map(Value::String),
            ColumnType::Blob => read_cell::<Vec<u8>>(row, pos, mode, cap)?.map(Value::Blob),
            ColumnType::Date => read_cell::<NaiveDate>(row, pos, mode, cap)?.map(Value::Date),
            ColumnType::Time => read_cell::<NaiveTime>(row, pos, mode, cap)?.map(Value::Time),
            ColumnType::Timestamp => {
                read_cell::<NaiveDateTime>(row, pos, mode, cap)?.map(Value::Timestamp)
            }
            ColumnType::Unknown => {
                let type_name = if self.type_name.is_empty() {
                    ColumnType::Unknown.to_string()
                } else {
                    self.type_name.clone()
                };
                return Err(ExtractionError::UnsupportedType {
                    position: pos,
                    type_name,
                }
                .into());
            }
        };
        Ok(cell.unwrap_or(Value::Null))
    }
}

/// Read one typed cell from the row, `None` for NULL.
fn read_cell<T: SqlType>(
    row: &mut dyn RowReader,
    position: usize,
    mode: ExtractionMode,
    capacity: usize,
) -> Result<Option<T>, DataError> {
    let expected = T::column_type().unwrap_or(ColumnType::Unknown);

    let value = if mode == ExtractionMode::Manual && expected.is_variable_length() {
        match read_chunked(row, position, expected)? {
            Some(value) => value,
            None => return Ok(None),
        }
    } else {
        if row.is_null(position) {
            return Ok(None);
        }
        let value = row.value(position)?;
        if mode == ExtractionMode::Bound && expected.is_variable_length() {
            let size = value.byte_len();
            if size > capacity {
                return Err(ExtractionError::DataTruncation {
                    position,
                    size,
                    capacity,
                }
                .into());
            }
        }
        value
    };

    if value.is_null() {
        return Ok(None);
    }
    let actual = value.type_tag().unwrap_or(ColumnType::Unknown);
    T::from_value(value).map(Some).ok_or_else(|| {
        ExtractionError::TypeMismatch {
            position,
            expected,
            actual,
        }
        .into()
    })
}

/// Pull a string or blob in fixed-size chunks. `None` is SQL NULL.
fn read_chunked(
    row: &mut dyn RowReader,
    position: usize,
    column_type: ColumnType,
) -> Result<Option<Value>, DataError> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut data = Vec::new();
    loop {
        match row.read_chunk(position, data.len(), &mut buffer)? {
            ChunkRead::Null => return Ok(None),
            ChunkRead::Data(0) => break,
            ChunkRead::Data(n) => {
                let n = n.min(CHUNK_SIZE);
                data.extend_from_slice(&buffer[..n]);
            }
        }
    }

    let value = match column_type {
        ColumnType::String => Value::String(String::from_utf8(data).map_err(|e| {
            BackendError::Fetch(format!("column {} is not valid UTF-8: {}", position, e))
        })?),
        _ => Value::Blob(data),
    };
    Ok(Some(value))
}

impl<T: SqlType> AbstractExtraction for TypedExtraction<T> {
    fn position(&self) -> usize {
        self.position
    }

    fn result_set(&self) -> usize {
        self.result_set
    }

    fn storage(&self) -> Storage {
        self.store.lock().storage()
    }

    fn is_internal(&self) -> bool {
        self.internal
    }

    fn validate(&mut self, column: &ColumnDescriptor) -> Result<(), DataError> {
        self.type_name = column.type_name.clone();
        let Some(expected) = T::column_type() else {
            return Ok(());
        };

        if expected != column.column_type {
            return Err(ExtractionError::TypeMismatch {
                position: self.position,
                expected,
                actual: column.column_type,
            }
            .into());
        }
        if self.mode == ExtractionMode::Bound && expected.is_variable_length() {
            if let Some(size) = column.size {
                if size > self.capacity {
                    return Err(ExtractionError::DataTruncation {
                        position: self.position,
                        size,
                        capacity: self.capacity,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn extract(&mut self, row: &mut dyn RowReader) -> Result<(), DataError> {
        let cell = self.read(row)?;
        self.store.lock().push(cell);
        Ok(())
    }

    fn len(&self) -> usize {
        self.store.lock().len()
    }

    fn cell(&self, row: usize) -> Option<Value> {
        self.store
            .lock()
            .get(row)
            .map(|cell| cell.clone().map_or(Value::Null, SqlType::into_value))
    }

    fn is_null(&self, row: usize) -> bool {
        matches!(self.store.lock().get(row), Some(None))
    }

    fn clear(&mut self) {
        self.store.lock().clear();
    }

    fn truncate(&mut self, len: usize) {
        self.store.lock().truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Single row over owned cells, reporting the given column types.
    struct TestRow {
        types: Vec<ColumnType>,
        values: Vec<Value>,
        chunk_reads: usize,
    }

    impl TestRow {
        fn new(cells: Vec<(ColumnType, Value)>) -> Self {
            let (types, values) = cells.into_iter().unzip();
            Self {
                types,
                values,
                chunk_reads: 0,
            }
        }
    }

    impl RowReader for TestRow {
        fn column_count(&self) -> usize {
            self.types.len()
        }

        fn column_type(&self, position: usize) -> ColumnType {
            self.types[position]
        }

        fn is_null(&self, position: usize) -> bool {
            self.values[position].is_null()
        }

        fn value(&mut self, position: usize) -> Result<Value, DataError> {
            Ok(self.values[position].clone())
        }

        fn read_chunk(
            &mut self,
            position: usize,
            offset: usize,
            buffer: &mut [u8],
        ) -> Result<ChunkRead, DataError> {
            self.chunk_reads += 1;
            let bytes = match &self.values[position] {
                Value::Null => return Ok(ChunkRead::Null),
                Value::String(s) => s.as_bytes().to_vec(),
                Value::Blob(b) => b.clone(),
                _ => return Err(BackendError::Fetch("not chunked".to_string()).into()),
            };
            let rest = &bytes[offset.min(bytes.len())..];
            let n = rest.len().min(buffer.len());
            buffer[..n].copy_from_slice(&rest[..n]);
            Ok(ChunkRead::Data(n))
        }
    }

    fn bound<T: SqlType>(position: usize) -> TypedExtraction<T> {
        TypedExtraction::new(
            position,
            0,
            ExtractionMode::Bound,
            DEFAULT_MAX_FIELD_SIZE,
            Storage::Deque,
        )
    }

    #[test]
    fn test_options_builder() {
        let options = ExtractOptions::new().with_capacity(16).for_result_set(2);
        assert_eq!(options.mode, ExtractionMode::Bound);
        assert_eq!(options.capacity, Some(16));
        assert_eq!(options.result_set, 2);
        assert_eq!(options.storage, None);
    }

    #[test]
    fn test_validate_type_mismatch() {
        let mut extraction = bound::<i32>(0);
        let err = extraction
            .validate(&ColumnDescriptor::new("id", ColumnType::Int64))
            .unwrap_err();
        assert_eq!(
            err,
            DataError::Extraction(ExtractionError::TypeMismatch {
                position: 0,
                expected: ColumnType::Int32,
                actual: ColumnType::Int64,
            })
        );
    }

    #[test]
    fn test_validate_declared_size() {
        let mut extraction =
            TypedExtraction::<String>::new(0, 0, ExtractionMode::Bound, 8, Storage::Deque);
        let column = ColumnDescriptor::new("name", ColumnType::String).with_size(32);
        assert_eq!(
            extraction.validate(&column).unwrap_err().kind(),
            ErrorKind::DataTruncation
        );

        let mut manual =
            TypedExtraction::<String>::new(0, 0, ExtractionMode::Manual, 8, Storage::Deque);
        assert!(manual.validate(&column).is_ok());
    }

    #[test]
    fn test_bound_extract_and_null() {
        let mut extraction = bound::<i64>(1);
        let handle = extraction.handle();
        let mut row = TestRow::new(vec![
            (ColumnType::String, Value::from("a")),
            (ColumnType::Int64, Value::Int64(5)),
        ]);
        extraction.extract(&mut row).unwrap();
        let mut row = TestRow::new(vec![
            (ColumnType::String, Value::from("b")),
            (ColumnType::Int64, Value::Null),
        ]);
        extraction.extract(&mut row).unwrap();

        assert_eq!(handle.values(), vec![Some(5), None]);
        assert!(handle.is_null(1));
        assert_eq!(extraction.cell(1), Some(Value::Null));
        assert_eq!(extraction.cell(0), Some(Value::Int64(5)));
        assert_eq!(extraction.cell(2), None);
    }

    #[test]
    fn test_bound_extract_checks_actual_length() {
        let mut extraction =
            TypedExtraction::<String>::new(0, 0, ExtractionMode::Bound, 4, Storage::Deque);
        let mut row = TestRow::new(vec![(ColumnType::String, Value::from("overflow"))]);
        let err = extraction.extract(&mut row).unwrap_err();
        assert_eq!(
            err,
            DataError::Extraction(ExtractionError::DataTruncation {
                position: 0,
                size: 8,
                capacity: 4,
            })
        );
        assert_eq!(extraction.len(), 0);
    }

    #[test]
    fn test_manual_extract_reads_chunks() {
        let text = "x".repeat(CHUNK_SIZE * 2 + 10);
        let mut extraction =
            TypedExtraction::<String>::new(0, 0, ExtractionMode::Manual, 4, Storage::Vector);
        let handle = extraction.handle();
        let mut row = TestRow::new(vec![(ColumnType::String, Value::from(text.as_str()))]);
        extraction.extract(&mut row).unwrap();

        assert_eq!(handle.get(0), Some(text));
        assert_eq!(row.chunk_reads, 4);
        assert_eq!(handle.storage(), Storage::Vector);
    }

    #[test]
    fn test_manual_null_short_circuits() {
        let mut extraction =
            TypedExtraction::<Vec<u8>>::new(0, 0, ExtractionMode::Manual, 4, Storage::Deque);
        let mut row = TestRow::new(vec![(ColumnType::Blob, Value::Null)]);
        extraction.extract(&mut row).unwrap();
        assert_eq!(row.chunk_reads, 1);
        assert!(extraction.is_null(0));
    }

    #[test]
    fn test_dynamic_dispatch() {
        let mut extraction = bound::<Value>(0);
        let handle = extraction.handle();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        for cell in [
            (ColumnType::Int16, Value::Int16(-3)),
            (ColumnType::Date, Value::Date(date)),
            (ColumnType::Float64, Value::Null),
        ] {
            extraction.extract(&mut TestRow::new(vec![cell])).unwrap();
        }
        assert_eq!(
            handle.values(),
            vec![
                Some(Value::Int16(-3)),
                Some(Value::Date(date)),
                None
            ]
        );
        assert!(extraction.is_null(2));
        assert_eq!(extraction.cell(2), Some(Value::Null));
        assert!(extraction.validate(&ColumnDescriptor::new("x", ColumnType::Blob)).is_ok());
    }

    #[test]
    fn test_dynamic_dispatch_unknown_type() {
        let mut extraction = bound::<Value>(0);
        extraction
            .validate(&ColumnDescriptor::new("g", ColumnType::Unknown).with_type_name("GEOMETRY"))
            .unwrap();
        let mut row = TestRow::new(vec![(ColumnType::Unknown, Value::Int32(1))]);
        let err = extraction.extract(&mut row).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert!(err.to_string().contains("GEOMETRY"));
    }

    #[test]
    fn test_misreported_cell_is_type_mismatch() {
        let mut extraction = bound::<i32>(0);
        let mut row = TestRow::new(vec![(ColumnType::Int32, Value::Int64(1))]);
        assert_eq!(
            extraction.extract(&mut row).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_clear_and_internal_flag() {
        let mut extraction = bound::<bool>(0).internal();
        assert!(extraction.is_internal());
        extraction
            .extract(&mut TestRow::new(vec![(ColumnType::Bool, Value::Bool(true))]))
            .unwrap();
        assert_eq!(extraction.len(), 1);
        extraction.clear();
        assert_eq!(extraction.len(), 0);
    }
}
