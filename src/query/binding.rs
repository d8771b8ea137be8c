//! Parameter bindings.
//!
//! A binding associates a 1-based parameter position with a caller-owned typed
//! slot. The statement keeps bindings type-erased behind [`AbstractBinding`] and
//! exchanges values with the backend as [`Value`] cells.

use crate::backend::Backend;
use crate::error::{DataError, ExtractionError};
use crate::types::{ColumnType, SqlType, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Data flow direction of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Value flows to the backend
    In,
    /// Value is produced by the backend
    Out,
    /// Value flows both ways
    InOut,
}

impl Direction {
    /// Whether the backend reads this parameter.
    pub fn is_input(&self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    /// Whether the backend writes this parameter back.
    pub fn is_output(&self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
            Direction::InOut => write!(f, "in-out"),
        }
    }
}

/// Shared typed parameter slot.
///
/// Clones share the slot, so the caller keeps a handle while the statement holds
/// another; output parameters become visible through the caller's handle after
/// the run. `None` is SQL NULL.
///
/// # Example
///
/// ```
/// use sqlstmt::query::Param;
///
/// let param = Param::new(41i32);
/// let handle = param.clone();
/// param.set(Some(42));
/// assert_eq!(handle.get(), Some(42));
/// ```
#[derive(Debug)]
pub struct Param<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Param<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: SqlType> Param<T> {
    /// Create a slot holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(value))),
        }
    }

    /// Create a slot holding NULL.
    pub fn null() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Current value, `None` for NULL.
    pub fn get(&self) -> Option<T> {
        self.slot.lock().clone()
    }

    /// Replace the value.
    pub fn set(&self, value: Option<T>) {
        *self.slot.lock() = value;
    }

    /// Whether the slot holds NULL.
    pub fn is_null(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Type-erased binding as held by the statement.
pub trait AbstractBinding: Send {
    /// 1-based parameter position.
    fn position(&self) -> usize;

    fn direction(&self) -> Direction;

    /// Slot type, `None` for a dynamic value slot.
    fn column_type(&self) -> Option<ColumnType>;

    /// Current slot content as a value cell.
    fn value(&self) -> Value;

    /// Store an output value returned by the backend.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the value does not fit the slot type.
    fn receive(&mut self, value: Value) -> Result<(), DataError>;
}

/// Binding over a typed [`Param`] slot.
pub(crate) struct TypedBinding<T: SqlType> {
    position: usize,
    param: Param<T>,
    direction: Direction,
}

impl<T: SqlType> TypedBinding<T> {
    pub(crate) fn new(position: usize, param: Param<T>, direction: Direction) -> Self {
        Self {
            position,
            param,
            direction,
        }
    }
}

impl<T: SqlType> AbstractBinding for TypedBinding<T> {
    fn position(&self) -> usize {
        self.position
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn column_type(&self) -> Option<ColumnType> {
        T::column_type()
    }

    fn value(&self) -> Value {
        self.param.get().map_or(Value::Null, SqlType::into_value)
    }

    fn receive(&mut self, value: Value) -> Result<(), DataError> {
        if value.is_null() {
            self.param.set(None);
            return Ok(());
        }
        let actual = value.type_tag().unwrap_or(ColumnType::Unknown);
        match T::from_value(value) {
            Some(v) => {
                self.param.set(Some(v));
                Ok(())
            }
            None => Err(ExtractionError::TypeMismatch {
                position: self.position,
                expected: T::column_type().unwrap_or(ColumnType::Unknown),
                actual,
            }
            .into()),
        }
    }
}

/// Ordered binding registry.
#[derive(Default)]
pub(crate) struct Bindings {
    entries: Vec<Box<dyn AbstractBinding>>,
}

impl Bindings {
    /// Register a binding, keeping the registry ordered by position.
    ///
    /// # Errors
    ///
    /// Returns a registration error for position 0 or a duplicate position.
    pub(crate) fn add(&mut self, binding: Box<dyn AbstractBinding>) -> Result<(), DataError> {
        let position = binding.position();
        if position == 0 {
            return Err(DataError::registration(0, "parameter positions are 1-based"));
        }
        match self
            .entries
            .binary_search_by_key(&position, |b| b.position())
        {
            Ok(_) => Err(DataError::registration(
                position,
                "parameter position already bound",
            )),
            Err(index) => {
                self.entries.insert(index, binding);
                Ok(())
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Check that positions form the contiguous sequence `1..=n`.
    pub(crate) fn validate(&self) -> Result<(), DataError> {
        for (index, binding) in self.entries.iter().enumerate() {
            if binding.position() != index + 1 {
                return Err(DataError::registration(
                    index + 1,
                    format!(
                        "parameter positions must be contiguous, next bound position is {}",
                        binding.position()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Hand every current slot value to the backend.
    pub(crate) fn bind_all(&self, backend: &mut dyn Backend) -> Result<(), DataError> {
        for binding in &self.entries {
            let value = binding.value();
            trace!(position = binding.position(), direction = %binding.direction(), "binding parameter");
            backend.bind_parameter(binding.position(), &value, binding.direction())?;
        }
        Ok(())
    }

    /// Copy output values from the backend into out and in-out slots.
    pub(crate) fn collect_outputs(&mut self, backend: &mut dyn Backend) -> Result<(), DataError> {
        for binding in self.entries.iter_mut() {
            if binding.direction().is_output() {
                let value = backend.output_parameter(binding.position())?;
                binding.receive(value)?;
            }
        }
        Ok(())
    }
}
