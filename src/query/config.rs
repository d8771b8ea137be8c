//! Statement configuration.

use crate::error::DataError;
use crate::query::extraction::DEFAULT_MAX_FIELD_SIZE;
use crate::query::paging::Paging;
use crate::query::storage::Storage;
use serde::{Deserialize, Serialize};

/// Default number of rows requested per fetch cycle.
pub const DEFAULT_FETCH_SIZE: usize = 1000;

/// Execution settings of a statement.
///
/// Every field has a default, so a partial JSON document deserializes into a
/// complete configuration.
///
/// # Example
///
/// ```
/// use sqlstmt::query::{Paging, StatementConfig, Storage};
///
/// let config = StatementConfig::default()
///     .with_async()
///     .with_storage(Storage::Vector)
///     .with_paging(Paging::hard_limit(100));
/// assert!(config.is_async);
/// assert!(config.validate().is_ok());
///
/// let parsed: StatementConfig =
///     serde_json::from_str(r#"{"storage": "list", "fetch_size": 50}"#).unwrap();
/// assert_eq!(parsed.storage, Storage::List);
/// assert_eq!(parsed.fetch_size, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementConfig {
    /// Route `execute()` through the asynchronous worker
    pub is_async: bool,
    /// Container kind for extracted columns
    pub storage: Storage,
    /// Paging policy applied to every `execute()` call
    pub paging: Paging,
    /// Rows requested per fetch cycle by unlimited and limited policies
    pub fetch_size: usize,
    /// Default buffer capacity in bytes for bound variable-length extractions
    pub max_field_size: usize,
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            is_async: false,
            storage: Storage::default(),
            paging: Paging::default(),
            fetch_size: DEFAULT_FETCH_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
        }
    }
}

impl StatementConfig {
    /// Mark statements as asynchronous.
    pub fn with_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Mark statements as synchronous.
    pub fn with_sync(mut self) -> Self {
        self.is_async = false;
        self
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn with_max_field_size(mut self, max_field_size: usize) -> Self {
        self.max_field_size = max_field_size;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero sizes or an invalid paging policy.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.fetch_size == 0 {
            return Err(DataError::config("fetch_size must be at least 1"));
        }
        if self.max_field_size == 0 {
            return Err(DataError::config("max_field_size must be at least 1"));
        }
        self.paging.validate()
    }
}
