//! Result storage kinds and the typed column containers behind extractions.

use serde::{Deserialize, Serialize};
use std::collections::{LinkedList, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Growth strategy of the containers extracted columns are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    /// Double-ended queue, the default
    #[default]
    Deque,
    /// Contiguous vector
    Vector,
    /// Linked list
    ///
    /// Random access walks the list, so reading row `n` through a record set
    /// costs O(n) and materializing every row is quadratic. Prefer `Deque` or
    /// `Vector` for record sets over large results.
    List,
}

impl Storage {
    /// Lower-case name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Storage::Deque => "deque",
            Storage::Vector => "vector",
            Storage::List => "list",
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Storage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deque" => Ok(Storage::Deque),
            "vector" => Ok(Storage::Vector),
            "list" => Ok(Storage::List),
            other => Err(format!("unknown storage kind '{}'", other)),
        }
    }
}

/// Column container of extracted values; `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnStore<T> {
    Deque(VecDeque<Option<T>>),
    Vector(Vec<Option<T>>),
    List(LinkedList<Option<T>>),
}

impl<T: Clone> ColumnStore<T> {
    /// Create an empty container of the given kind.
    pub fn new(storage: Storage) -> Self {
        match storage {
            Storage::Deque => ColumnStore::Deque(VecDeque::new()),
            Storage::Vector => ColumnStore::Vector(Vec::new()),
            Storage::List => ColumnStore::List(LinkedList::new()),
        }
    }

    /// Kind of this container.
    pub fn storage(&self) -> Storage {
        match self {
            ColumnStore::Deque(_) => Storage::Deque,
            ColumnStore::Vector(_) => Storage::Vector,
            ColumnStore::List(_) => Storage::List,
        }
    }

    pub fn push(&mut self, value: Option<T>) {
        match self {
            ColumnStore::Deque(d) => d.push_back(value),
            ColumnStore::Vector(v) => v.push(value),
            ColumnStore::List(l) => l.push_back(value),
        }
    }

    /// Cell at `row`; the outer `None` means the row does not exist.
    pub fn get(&self, row: usize) -> Option<&Option<T>> {
        match self {
            ColumnStore::Deque(d) => d.get(row),
            ColumnStore::Vector(v) => v.get(row),
            ColumnStore::List(l) => l.iter().nth(row),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnStore::Deque(d) => d.len(),
            ColumnStore::Vector(v) => v.len(),
            ColumnStore::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep the first `len` cells.
    pub fn truncate(&mut self, len: usize) {
        match self {
            ColumnStore::Deque(d) => d.truncate(len),
            ColumnStore::Vector(v) => v.truncate(len),
            ColumnStore::List(l) => {
                if len < l.len() {
                    l.split_off(len);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        match self {
            ColumnStore::Deque(d) => d.clear(),
            ColumnStore::Vector(v) => v.clear(),
            ColumnStore::List(l) => l.clear(),
        }
    }

    /// Copy all cells out in row order.
    pub fn to_vec(&self) -> Vec<Option<T>> {
        match self {
            ColumnStore::Deque(d) => d.iter().cloned().collect(),
            ColumnStore::Vector(v) => v.clone(),
            ColumnStore::List(l) => l.iter().cloned().collect(),
        }
    }
}
