//! Paging policies and the controller that bounds fetch cycles.
//!
//! A policy is applied per `execute()` call: every call on a paused statement
//! starts a fresh controller, so resuming always makes progress and a row is
//! never fetched twice.

use crate::error::{DataError, StatementError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule governing how many rows one `execute()` call fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Paging {
    /// Fetch until the backend reports end of data
    #[default]
    Unlimited,
    /// Stop once `rows` rows have been produced.
    ///
    /// A hard limit additionally fails with `LimitNotReached` when the data ends
    /// before the limit is reached.
    Limit { rows: usize, hard: bool },
    /// At least `lower` rows (hard) and at most `upper` rows (soft)
    Range { lower: usize, upper: usize },
    /// One fetch cycle of at most `rows` rows per call
    Step { rows: usize },
}

impl Paging {
    /// Soft limit of `rows` rows.
    pub fn limit(rows: usize) -> Self {
        Paging::Limit { rows, hard: false }
    }

    /// Hard limit of `rows` rows.
    pub fn hard_limit(rows: usize) -> Self {
        Paging::Limit { rows, hard: true }
    }

    /// Range policy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `lower > upper` or `upper == 0`.
    pub fn range(lower: usize, upper: usize) -> Result<Self, DataError> {
        let paging = Paging::Range { lower, upper };
        paging.validate()?;
        Ok(paging)
    }

    /// Step policy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `rows == 0`.
    pub fn step(rows: usize) -> Result<Self, DataError> {
        let paging = Paging::Step { rows };
        paging.validate()?;
        Ok(paging)
    }

    /// Check the policy for consistency.
    ///
    /// Policies built through deserialization or struct literals bypass the
    /// checked constructors, so the statement validates again before running.
    pub fn validate(&self) -> Result<(), DataError> {
        match *self {
            Paging::Unlimited => Ok(()),
            Paging::Limit { rows: 0, .. } => Err(DataError::config("limit must be at least 1 row")),
            Paging::Limit { .. } => Ok(()),
            Paging::Range { upper: 0, .. } => {
                Err(DataError::config("range upper bound must be at least 1 row"))
            }
            Paging::Range { lower, upper } if lower > upper => Err(DataError::config(format!(
                "range lower bound {} exceeds upper bound {}",
                lower, upper
            ))),
            Paging::Range { .. } => Ok(()),
            Paging::Step { rows: 0 } => Err(DataError::config("step must be at least 1 row")),
            Paging::Step { .. } => Ok(()),
        }
    }

    /// Minimum row count a call must produce before end of data, if any.
    fn hard_minimum(&self) -> Option<usize> {
        match *self {
            Paging::Limit { rows, hard: true } => Some(rows),
            Paging::Range { lower, .. } if lower > 0 => Some(lower),
            _ => None,
        }
    }
}

impl fmt::Display for Paging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Paging::Unlimited => write!(f, "unlimited"),
            Paging::Limit { rows, hard: true } => write!(f, "limit({}, hard)", rows),
            Paging::Limit { rows, hard: false } => write!(f, "limit({})", rows),
            Paging::Range { lower, upper } => write!(f, "range({}..={})", lower, upper),
            Paging::Step { rows } => write!(f, "step({})", rows),
        }
    }
}

/// Per-call controller deciding how many rows each fetch cycle requests.
#[derive(Debug, Clone)]
pub(crate) struct PagingController {
    paging: Paging,
    fetch_size: usize,
    produced: usize,
    cycles: usize,
}

impl PagingController {
    pub(crate) fn new(paging: Paging, fetch_size: usize) -> Self {
        Self {
            paging,
            fetch_size: fetch_size.max(1),
            produced: 0,
            cycles: 0,
        }
    }

    /// Rows to request in the next cycle, `None` once the policy stops the call.
    pub(crate) fn next_request(&self) -> Option<usize> {
        match self.paging {
            Paging::Unlimited => Some(self.fetch_size),
            Paging::Limit { rows, .. } => self.remaining(rows),
            Paging::Range { upper, .. } => self.remaining(upper),
            Paging::Step { rows } => (self.cycles == 0).then_some(rows),
        }
    }

    fn remaining(&self, limit: usize) -> Option<usize> {
        if self.produced >= limit {
            None
        } else {
            Some((limit - self.produced).min(self.fetch_size))
        }
    }

    /// Account for one completed fetch cycle.
    pub(crate) fn record(&mut self, rows: usize) {
        self.produced += rows;
        self.cycles += 1;
    }

    pub(crate) fn produced(&self) -> usize {
        self.produced
    }

    /// Check the hard minimum once the data has ended.
    pub(crate) fn finish(&self) -> Result<(), DataError> {
        match self.paging.hard_minimum() {
            Some(limit) if self.produced < limit => Err(StatementError::LimitNotReached {
                limit,
                rows: self.produced,
            }
            .into()),
            _ => Ok(()),
        }
    }
}
