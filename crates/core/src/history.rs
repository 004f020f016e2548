//! Run history store.
//!
//! Completed synchronous runs are kept in an owned [`RunHistory`] that
//! only changes through [`RunHistory::apply`]. One run per
//! `(filter, mask size)` pair is kept, newest last, capped at
//! [`MAX_HISTORY`] entries. The history serializes as a plain JSON array
//! of runs so it can be kept between sessions.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::filter::FilterKind;
use crate::job::Dim2;
use crate::types::{RunId, Timestamp};

/// Maximum number of runs retained.
pub const MAX_HISTORY: usize = 10;

/// Measurements of a finished run, as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub filter: FilterKind,
    pub mask_size: u32,
    pub execution_time_ms: f64,
    pub kernel_time_ms: f64,
    pub block_dim: Dim2,
    pub grid_dim: Dim2,
    pub image_width: u32,
    pub image_height: u32,
}

/// A run stored in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub filter: FilterKind,
    pub mask_size: u32,
    pub execution_time_ms: f64,
    pub kernel_time_ms: f64,
    pub block_dim: Dim2,
    pub grid_dim: Dim2,
    pub image_width: u32,
    pub image_height: u32,
    pub recorded_at: Timestamp,
}

impl RunRecord {
    pub fn threads_per_block(&self) -> u64 {
        self.block_dim.area()
    }

    pub fn total_blocks(&self) -> u64 {
        self.grid_dim.area()
    }
}

/// State transitions accepted by [`RunHistory`].
#[derive(Debug, Clone)]
pub enum HistoryAction {
    Record(NewRun),
    Reset,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<RunRecord>", into = "Vec<RunRecord>")]
pub struct RunHistory {
    runs: Vec<RunRecord>,
}

/// Restores saved runs, keeping only the newest [`MAX_HISTORY`].
impl From<Vec<RunRecord>> for RunHistory {
    fn from(mut runs: Vec<RunRecord>) -> Self {
        if runs.len() > MAX_HISTORY {
            runs.drain(..runs.len() - MAX_HISTORY);
        }
        Self { runs }
    }
}

impl From<RunHistory> for Vec<RunRecord> {
    fn from(history: RunHistory) -> Self {
        history.runs
    }
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Apply an action.
    ///
    /// `Reset` on an empty history is rejected so callers can tell the
    /// user there was nothing to clear.
    pub fn apply(&mut self, action: HistoryAction) -> Result<(), CoreError> {
        match action {
            HistoryAction::Record(run) => {
                self.record(run, chrono::Utc::now());
                Ok(())
            }
            HistoryAction::Reset => {
                if self.runs.is_empty() {
                    return Err(CoreError::Validation("No runs to reset".to_string()));
                }
                self.runs.clear();
                Ok(())
            }
        }
    }

    fn record(&mut self, run: NewRun, recorded_at: Timestamp) {
        let id = self.runs.last().map_or(0, |r| r.id) + 1;

        self.runs
            .retain(|r| !(r.filter == run.filter && r.mask_size == run.mask_size));

        self.runs.push(RunRecord {
            id,
            filter: run.filter,
            mask_size: run.mask_size,
            execution_time_ms: run.execution_time_ms,
            kernel_time_ms: run.kernel_time_ms,
            block_dim: run.block_dim,
            grid_dim: run.grid_dim,
            image_width: run.image_width,
            image_height: run.image_height,
            recorded_at,
        });

        if self.runs.len() > MAX_HISTORY {
            let excess = self.runs.len() - MAX_HISTORY;
            self.runs.drain(..excess);
        }
    }
}
