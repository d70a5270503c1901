//! Cascade reporting and the per-cell failure taxonomy.

use serde::{Deserialize, Serialize};

use crate::cell_id::CellId;

/// Why a node finished a cascade rejected.
///
/// Distinguishing own-failure from upstream-failure is what lets the UI
/// show "this cell errored" vs "a dependency of this cell errored".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellError {
    /// The cell's own evaluation failed.
    Evaluation(String),
    /// An upstream dependency rejected; this cell was not evaluated.
    Upstream(CellId),
    /// The cell participates in a dependency cycle.
    Cycle(String),
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellError::Evaluation(msg) => write!(f, "Error: {}", msg),
            CellError::Upstream(cell) => {
                write!(f, "Dependency error: upstream cell {} failed", cell)
            }
            CellError::Cycle(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for CellError {}

/// An error recorded against a specific cell during a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeError {
    pub cell: CellId,
    pub error: CellError,
}

impl CascadeError {
    pub fn new(cell: CellId, error: CellError) -> Self {
        Self { cell, error }
    }
}

/// Report from one cascade (registration-triggered or run-all).
#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    /// Wall time for the whole cascade in milliseconds.
    pub duration_ms: u64,

    /// Number of cells whose evaluation callback actually ran.
    /// Cells rejected by propagation (upstream/cycle) are not counted.
    pub cells_recomputed: usize,

    /// Maximum dependency depth encountered. A node with no precedents
    /// inside the cascade has depth 0.
    pub max_depth: usize,

    /// True if a cycle was detected in the affected set.
    pub had_cycles: bool,

    /// Errors encountered, truncated to the first 100.
    pub errors: Vec<CascadeError>,
}

impl CascadeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} cells in {}ms, depth={}, cycles={}, errors={}",
            self.cells_recomputed,
            self.duration_ms,
            self.max_depth,
            self.had_cycles,
            self.errors.len()
        )
    }

    /// One-line log entry.
    ///
    /// Format: `[cascade]   3ms  5 cells  depth=2  cycles=0  errors=0`
    pub fn log_line(&self) -> String {
        format!(
            "[cascade] {:>4}ms  {} cells  depth={}  cycles={}  errors={}",
            self.duration_ms,
            self.cells_recomputed,
            self.max_depth,
            if self.had_cycles { 1 } else { 0 },
            self.errors.len()
        )
    }

    pub(crate) fn push_error(&mut self, error: CascadeError) {
        if self.errors.len() < 100 {
            self.errors.push(error);
        }
    }
}

/// Report produced when topological ordering finds a circular reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Cells that could not be ordered (cycle members and anything
    /// downstream of them inside the affected set).
    pub cells: Vec<CellId>,

    /// Human-readable description of the cycle.
    pub message: String,
}

impl CycleReport {
    pub fn new(cells: Vec<CellId>, message: impl Into<String>) -> Self {
        Self {
            cells,
            message: message.into(),
        }
    }

    /// Build a report for a detected cycle.
    pub fn cycle(cells: Vec<CellId>) -> Self {
        let names: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        let message = if cells.len() <= 5 {
            format!("Circular dependency: {}", names.join(" -> "))
        } else {
            format!(
                "Circular dependency involving {} cells: {} -> ... -> {}",
                cells.len(),
                names[0],
                names[names.len() - 1]
            )
        };
        Self { cells, message }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CycleReport {}
