//! Dependency graph adjacency for registered cells.
//!
//! Tracks which cells feed which. Edges are derived from active inputs:
//! an edge exists from the cell owning a name to each cell that
//! references that name while it is owned.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** if A ∈ preds[B] then B ∈ succs[A],
//!    and vice versa.
//! 2. **No dangling entries:** empty sets are removed, not stored.
//! 3. **No duplicate edges:** set semantics enforced by FxHashSet.
//! 4. `replace_edges` and `remove_node` are the only mutators.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::CellId;
use crate::recalc::CycleReport;

#[derive(Debug, Default, Clone)]
pub struct DepGraph {
    /// Precedents: for each cell B, the cells A it depends on.
    preds: FxHashMap<CellId, FxHashSet<CellId>>,

    /// Dependents: for each cell A, the cells B that depend on it.
    succs: FxHashMap<CellId, FxHashSet<CellId>>,
}

impl DepGraph {
    /// Create an empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells this cell depends on (incoming edges).
    pub fn precedents<'a>(&'a self, cell: &CellId) -> impl Iterator<Item = &'a CellId> + 'a {
        self.preds.get(cell).into_iter().flat_map(|s| s.iter())
    }

    /// Cells that depend on this cell (outgoing edges).
    pub fn dependents<'a>(&'a self, cell: &CellId) -> impl Iterator<Item = &'a CellId> + 'a {
        self.succs.get(cell).into_iter().flat_map(|s| s.iter())
    }

    pub fn precedent_count(&self, cell: &CellId) -> usize {
        self.preds.get(cell).map_or(0, |s| s.len())
    }

    pub fn dependent_count(&self, cell: &CellId) -> usize {
        self.succs.get(cell).map_or(0, |s| s.len())
    }

    /// Number of cells with at least one precedent.
    pub fn wired_cell_count(&self) -> usize {
        self.preds.len()
    }

    /// Replace all incoming edges for a cell atomically.
    ///
    /// Pass an empty set to clear the cell's incoming edges.
    pub fn replace_edges(&mut self, cell: &CellId, new_preds: FxHashSet<CellId>) {
        if let Some(old_preds) = self.preds.remove(cell) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(cell);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs
                .entry(pred.clone())
                .or_default()
                .insert(cell.clone());
        }

        self.preds.insert(cell.clone(), new_preds);
    }

    /// Remove a cell and every edge touching it, in both directions.
    ///
    /// Called when a cell is unregistered; its dependents keep their
    /// node records but lose the edge.
    pub fn remove_node(&mut self, cell: &CellId) {
        self.replace_edges(cell, FxHashSet::default());

        if let Some(dependents) = self.succs.remove(cell) {
            for dep in dependents {
                if let Some(preds) = self.preds.get_mut(&dep) {
                    preds.remove(cell);
                    if preds.is_empty() {
                        self.preds.remove(&dep);
                    }
                }
            }
        }
    }

    /// Transitive dependents of `roots` following edges, roots included.
    ///
    /// This is the affected set of a cascade starting at `roots`.
    pub fn closure_downstream(&self, roots: &[CellId]) -> FxHashSet<CellId> {
        let mut visited: FxHashSet<CellId> = FxHashSet::default();
        let mut stack: Vec<CellId> = roots.to_vec();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = self.succs.get(&current) {
                for dep in deps {
                    if !visited.contains(dep) {
                        stack.push(dep.clone());
                    }
                }
            }
        }

        visited
    }

    /// Topological order of `cells`, considering only edges inside the
    /// subset. Kahn's algorithm with lexicographic tie-breaks for
    /// deterministic output.
    ///
    /// Returns `Err(CycleReport)` listing every cell that could not be
    /// ordered (cycle members plus their in-subset downstream).
    pub fn topo_order(&self, cells: &FxHashSet<CellId>) -> Result<Vec<CellId>, CycleReport> {
        if cells.is_empty() {
            return Ok(Vec::new());
        }

        let mut in_degree: FxHashMap<CellId, usize> = FxHashMap::default();
        for cell in cells {
            let count = self
                .preds
                .get(cell)
                .map(|preds| preds.iter().filter(|p| cells.contains(*p)).count())
                .unwrap_or(0);
            in_degree.insert(cell.clone(), count);
        }

        // Sort descending so the smallest id is popped first.
        let mut queue: Vec<CellId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(cell, _)| cell.clone())
            .collect();
        queue.sort_by(|a, b| b.cmp(a));

        let mut result = Vec::with_capacity(cells.len());

        while let Some(cell) = queue.pop() {
            result.push(cell.clone());

            if let Some(deps) = self.succs.get(&cell) {
                let mut new_zero_degree = Vec::new();

                for dep in deps {
                    if !cells.contains(dep) {
                        continue;
                    }
                    if let Some(deg) = in_degree.get_mut(dep) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            new_zero_degree.push(dep.clone());
                        }
                    }
                }

                new_zero_degree.sort();
                for dep in new_zero_degree.into_iter().rev() {
                    queue.push(dep);
                }
            }
        }

        if result.len() < cells.len() {
            let mut leftover: Vec<CellId> = cells
                .iter()
                .filter(|c| !result.contains(*c))
                .cloned()
                .collect();
            leftover.sort();
            return Err(CycleReport::cycle(leftover));
        }

        Ok(result)
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (cell, preds) in &self.preds {
            for pred in preds {
                assert!(
                    self.succs.get(pred).is_some_and(|s| s.contains(cell)),
                    "Missing succ edge: {} should have {} in dependents",
                    pred,
                    cell
                );
            }
        }

        for (cell, dependents) in &self.succs {
            for dep in dependents {
                assert!(
                    self.preds.get(dep).is_some_and(|s| s.contains(cell)),
                    "Missing pred edge: {} should have {} in precedents",
                    dep,
                    cell
                );
            }
        }

        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "Empty preds set stored for {}", cell);
        }
        for (cell, succs) in &self.succs {
            assert!(!succs.is_empty(), "Empty succs set stored for {}", cell);
        }
    }
}
