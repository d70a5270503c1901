//! The notebook engine: registration, cascades, and mode control.
//!
//! [`Notebook`] owns the ownership registry, the dependency graph, and
//! the per-cell node records, and drives re-evaluation. Registration is
//! split in two phases so a batch of edits produces one cascade:
//! `register_inner` wires a single cell (extract, claim, edge swap,
//! late-binding scan) and collects cascade roots; `cascade` then orders
//! the affected set topologically and evaluates it once, oldest
//! precedent first.
//!
//! Everything is synchronous and single-threaded. The evaluator is the
//! source of truth for values; node states and events exist for the
//! presentation layer.

use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cell::{CellNode, NodeState};
use crate::cell_id::CellId;
use crate::dep_graph::DepGraph;
use crate::evaluator::{Evaluator, Renderer};
use crate::events::{
    BrokenDependencyEvent, CellFulfilledEvent, CellPendingEvent, CellRejectedEvent,
    DuplicateDefinitionEvent, EventCallback, ExtractionWarningEvent, NotebookEvent,
};
use crate::extract::{self, ASSIGN_TOKEN};
use crate::recalc::{CascadeError, CascadeReport, CellError};
use crate::registry::OwnerRegistry;

/// Evaluation discipline of the notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Cells form a dependency graph; editing one re-evaluates its
    /// downstream automatically.
    Reactive,
    /// Cells evaluate only when explicitly run, in the order given.
    /// No graph, no registry, no cascades.
    Manual,
}

/// A live notebook: registry, graph, node store, and scheduler.
pub struct Notebook {
    mode: Mode,
    registry: OwnerRegistry,
    graph: DepGraph,
    nodes: FxHashMap<CellId, CellNode>,

    /// Expressions of disabled cells, keyed by cell. A disabled cell is
    /// fully unregistered; enabling re-registers the stored text.
    disabled: FxHashMap<CellId, String>,

    /// Cells queued for re-registration because a name they mention
    /// gained an owner after they were wired.
    pending_rewires: Vec<CellId>,

    evaluator: Box<dyn Evaluator>,
    renderer: Box<dyn Renderer>,
    events: Option<EventCallback>,
}

impl Notebook {
    pub fn new(evaluator: Box<dyn Evaluator>, renderer: Box<dyn Renderer>) -> Self {
        Self {
            mode: Mode::Reactive,
            registry: OwnerRegistry::new(),
            graph: DepGraph::new(),
            nodes: FxHashMap::default(),
            disabled: FxHashMap::default(),
            pending_rewires: Vec::new(),
            evaluator,
            renderer,
            events: None,
        }
    }

    pub fn set_event_callback(&mut self, callback: EventCallback) {
        self.events = Some(callback);
    }

    fn emit(&mut self, event: NotebookEvent) {
        if let Some(callback) = &mut self.events {
            callback(event);
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch modes. Entering manual mode tears the reactive state down
    /// completely; switching back starts from an empty notebook and the
    /// caller re-runs its cells to rebuild the graph.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        if mode == Mode::Manual {
            self.nodes.clear();
            self.graph = DepGraph::new();
            self.registry.clear();
            self.disabled.clear();
            self.pending_rewires.clear();
        }
        self.mode = mode;
    }

    pub fn node(&self, cell: &CellId) -> Option<&CellNode> {
        self.nodes.get(cell)
    }

    pub fn registry(&self) -> &OwnerRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn is_disabled(&self, cell: &CellId) -> bool {
        self.disabled.contains_key(cell)
    }

    pub fn registered_cells(&self) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self.nodes.keys().cloned().collect();
        cells.sort();
        cells
    }

    /// Run one cell's source. Reactive mode registers it in the graph
    /// and cascades; manual mode evaluates it in place.
    pub fn run_cell(&mut self, cell: &CellId, text: &str) -> CascadeReport {
        match self.mode {
            Mode::Reactive => self.register_cell(cell, text),
            Mode::Manual => {
                let started = Instant::now();
                let mut report = CascadeReport::new();
                self.evaluate_manual(cell, text, &mut report);
                report.duration_ms = started.elapsed().as_millis() as u64;
                report
            }
        }
    }

    /// Run every cell in document order, skipping disabled cells.
    /// Reactive mode registers them all first and then cascades once
    /// over the combined roots.
    pub fn run_all(&mut self, cells: &[(CellId, String)]) -> CascadeReport {
        match self.mode {
            Mode::Manual => {
                let started = Instant::now();
                let mut report = CascadeReport::new();
                for (cell, text) in cells {
                    if self.disabled.contains_key(cell) {
                        continue;
                    }
                    self.evaluate_manual(cell, text, &mut report);
                }
                report.duration_ms = started.elapsed().as_millis() as u64;
                report
            }
            Mode::Reactive => {
                let mut report = CascadeReport::new();
                let mut roots = Vec::new();
                for (cell, text) in cells {
                    if self.disabled.contains_key(cell) {
                        continue;
                    }
                    self.register_inner(cell, text, &mut roots);
                }
                self.drain_rewires(&mut roots);
                self.cascade(&roots, &mut report);
                report
            }
        }
    }

    /// Register (or re-register) a cell and cascade from it.
    pub fn register_cell(&mut self, cell: &CellId, text: &str) -> CascadeReport {
        let mut report = CascadeReport::new();
        let mut roots = Vec::new();
        self.register_inner(cell, text, &mut roots);
        self.drain_rewires(&mut roots);
        self.cascade(&roots, &mut report);
        report
    }

    /// Re-register a cell with new source text.
    pub fn update_cell(&mut self, cell: &CellId, text: &str) -> CascadeReport {
        self.register_cell(cell, text)
    }

    /// Register a parameter cell, e.g. a slider publishing `name`.
    pub fn register_param(&mut self, cell: &CellId, name: &str, value: &str) -> CascadeReport {
        self.run_cell(cell, &format!("{} {} {}", name, ASSIGN_TOKEN, value))
    }

    /// Remove a cell from the graph without touching its dependents.
    /// Idempotent; releases every name the cell owns.
    pub fn unregister_cell(&mut self, cell: &CellId) {
        if let Some(node) = self.nodes.remove(cell) {
            for name in &node.defines {
                self.registry.release(name, cell);
            }
        }
        self.graph.remove_node(cell);
        self.pending_rewires.retain(|c| c != cell);
    }

    /// Delete a cell for good: its transitive downstream is marked
    /// stale and notified before the cell is unregistered. Dependents
    /// are not re-run; the break is surfaced, not repaired.
    pub fn delete_cell(&mut self, cell: &CellId) {
        let dependents = self.downstream_cells(cell);
        for dep in &dependents {
            if let Some(node) = self.nodes.get_mut(dep) {
                node.state = NodeState::Stale;
            }
            self.emit(NotebookEvent::BrokenDependency(BrokenDependencyEvent {
                cell: dep.clone(),
                deleted_upstream: cell.clone(),
            }));
        }
        self.unregister_cell(cell);
        self.disabled.remove(cell);
    }

    /// Take a cell out of reactive participation, keeping its source so
    /// it can be enabled again. Dependents are rewired and re-run so
    /// they see the cell's names as unowned.
    pub fn disable_cell(&mut self, cell: &CellId) -> CascadeReport {
        let mut report = CascadeReport::new();
        let Some(expression) = self.nodes.get(cell).map(|n| n.expression.clone()) else {
            return report;
        };
        let mut dependents: Vec<CellId> = self.graph.dependents(cell).cloned().collect();
        dependents.sort();

        self.unregister_cell(cell);
        self.disabled.insert(cell.clone(), expression);

        let mut roots = Vec::new();
        for dep in &dependents {
            if let Some(expr) = self.nodes.get(dep).map(|n| n.expression.clone()) {
                self.register_inner(dep, &expr, &mut roots);
            }
        }
        self.drain_rewires(&mut roots);
        self.cascade(&roots, &mut report);
        report
    }

    /// Re-register a previously disabled cell's stored source.
    pub fn enable_cell(&mut self, cell: &CellId) -> CascadeReport {
        match self.disabled.remove(cell) {
            Some(expression) => self.register_cell(cell, &expression),
            None => CascadeReport::new(),
        }
    }

    /// Cells this cell reads from, transitively, resolved through name
    /// ownership. Breadth-first, deduped, sorted within each level; the
    /// starting cell is excluded.
    pub fn upstream_cells(&self, cell: &CellId) -> Vec<CellId> {
        let mut visited: FxHashSet<CellId> = FxHashSet::default();
        visited.insert(cell.clone());
        let mut order = Vec::new();
        let mut frontier = vec![cell.clone()];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for current in &frontier {
                let Some(node) = self.nodes.get(current) else {
                    continue;
                };
                for name in &node.references {
                    if let Some(owner) = self.registry.owner_of(name) {
                        if visited.insert(owner.clone()) {
                            next.push(owner.clone());
                        }
                    }
                }
            }
            next.sort();
            order.extend(next.iter().cloned());
            frontier = next;
        }

        order
    }

    /// Cells that read from this cell, transitively, resolved through
    /// name ownership. Same ordering contract as [`upstream_cells`].
    ///
    /// [`upstream_cells`]: Notebook::upstream_cells
    pub fn downstream_cells(&self, cell: &CellId) -> Vec<CellId> {
        let mut visited: FxHashSet<CellId> = FxHashSet::default();
        visited.insert(cell.clone());
        let mut order = Vec::new();
        let mut frontier = vec![cell.clone()];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for current in &frontier {
                let Some(node) = self.nodes.get(current) else {
                    continue;
                };
                for name in &node.defines {
                    if self.registry.owner_of(name) != Some(current) {
                        continue;
                    }
                    for (id, other) in &self.nodes {
                        if other.active_inputs.iter().any(|a| a == name)
                            && visited.insert(id.clone())
                        {
                            next.push(id.clone());
                        }
                    }
                }
            }
            next.sort();
            order.extend(next.iter().cloned());
            frontier = next;
        }

        order
    }

    /// A JSON view of the whole graph for inspection and debugging.
    /// Nodes and edges come out sorted so snapshots are comparable.
    pub fn graph_snapshot(&self) -> serde_json::Value {
        let mut ids: Vec<&CellId> = self.nodes.keys().collect();
        ids.sort();

        let nodes: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                let node = &self.nodes[*id];
                json!({
                    "cell": id.as_str(),
                    "expression": node.expression,
                    "defines": node.defines,
                    "references": node.references,
                    "active_inputs": node.active_inputs,
                    "generation": node.generation,
                    "state": node.state,
                })
            })
            .collect();

        let mut edges = Vec::new();
        for id in &ids {
            let mut preds: Vec<&CellId> = self.graph.precedents(*id).collect();
            preds.sort();
            for pred in preds {
                edges.push(json!({ "from": pred.as_str(), "to": id.as_str() }));
            }
        }

        json!({ "mode": self.mode, "nodes": nodes, "edges": edges })
    }

    /// Wire one cell into registry and graph without evaluating it.
    ///
    /// Ownership transitions happen here: a changed define set releases
    /// the old names by unregistering first, new defines claim with
    /// last-writer-wins, and any name that just gained an owner triggers
    /// a late-binding scan over the other cells' stored source.
    fn register_inner(&mut self, cell: &CellId, text: &str, roots: &mut Vec<CellId>) {
        let mut known: Vec<String> = self.registry.names().map(|s| s.to_string()).collect();
        known.sort();
        let info = extract::extract(text, known.iter().map(|s| s.as_str()), self.evaluator.as_mut());

        for message in info.warnings.clone() {
            self.emit(NotebookEvent::ExtractionWarning(ExtractionWarningEvent {
                cell: cell.clone(),
                message,
            }));
        }

        let prior = self
            .nodes
            .get(cell)
            .map(|n| (n.defines.clone(), n.generation));
        let generation = match prior {
            Some((old_defines, old_generation)) if old_defines == info.defines => {
                old_generation + 1
            }
            Some(_) => {
                // Define set changed: release the old names before
                // claiming the new ones.
                self.unregister_cell(cell);
                0
            }
            None => 0,
        };

        let mut displaced = Vec::new();
        for name in &info.defines {
            if let Some(previous) = self.registry.claim(name, cell) {
                displaced.push((name.clone(), previous));
            }
        }
        for (name, previous_owner) in displaced {
            self.emit(NotebookEvent::DuplicateDefinition(DuplicateDefinitionEvent {
                name,
                new_owner: cell.clone(),
                previous_owner,
            }));
        }

        let mut active_inputs = Vec::new();
        let mut preds: FxHashSet<CellId> = FxHashSet::default();
        for name in &info.references {
            if let Some(owner) = self.registry.owner_of(name) {
                if owner != cell {
                    active_inputs.push(name.clone());
                    preds.insert(owner.clone());
                }
            }
        }
        self.graph.replace_edges(cell, preds);

        let mut node = CellNode::new(
            text.to_string(),
            info.defines.clone(),
            info.references.clone(),
            active_inputs,
        );
        node.generation = generation;
        self.nodes.insert(cell.clone(), node);

        if !info.defines.is_empty() {
            self.queue_late_bindings(cell, &info.defines);
        }

        if !roots.contains(cell) {
            roots.push(cell.clone());
        }
    }

    /// Find cells whose stored source mentions a just-claimed name but
    /// whose wiring predates the claim, and queue them for rewire.
    ///
    /// Stored `references` are not enough here: at the time those cells
    /// registered, the name had no owner and extraction never saw it.
    /// The check goes back to the source text. A failed introspection
    /// check skips that candidate for this pass, same as in extraction.
    fn queue_late_bindings(&mut self, cell: &CellId, names: &[String]) {
        let candidates: Vec<(CellId, String)> = self
            .nodes
            .iter()
            .filter(|(id, _)| *id != cell)
            .map(|(id, node)| (id.clone(), node.expression.clone()))
            .collect();

        let mut queued = Vec::new();
        for name in names {
            for (id, expression) in &candidates {
                let defines_it = self
                    .nodes
                    .get(id)
                    .is_some_and(|n| n.defines.iter().any(|d| d == name));
                // Bound already means: the name is an active input AND
                // the edge from this owner exists. Stored active inputs
                // alone can be stale, e.g. after the previous owner of
                // the name was deleted.
                let already_bound = self
                    .nodes
                    .get(id)
                    .is_some_and(|n| n.active_inputs.iter().any(|a| a == name))
                    && self.graph.precedents(id).any(|p| p == cell);
                if defines_it
                    || already_bound
                    || queued.contains(id)
                    || self.pending_rewires.contains(id)
                {
                    continue;
                }
                if matches!(
                    extract::expression_mentions(self.evaluator.as_mut(), expression, name),
                    Ok(true)
                ) {
                    queued.push(id.clone());
                }
            }
        }
        queued.sort();
        self.pending_rewires.extend(queued);
    }

    fn drain_rewires(&mut self, roots: &mut Vec<CellId>) {
        let mut budget = 10_000usize;
        while let Some(cell) = self.pending_rewires.pop() {
            budget = budget.saturating_sub(1);
            if budget == 0 {
                break;
            }
            let Some(expression) = self.nodes.get(&cell).map(|n| n.expression.clone()) else {
                continue;
            };
            self.register_inner(&cell, &expression, roots);
        }
    }

    /// Evaluate the downstream closure of `roots` in topological order.
    ///
    /// Cycle members (and their in-set downstream) reject with
    /// [`CellError::Cycle`] before anything evaluates; the acyclic rest
    /// still runs. All scheduled cells flip to pending first so the UI
    /// can show the whole affected set at once.
    fn cascade(&mut self, roots: &[CellId], report: &mut CascadeReport) {
        let started = Instant::now();

        let affected: FxHashSet<CellId> = self
            .graph
            .closure_downstream(roots)
            .into_iter()
            .filter(|c| self.nodes.contains_key(c))
            .collect();

        if affected.is_empty() {
            report.duration_ms = started.elapsed().as_millis() as u64;
            return;
        }

        let order = match self.graph.topo_order(&affected) {
            Ok(order) => order,
            Err(cycle) => {
                report.had_cycles = true;
                let error = CellError::Cycle(cycle.message.clone());
                for cell in &cycle.cells {
                    if let Some(node) = self.nodes.get_mut(cell) {
                        node.state = NodeState::Rejected(error.clone());
                    }
                    report.push_error(CascadeError::new(cell.clone(), error.clone()));
                    self.emit(NotebookEvent::CellRejected(CellRejectedEvent {
                        cell: cell.clone(),
                        error: error.clone(),
                    }));
                }
                let remaining: FxHashSet<CellId> = affected
                    .iter()
                    .filter(|c| !cycle.cells.contains(*c))
                    .cloned()
                    .collect();
                self.graph.topo_order(&remaining).unwrap_or_default()
            }
        };

        for cell in &order {
            if let Some(node) = self.nodes.get_mut(cell) {
                node.state = NodeState::Pending;
            }
            self.emit(NotebookEvent::CellPending(CellPendingEvent {
                cell: cell.clone(),
            }));
        }

        let mut depths: FxHashMap<CellId, usize> = FxHashMap::default();
        for cell in &order {
            let mut preds: Vec<CellId> = self.graph.precedents(cell).cloned().collect();
            preds.sort();

            let depth = preds
                .iter()
                .filter_map(|p| depths.get(p))
                .max()
                .map_or(0, |d| d + 1);
            depths.insert(cell.clone(), depth);
            report.max_depth = report.max_depth.max(depth);

            let failed_pred = preds
                .iter()
                .find(|p| self.nodes.get(*p).is_some_and(|n| n.state.is_rejected()))
                .cloned();
            if let Some(pred) = failed_pred {
                let error = CellError::Upstream(pred);
                if let Some(node) = self.nodes.get_mut(cell) {
                    node.state = NodeState::Rejected(error.clone());
                }
                report.push_error(CascadeError::new(cell.clone(), error.clone()));
                self.emit(NotebookEvent::CellRejected(CellRejectedEvent {
                    cell: cell.clone(),
                    error,
                }));
                continue;
            }

            self.evaluate_node(cell, report);
            report.cells_recomputed += 1;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
    }

    fn evaluate_node(&mut self, cell: &CellId, report: &mut CascadeReport) {
        let Some((expression, defined_name, generation)) = self
            .nodes
            .get(cell)
            .map(|n| (n.expression.clone(), n.defined_name.clone(), n.generation))
        else {
            return;
        };

        let result = self.evaluator.evaluate(&expression);

        // A re-registration since the snapshot supersedes this result.
        if self.nodes.get(cell).map(|n| n.generation) != Some(generation) {
            return;
        }

        match result {
            Ok(raw) => {
                self.renderer.render(cell, &raw);
                // Dependents see the defined name's value, not the raw
                // output of the whole expression.
                let value = match &defined_name {
                    Some(name) => self.evaluator.evaluate(name).unwrap_or(raw),
                    None => raw,
                };
                if let Some(node) = self.nodes.get_mut(cell) {
                    node.state = NodeState::Fulfilled(value.clone());
                }
                self.emit(NotebookEvent::CellFulfilled(CellFulfilledEvent {
                    cell: cell.clone(),
                    value,
                }));
            }
            Err(err) => {
                let error = CellError::Evaluation(err.message);
                if let Some(node) = self.nodes.get_mut(cell) {
                    node.state = NodeState::Rejected(error.clone());
                }
                report.push_error(CascadeError::new(cell.clone(), error.clone()));
                self.emit(NotebookEvent::CellRejected(CellRejectedEvent {
                    cell: cell.clone(),
                    error,
                }));
            }
        }
    }

    fn evaluate_manual(&mut self, cell: &CellId, text: &str, report: &mut CascadeReport) {
        self.emit(NotebookEvent::CellPending(CellPendingEvent {
            cell: cell.clone(),
        }));
        match self.evaluator.evaluate(text) {
            Ok(raw) => {
                self.renderer.render(cell, &raw);
                self.emit(NotebookEvent::CellFulfilled(CellFulfilledEvent {
                    cell: cell.clone(),
                    value: raw,
                }));
            }
            Err(err) => {
                let error = CellError::Evaluation(err.message);
                report.push_error(CascadeError::new(cell.clone(), error.clone()));
                self.emit(NotebookEvent::CellRejected(CellRejectedEvent {
                    cell: cell.clone(),
                    error,
                }));
            }
        }
        report.cells_recomputed += 1;
    }
}
