//! Event types for notebook change notifications.
//!
//! The engine reports everything the presentation layer needs through a
//! single synchronous callback: ownership collisions, broken links,
//! extraction diagnostics, and the pending/fulfilled/rejected lifecycle
//! of every node. Tests verify notification invariants through the
//! `EventCollector`.

use serde::{Deserialize, Serialize};

use crate::cell_id::CellId;
use crate::recalc::CellError;

/// Events emitted by the notebook engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotebookEvent {
    /// A second cell claimed a name that already had an owner.
    /// Last claim wins; the collision is surfaced, not resolved.
    DuplicateDefinition(DuplicateDefinitionEvent),

    /// A cell defining a name was deleted while this cell still
    /// references it.
    BrokenDependency(BrokenDependencyEvent),

    /// A per-name introspection check failed during extraction.
    /// Non-fatal; that name was excluded for this pass.
    ExtractionWarning(ExtractionWarningEvent),

    /// The cell is scheduled in a cascade and awaiting its result.
    CellPending(CellPendingEvent),

    /// The cell's evaluation resolved. Rendering already happened inside
    /// the evaluation callback; this clears the pending/error visuals.
    CellFulfilled(CellFulfilledEvent),

    /// The cell's evaluation rejected (own error, upstream, or cycle).
    CellRejected(CellRejectedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDefinitionEvent {
    pub name: String,
    pub new_owner: CellId,
    pub previous_owner: CellId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokenDependencyEvent {
    pub cell: CellId,
    pub deleted_upstream: CellId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionWarningEvent {
    pub cell: CellId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellPendingEvent {
    pub cell: CellId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellFulfilledEvent {
    pub cell: CellId,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRejectedEvent {
    pub cell: CellId,
    pub error: CellError,
}

/// Callback type for receiving notebook events.
///
/// Events are delivered synchronously on the calling thread; the engine
/// is single-threaded by contract (one UI event loop).
pub type EventCallback = Box<dyn FnMut(NotebookEvent)>;

/// Simple event collector for testing.
#[derive(Default)]
pub struct EventCollector {
    events: Vec<NotebookEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: NotebookEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[NotebookEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Filter to only DuplicateDefinition events.
    pub fn duplicate_definitions(&self) -> Vec<&DuplicateDefinitionEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NotebookEvent::DuplicateDefinition(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Filter to only BrokenDependency events.
    pub fn broken_dependencies(&self) -> Vec<&BrokenDependencyEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NotebookEvent::BrokenDependency(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Filter to only ExtractionWarning events.
    pub fn extraction_warnings(&self) -> Vec<&ExtractionWarningEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NotebookEvent::ExtractionWarning(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    /// Filter to only CellPending events.
    pub fn pending(&self) -> Vec<&CellPendingEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NotebookEvent::CellPending(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Filter to only CellFulfilled events.
    pub fn fulfilled(&self) -> Vec<&CellFulfilledEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NotebookEvent::CellFulfilled(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Filter to only CellRejected events.
    pub fn rejected(&self) -> Vec<&CellRejectedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NotebookEvent::CellRejected(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}
