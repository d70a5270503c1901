//! Per-cell graph node records.

use serde::Serialize;

use crate::recalc::CellError;

/// Evaluation lifecycle of a registered cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub enum NodeState {
    /// Registered but not yet scheduled in any cascade.
    #[default]
    Idle,
    /// Scheduled in a cascade; result not yet in.
    Pending,
    /// Last evaluation succeeded; holds the published value.
    Fulfilled(String),
    /// Last evaluation failed (own error, upstream error, or cycle).
    Rejected(CellError),
    /// An upstream definer was deleted out from under this cell.
    /// The cell stays registered; its next run fails through ordinary
    /// evaluation against the now-missing name.
    Stale,
}

impl NodeState {
    pub fn is_pending(&self) -> bool {
        matches!(self, NodeState::Pending)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, NodeState::Rejected(_))
    }
}

/// One registered cell in the dependency graph store.
#[derive(Debug, Clone)]
pub struct CellNode {
    /// The expression text this node was registered with.
    pub expression: String,

    /// Names this cell assigns via `:=`, in first-appearance order.
    pub defines: Vec<String>,

    /// Known names the expression reads, as extracted at registration.
    pub references: Vec<String>,

    /// The subset of `references` that had an owner at registration
    /// time; these are the actual graph edges. Free symbolic names are
    /// never active inputs.
    pub active_inputs: Vec<String>,

    /// The name this node publishes for dependents: the *first* entry of
    /// `defines`, if any. A cell may define several names (all of them
    /// claim ownership), but only the first is wired as a reactive
    /// output.
    pub defined_name: Option<String>,

    /// Bumped on every re-registration. A cascade result is applied only
    /// if the node's generation still matches the one captured when its
    /// evaluation began, so a superseded evaluation is discarded instead
    /// of overwriting newer output.
    pub generation: u64,

    pub state: NodeState,
}

impl CellNode {
    pub fn new(
        expression: String,
        defines: Vec<String>,
        references: Vec<String>,
        active_inputs: Vec<String>,
    ) -> Self {
        let defined_name = defines.first().cloned();
        Self {
            expression,
            defines,
            references,
            active_inputs,
            defined_name,
            generation: 0,
            state: NodeState::Idle,
        }
    }

    /// The value dependents see, if the last evaluation succeeded.
    pub fn published_value(&self) -> Option<&str> {
        match &self.state {
            NodeState::Fulfilled(value) => Some(value),
            _ => None,
        }
    }
}
