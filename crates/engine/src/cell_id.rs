//! Cell identity for the notebook graph.
//!
//! A `CellId` uniquely identifies a notebook cell for the lifetime of a
//! session. Ids are assigned by the external cell list (e.g. `"c1"`,
//! `"c2"`) and treated as opaque strings here.

use serde::{Deserialize, Serialize};

/// Unique identifier for a notebook cell.
///
/// Used as the node key in the dependency graph and as the addressing
/// key for the external renderer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    /// Create a new CellId.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
