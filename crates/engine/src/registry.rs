//! Variable ownership registry.
//!
//! Maps each variable name to the single cell that currently defines it.
//! At most one owner per name at any instant; a second definer displaces
//! the first (last claim wins) and the displacement is reported to the
//! caller so it can be surfaced as a duplicate-definition warning rather
//! than resolved silently.

use rustc_hash::FxHashMap;

use crate::cell_id::CellId;

/// Name-to-owning-cell mapping. Created empty per notebook session.
#[derive(Debug, Default, Clone)]
pub struct OwnerRegistry {
    owners: FxHashMap<String, CellId>,
}

impl OwnerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `cell`. Last claim wins.
    ///
    /// Returns the displaced previous owner when the name was held by a
    /// *different* cell; re-claiming a name you already own is silent.
    pub fn claim(&mut self, name: &str, cell: &CellId) -> Option<CellId> {
        match self.owners.insert(name.to_string(), cell.clone()) {
            Some(prev) if prev != *cell => Some(prev),
            _ => None,
        }
    }

    /// Release `name`, but only if `cell` is the current owner.
    ///
    /// Idempotent; a stale release never clobbers a newer claim.
    /// Returns true if the mapping was removed.
    pub fn release(&mut self, name: &str, cell: &CellId) -> bool {
        match self.owners.get(name) {
            Some(owner) if owner == cell => {
                self.owners.remove(name);
                true
            }
            _ => false,
        }
    }

    pub fn owner_of(&self, name: &str) -> Option<&CellId> {
        self.owners.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.owners.contains_key(name)
    }

    /// All currently owned names, in map order (callers sort when they
    /// need determinism).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }
}
