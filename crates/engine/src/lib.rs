pub mod cell;
pub mod cell_id;
pub mod dep_graph;
pub mod engine;
pub mod evaluator;
pub mod events;
pub mod extract;
pub mod recalc;
pub mod registry;

#[cfg(test)]
pub mod harness;
