//! Boundary contracts for the external evaluator and renderer.
//!
//! The engine never parses or evaluates the expression language itself.
//! Evaluation is a black box behind [`Evaluator`]; turning a raw result
//! into visible output is a black box behind [`Renderer`]. Both are
//! supplied by the surrounding application (in the browser notebook this
//! is the Giac/WASM kernel and the output-area pipeline).

use crate::cell_id::CellId;

/// Error returned by the external evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EvalError {}

impl From<String> for EvalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// The expression evaluator consumed by the engine.
///
/// `evaluate` runs a (possibly multi-statement) expression and returns
/// its raw textual result; assignments mutate the evaluator's own
/// variable state as a side effect.
///
/// `has_symbol` is the symbolic introspection predicate used for
/// dependency extraction: does `text` use `symbol` as a free variable?
/// Callers are expected to pass text with `:=` already rewritten to a
/// non-assigning equality, one statement at a time (see
/// [`crate::extract::expression_mentions`]).
pub trait Evaluator {
    fn evaluate(&mut self, text: &str) -> Result<String, EvalError>;

    fn has_symbol(&mut self, text: &str, symbol: &str) -> Result<bool, EvalError>;
}

/// The output renderer consumed by the evaluation callback.
///
/// Format detection and drawing live entirely on the other side of this
/// trait; rendering failures are the renderer's to display and must not
/// propagate back into the graph.
pub trait Renderer {
    fn render(&mut self, cell: &CellId, raw: &str);
}
