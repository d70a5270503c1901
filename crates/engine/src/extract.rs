//! Dependency extraction from cell expression text.
//!
//! Determines which variable names an expression defines (via `:=`) and
//! which registered names it references. Definitions are found by plain
//! statement parsing; references go through the evaluator's own symbolic
//! introspection so that a variable named `a` is never confused with the
//! `a` inside a longer identifier.

use serde::{Deserialize, Serialize};

use crate::evaluator::{EvalError, Evaluator};

/// Statement separator in multi-statement expressions.
pub const STATEMENT_SEPARATOR: char = ';';

/// Assignment token of the expression language.
pub const ASSIGN_TOKEN: &str = ":=";

/// Names defined and referenced by one expression.
///
/// Pure function of the expression text and the set of known names it
/// was computed against; recomputed on every registration, never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// Names assigned via `:=`, in order of first appearance, deduped.
    pub defines: Vec<String>,
    /// Known names the expression uses as free variables.
    pub references: Vec<String>,
    /// Soft diagnostics from failed per-name introspection checks.
    /// A failed check excludes that one name for this pass only.
    pub warnings: Vec<String>,
}

/// Extract `{defines, references}` from `text`.
///
/// `known_names` is the ownership registry's current name set: reference
/// detection is scoped to names some cell actually defines, so builtins
/// and free symbolic variables are naturally excluded. Names defined by
/// this same expression are not reported as references.
pub fn extract<'a>(
    text: &str,
    known_names: impl IntoIterator<Item = &'a str>,
    evaluator: &mut dyn Evaluator,
) -> DependencyInfo {
    let mut info = DependencyInfo::default();
    if text.trim().is_empty() {
        return info;
    }

    for stmt in text.split(STATEMENT_SEPARATOR) {
        let stmt = stmt.trim();
        if let Some(idx) = stmt.find(ASSIGN_TOKEN) {
            if idx == 0 {
                continue;
            }
            let left = stmt[..idx].trim();
            // Strip call arguments: f(x,y) := ... defines f.
            let name = match left.find('(') {
                Some(p) if p > 0 => left[..p].trim(),
                _ => left,
            };
            if !name.is_empty() && !info.defines.iter().any(|d| d == name) {
                info.defines.push(name.to_string());
            }
        }
    }

    for name in known_names {
        if info.defines.iter().any(|d| d == name) {
            continue;
        }
        if info.references.iter().any(|r| r == name) {
            continue;
        }
        match expression_mentions(evaluator, text, name) {
            Ok(true) => info.references.push(name.to_string()),
            Ok(false) => {}
            Err(err) => info.warnings.push(format!("has({}): {}", name, err)),
        }
    }

    info
}

/// Ask the evaluator whether `text` uses `symbol` as a free variable.
///
/// `:=` is rewritten to `==` first so the check cannot trigger
/// assignment side effects inside the evaluator, and multi-statement
/// text is checked statement-by-statement because the introspection
/// predicate does not span statement separators.
pub fn expression_mentions(
    evaluator: &mut dyn Evaluator,
    text: &str,
    symbol: &str,
) -> Result<bool, EvalError> {
    let safe = text.replace(ASSIGN_TOKEN, "==");
    for stmt in safe.split(STATEMENT_SEPARATOR) {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        if evaluator.has_symbol(stmt, symbol)? {
            return Ok(true);
        }
    }
    Ok(false)
}
