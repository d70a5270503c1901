//! Test fixtures: a scriptable stand-in for the CAS evaluator, a
//! recording renderer, and a fully wired notebook.
//!
//! `ScriptEvaluator` speaks just enough of the expression language for
//! the engine tests: `;`-separated statements, `:=` assignment, the
//! arithmetic operators with `^` binding right, and symbolic
//! passthrough for anything it cannot reduce to a number. Two knobs
//! inject failures: `poison` makes matching expressions error out, and
//! `fail_has_symbol` breaks the introspection check for chosen names.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::CellId;
use crate::engine::Notebook;
use crate::evaluator::{EvalError, Evaluator, Renderer};
use crate::events::EventCollector;
use crate::recalc::CascadeReport;

#[derive(Default)]
pub struct ScriptEvaluator {
    vars: FxHashMap<String, String>,
    /// Names whose `has_symbol` check errors out.
    pub fail_has_symbol: FxHashSet<String>,
    /// Any expression containing this substring fails to evaluate.
    pub poison: Option<String>,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| s.as_str())
    }

    fn eval_statement(&mut self, stmt: &str) -> Result<String, EvalError> {
        if let Some(idx) = stmt.find(":=") {
            let left = stmt[..idx].trim();
            let name = match left.find('(') {
                Some(p) if p > 0 => left[..p].trim(),
                _ => left,
            };
            let value = self.eval_expr(stmt[idx + 2..].trim());
            self.vars.insert(name.to_string(), value.clone());
            Ok(value)
        } else {
            Ok(self.eval_expr(stmt))
        }
    }

    fn eval_expr(&self, text: &str) -> String {
        match Parser::new(text, &self.vars).parse() {
            Some(value) => format_number(value),
            // Not numeric: substitute known values and stay symbolic.
            None => self.substitute(text),
        }
    }

    fn substitute(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_ascii_alphabetic() || c == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                match self.vars.get(&ident) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&ident),
                }
            } else {
                if !c.is_whitespace() {
                    out.push(c);
                }
                i += 1;
            }
        }
        out
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&mut self, text: &str) -> Result<String, EvalError> {
        if let Some(poison) = &self.poison {
            if text.contains(poison.as_str()) {
                return Err(EvalError::new(format!("cannot evaluate `{}`", poison)));
            }
        }
        let mut last = String::new();
        for stmt in text.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            last = self.eval_statement(stmt)?;
        }
        Ok(last)
    }

    fn has_symbol(&mut self, text: &str, symbol: &str) -> Result<bool, EvalError> {
        if self.fail_has_symbol.contains(symbol) {
            return Err(EvalError::new(format!("has({}) unavailable", symbol)));
        }
        Ok(mentions_identifier(text, symbol))
    }
}

/// Whole-identifier match; `abc` does not mention `a`.
fn mentions_identifier(text: &str, symbol: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            if chars[start..i].iter().collect::<String>() == symbol {
                return true;
            }
        } else {
            i += 1;
        }
    }
    false
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Recursive-descent arithmetic over f64. Identifiers resolve through
/// the variable map; anything unresolvable fails the whole parse and
/// the caller falls back to symbolic substitution.
struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    vars: &'a FxHashMap<String, String>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, vars: &'a FxHashMap<String, String>) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            vars,
        }
    }

    fn parse(mut self) -> Option<f64> {
        let value = self.expr()?;
        self.skip_ws();
        if self.pos == self.bytes.len() {
            Some(value)
        } else {
            None
        }
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Some(value),
            }
        }
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return None;
                    }
                    value /= divisor;
                }
                _ => return Some(value),
            }
        }
    }

    // `^` binds right: 2^3^2 is 2^(3^2).
    fn factor(&mut self) -> Option<f64> {
        let base = self.unary()?;
        self.skip_ws();
        if self.peek() == Some(b'^') {
            self.pos += 1;
            let exponent = self.factor()?;
            Some(base.powf(exponent))
        } else {
            Some(base)
        }
    }

    fn unary(&mut self) -> Option<f64> {
        self.skip_ws();
        if self.peek() == Some(b'-') {
            self.pos += 1;
            Some(-self.unary()?)
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Option<f64> {
        self.skip_ws();
        match self.peek()? {
            b'(' => {
                self.pos += 1;
                let value = self.expr()?;
                self.skip_ws();
                if self.peek() == Some(b')') {
                    self.pos += 1;
                    Some(value)
                } else {
                    None
                }
            }
            c if c.is_ascii_digit() || c == b'.' => self.number(),
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
                {
                    self.pos += 1;
                }
                let ident = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
                let stored = self.vars.get(ident)?;
                Parser::new(stored, self.vars).parse()
            }
            _ => None,
        }
    }

    fn number(&mut self) -> Option<f64> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == b'.')
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }
}

/// Clonable handle letting tests reach the evaluator's knobs while the
/// notebook owns a boxed copy of the same instance.
#[derive(Clone, Default)]
pub struct SharedEvaluator(pub Rc<RefCell<ScriptEvaluator>>);

impl Evaluator for SharedEvaluator {
    fn evaluate(&mut self, text: &str) -> Result<String, EvalError> {
        self.0.borrow_mut().evaluate(text)
    }

    fn has_symbol(&mut self, text: &str, symbol: &str) -> Result<bool, EvalError> {
        self.0.borrow_mut().has_symbol(text, symbol)
    }
}

/// Renderer that records every `(cell, raw)` pair it is handed.
#[derive(Clone, Default)]
pub struct RecordingRenderer(pub Rc<RefCell<Vec<(CellId, String)>>>);

impl Renderer for RecordingRenderer {
    fn render(&mut self, cell: &CellId, raw: &str) {
        self.0.borrow_mut().push((cell.clone(), raw.to_string()));
    }
}

/// A notebook wired to a shared evaluator, a recording renderer, and an
/// event collector.
pub struct NotebookHarness {
    pub notebook: Notebook,
    pub evaluator: Rc<RefCell<ScriptEvaluator>>,
    pub rendered: Rc<RefCell<Vec<(CellId, String)>>>,
    pub events: Rc<RefCell<EventCollector>>,
}

impl NotebookHarness {
    pub fn new() -> Self {
        let evaluator = Rc::new(RefCell::new(ScriptEvaluator::new()));
        let rendered = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(RefCell::new(EventCollector::new()));

        let mut notebook = Notebook::new(
            Box::new(SharedEvaluator(evaluator.clone())),
            Box::new(RecordingRenderer(rendered.clone())),
        );
        let sink = events.clone();
        notebook.set_event_callback(Box::new(move |event| sink.borrow_mut().push(event)));

        Self {
            notebook,
            evaluator,
            rendered,
            events,
        }
    }

    pub fn run(&mut self, id: &str, text: &str) -> CascadeReport {
        self.notebook.run_cell(&CellId::new(id), text)
    }

    pub fn value(&self, id: &str) -> Option<String> {
        self.notebook
            .node(&CellId::new(id))
            .and_then(|n| n.published_value().map(|v| v.to_string()))
    }

    pub fn state(&self, id: &str) -> Option<crate::cell::NodeState> {
        self.notebook.node(&CellId::new(id)).map(|n| n.state.clone())
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let mut eval = ScriptEvaluator::new();
        assert_eq!(eval.evaluate("2 + 3 * 4").unwrap(), "14");
        assert_eq!(eval.evaluate("(2 + 3) * 4").unwrap(), "20");
        assert_eq!(eval.evaluate("2^3^2").unwrap(), "512");
        assert_eq!(eval.evaluate("-2 + 5").unwrap(), "3");
    }

    #[test]
    fn test_assignment_and_lookup() {
        let mut eval = ScriptEvaluator::new();
        assert_eq!(eval.evaluate("p := 5").unwrap(), "5");
        assert_eq!(eval.evaluate("p^2").unwrap(), "25");
        assert_eq!(eval.evaluate("q := p + 3; q * 2").unwrap(), "16");
    }

    #[test]
    fn test_symbolic_passthrough() {
        let mut eval = ScriptEvaluator::new();
        eval.evaluate("p := 5").unwrap();
        assert_eq!(eval.evaluate("p + z").unwrap(), "5+z");
        assert_eq!(eval.evaluate("w").unwrap(), "w");
    }

    #[test]
    fn test_poison() {
        let mut eval = ScriptEvaluator::new();
        eval.poison = Some("boom".to_string());
        assert!(eval.evaluate("x := boom").is_err());
        assert!(eval.evaluate("x := 1").is_ok());
    }

    #[test]
    fn test_has_symbol_whole_identifiers() {
        let mut eval = ScriptEvaluator::new();
        assert!(eval.has_symbol("p^2 + 1", "p").unwrap());
        assert!(!eval.has_symbol("abc + 1", "a").unwrap());
        assert!(!eval.has_symbol("q + 1", "p").unwrap());
    }

    #[test]
    fn test_division_by_zero_stays_symbolic() {
        let mut eval = ScriptEvaluator::new();
        assert_eq!(eval.evaluate("1/0").unwrap(), "1/0");
    }
}
