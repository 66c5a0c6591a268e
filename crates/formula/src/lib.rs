//! # Formula Engine
//!
//! Tokenizer, recursive-descent parser, and evaluator for the small
//! arithmetic/logical expression language used by conditional and
//! computed-metric policy functions (SPEC_FULL §4.4).

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod tokenizer;

pub use error::{FormulaError, Result};
pub use evaluator::{eval, eval_to_string, AttributeContext, AttributeValue};

use ast::{Node, Terminal};

fn collect_current_attributes(node: &Node, out: &mut Vec<String>) {
    match node {
        Node::Terminal(Terminal::CurrentAttribute(name)) => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        Node::Terminal(_) => {}
        Node::Op { lhs, rhs, .. } => {
            collect_current_attributes(lhs, out);
            if let Some(rhs) = rhs {
                collect_current_attributes(rhs, out);
            }
        }
    }
}

/// A parsed formula with its AST cached, so pipeline functions that hold a
/// formula across many `apply`/`get` calls (`filterCondition`,
/// `computedMetric`, ...) tokenize and parse exactly once.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    ast: Node,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenizer::tokenize(source)?;
        let ast = parser::parse(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, ctx: &dyn AttributeContext) -> f64 {
        eval(&self.ast, ctx)
    }

    /// Names of every `$(name)` current-attribute reference in the
    /// formula, deduplicated in first-seen order. Used by the virtual
    /// device core to build the computed-metric trigger map (§4.8).
    pub fn referenced_attributes(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_current_attributes(&self.ast, &mut names);
        names
    }

    pub fn eval_to_string(&self, ctx: &dyn AttributeContext) -> String {
        eval_to_string(&self.ast, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyContext;

    impl AttributeContext for EmptyContext {
        fn current_attribute(&self, _name: &str) -> Option<AttributeValue> {
            None
        }
        fn in_process_attribute(&self, _name: &str) -> Option<AttributeValue> {
            None
        }
    }

    #[test]
    fn formula_caches_parse_and_evaluates() {
        let formula = Formula::parse("1 + 2").unwrap();
        assert_eq!(formula.eval(&EmptyContext), 3.0);
        assert_eq!(formula.source(), "1 + 2");
    }

    #[test]
    fn rejects_malformed_formula_at_parse_time() {
        assert!(Formula::parse("1 +").is_err());
    }

    #[test]
    fn referenced_attributes_collects_current_attributes_deduplicated() {
        let formula = Formula::parse("$(celsius) * 9 / 5 + 32 + $(celsius)").unwrap();
        assert_eq!(formula.referenced_attributes(), vec!["celsius".to_string()]);
    }
}
