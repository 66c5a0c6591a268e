//! Evaluator: walks the AST against a `DeviceAnalog`-shaped context (§4.4).
//!
//! NaN handling is deliberate and asymmetric, reproduced exactly per
//! SPEC_FULL §4.4 / §9:
//! - `==`/`!=` use native IEEE 754 semantics (`NaN == x` is already `false`
//!   for every `x`, including `NaN` itself; no override needed).
//! - `&&`/`||` treat NaN as falsy (`truthy(NaN) == false`), which alone
//!   reproduces `NaN && _ -> false`, `NaN || NaN -> false`, and
//!   `NaN || x -> true` iff `x != 0`.
//! - `< <= > >=` use a NaN-aware comparator where a NaN left-hand operand
//!   sorts below everything and a NaN right-hand operand (with a non-NaN
//!   left-hand operand) sorts above everything. This reproduces
//!   `NaN > 42 == false` and `42 > NaN == true` from a single rule rather
//!   than special-casing each operator.

use std::cmp::Ordering;

use crate::ast::{Node, OpKind, Terminal};

/// An attribute's last-known value, as seen by the formula evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Number(f64),
    Boolean(bool),
    String(String),
}

impl AttributeValue {
    /// Coerces to the evaluator's internal numeric representation.
    /// Non-numeric strings yield NaN, matching "missing attributes yield
    /// NaN" (§4.4) for values that cannot be interpreted as numbers either.
    pub fn as_f64(&self) -> f64 {
        match self {
            AttributeValue::Number(n) => *n,
            AttributeValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            AttributeValue::String(s) => s.parse().unwrap_or(f64::NAN),
        }
    }

    pub fn as_display_string(&self) -> String {
        match self {
            AttributeValue::Number(n) => n.to_string(),
            AttributeValue::Boolean(b) => b.to_string(),
            AttributeValue::String(s) => s.clone(),
        }
    }
}

/// Context supplying current and in-process attribute values. Implemented
/// by the virtual-device core against its `DeviceAnalog`.
pub trait AttributeContext {
    fn current_attribute(&self, name: &str) -> Option<AttributeValue>;
    fn in_process_attribute(&self, name: &str) -> Option<AttributeValue>;
}

fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

/// Comparator used only by the relational operators; NaN sorts low on the
/// left and high on the right, per the module doc comment above.
fn nan_aware_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Evaluates `node` against `ctx`, logging (not raising) on missing
/// attributes. Returns `f64`; booleans are represented as 1.0/0.0.
pub fn eval(node: &Node, ctx: &dyn AttributeContext) -> f64 {
    match node {
        Node::Terminal(terminal) => eval_terminal(terminal, ctx),
        Node::Op { kind, lhs, rhs } => eval_op(*kind, lhs, rhs.as_deref(), ctx),
    }
}

/// The *Formula-to-String* variant: if the root is a single terminal of
/// attribute type, returns the resolved string value directly instead of
/// going through numeric coercion; otherwise falls back to the numeric
/// result rendered as a string.
pub fn eval_to_string(node: &Node, ctx: &dyn AttributeContext) -> String {
    match node {
        Node::Terminal(Terminal::CurrentAttribute(name)) => ctx
            .current_attribute(name)
            .map(|v| v.as_display_string())
            .unwrap_or_else(|| {
                tracing::debug!(attribute = %name, "formula: missing current attribute");
                f64::NAN.to_string()
            }),
        Node::Terminal(Terminal::InProcessAttribute(name)) => ctx
            .in_process_attribute(name)
            .map(|v| v.as_display_string())
            .unwrap_or_else(|| {
                tracing::debug!(attribute = %name, "formula: missing in-process attribute");
                f64::NAN.to_string()
            }),
        other => eval(other, ctx).to_string(),
    }
}

fn eval_terminal(terminal: &Terminal, ctx: &dyn AttributeContext) -> f64 {
    match terminal {
        Terminal::Number(n) => *n,
        Terminal::CurrentAttribute(name) => match ctx.current_attribute(name) {
            Some(v) => v.as_f64(),
            None => {
                tracing::debug!(attribute = %name, "formula: missing current attribute");
                f64::NAN
            }
        },
        Terminal::InProcessAttribute(name) => match ctx.in_process_attribute(name) {
            Some(v) => v.as_f64(),
            None => {
                tracing::debug!(attribute = %name, "formula: missing in-process attribute");
                f64::NAN
            }
        },
        Terminal::Ident(name) => {
            tracing::debug!(ident = %name, "formula: bare identifier has no binding, yielding NaN");
            f64::NAN
        }
    }
}

fn eval_op(kind: OpKind, lhs: &Node, rhs: Option<&Node>, ctx: &dyn AttributeContext) -> f64 {
    match kind {
        OpKind::Pos => eval(lhs, ctx),
        OpKind::Neg => -eval(lhs, ctx),
        OpKind::Not => {
            if truthy(eval(lhs, ctx)) {
                0.0
            } else {
                1.0
            }
        }
        OpKind::Mul => eval(lhs, ctx) * eval(rhs.unwrap(), ctx),
        OpKind::Div => eval(lhs, ctx) / eval(rhs.unwrap(), ctx),
        OpKind::Mod => eval(lhs, ctx) % eval(rhs.unwrap(), ctx),
        OpKind::Add => eval(lhs, ctx) + eval(rhs.unwrap(), ctx),
        OpKind::Sub => eval(lhs, ctx) - eval(rhs.unwrap(), ctx),
        OpKind::Lt => bool_to_f64(nan_aware_cmp(eval(lhs, ctx), eval(rhs.unwrap(), ctx)) == Ordering::Less),
        OpKind::Le => bool_to_f64(nan_aware_cmp(eval(lhs, ctx), eval(rhs.unwrap(), ctx)) != Ordering::Greater),
        OpKind::Gt => bool_to_f64(nan_aware_cmp(eval(lhs, ctx), eval(rhs.unwrap(), ctx)) == Ordering::Greater),
        OpKind::Ge => bool_to_f64(nan_aware_cmp(eval(lhs, ctx), eval(rhs.unwrap(), ctx)) != Ordering::Less),
        OpKind::Eq => bool_to_f64(eval(lhs, ctx) == eval(rhs.unwrap(), ctx)),
        OpKind::Ne => bool_to_f64(eval(lhs, ctx) != eval(rhs.unwrap(), ctx)),
        OpKind::And => bool_to_f64(truthy(eval(lhs, ctx)) && truthy(eval(rhs.unwrap(), ctx))),
        OpKind::Or => bool_to_f64(truthy(eval(lhs, ctx)) || truthy(eval(rhs.unwrap(), ctx))),
        OpKind::Ternary => {
            let cond = eval(lhs, ctx);
            let alternative = rhs.unwrap();
            match alternative {
                Node::Op {
                    kind: OpKind::Alternative,
                    lhs: then_branch,
                    rhs: else_branch,
                } => {
                    if truthy(cond) {
                        eval(then_branch, ctx)
                    } else {
                        eval(else_branch.as_ref().unwrap(), ctx)
                    }
                }
                _ => unreachable!("Ternary op's rhs is always an Alternative node"),
            }
        }
        OpKind::Alternative => unreachable!("Alternative is only ever reached via Ternary"),
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tokenizer::tokenize;
    use std::collections::HashMap;

    struct MapContext {
        current: HashMap<String, AttributeValue>,
        in_process: HashMap<String, AttributeValue>,
    }

    impl AttributeContext for MapContext {
        fn current_attribute(&self, name: &str) -> Option<AttributeValue> {
            self.current.get(name).cloned()
        }

        fn in_process_attribute(&self, name: &str) -> Option<AttributeValue> {
            self.in_process.get(name).cloned()
        }
    }

    fn eval_str(s: &str, current: &[(&str, f64)]) -> f64 {
        let node = parse(&tokenize(s).unwrap()).unwrap();
        let ctx = MapContext {
            current: current
                .iter()
                .map(|(k, v)| (k.to_string(), AttributeValue::Number(*v)))
                .collect(),
            in_process: HashMap::new(),
        };
        eval(&node, &ctx)
    }

    #[test]
    fn basic_arithmetic() {
        assert_eq!(eval_str("1 + 2 * 3", &[]), 7.0);
        assert_eq!(eval_str("(1 + 2) * 3", &[]), 9.0);
        assert_eq!(eval_str("7 % 3", &[]), 1.0);
    }

    #[test]
    fn attribute_lookup() {
        assert_eq!(eval_str("$(celsius) * 9 / 5 + 32", &[("celsius", 100.0)]), 212.0);
    }

    #[test]
    fn missing_attribute_is_nan() {
        assert!(eval_str("$(missing)", &[]).is_nan());
    }

    #[test]
    fn ternary_selects_branch() {
        assert_eq!(eval_str("$(a) > 0 ? 1 : -1", &[("a", 5.0)]), 1.0);
        assert_eq!(eval_str("$(a) > 0 ? 1 : -1", &[("a", -5.0)]), -1.0);
    }

    #[test]
    fn nan_table_logical_or() {
        assert_eq!(eval_str("$(x) || $(y)", &[]), 0.0); // NaN || NaN -> false
        assert_eq!(eval_str("$(x) || 5", &[]), 1.0); // NaN || x(!=0) -> true
        assert_eq!(eval_str("$(x) || 0", &[]), 0.0); // NaN || x(==0) -> false
    }

    #[test]
    fn nan_table_logical_and() {
        assert_eq!(eval_str("$(x) && 5", &[]), 0.0);
    }

    #[test]
    fn nan_table_equality() {
        assert_eq!(eval_str("$(x) == $(x)", &[]), 0.0); // NaN == NaN -> false
        assert_eq!(eval_str("$(x) == 5", &[]), 0.0);
    }

    #[test]
    fn nan_table_ordering_is_asymmetric() {
        assert_eq!(eval_str("$(x) > 42", &[]), 0.0); // NaN > 42 -> false
        assert_eq!(eval_str("42 > $(x)", &[]), 1.0); // 42 > NaN -> true
    }
}
