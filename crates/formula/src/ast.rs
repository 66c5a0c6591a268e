//! Immutable AST produced by the parser (§4.4).
//!
//! Mirrors the source shape of `Terminal(kind)` / `Op(kind, lhs, rhs?)`: a
//! terminal node carries no children, an operator node carries one or two.
//! Ternary is represented as `Op(Ternary, cond, Op(Alternative, then, else))`
//! exactly as specified, rather than as a three-child node, so a single
//! `Op` shape covers every non-terminal.

#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    CurrentAttribute(String),
    InProcessAttribute(String),
    Number(f64),
    Ident(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Neg,
    Pos,
    Not,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Ternary,
    Alternative,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Terminal(Terminal),
    Op {
        kind: OpKind,
        lhs: Box<Node>,
        rhs: Option<Box<Node>>,
    },
}

impl Node {
    pub fn terminal(t: Terminal) -> Self {
        Node::Terminal(t)
    }

    pub fn unary(kind: OpKind, operand: Node) -> Self {
        Node::Op {
            kind,
            lhs: Box::new(operand),
            rhs: None,
        }
    }

    pub fn binary(kind: OpKind, lhs: Node, rhs: Node) -> Self {
        Node::Op {
            kind,
            lhs: Box::new(lhs),
            rhs: Some(Box::new(rhs)),
        }
    }

    pub fn ternary(cond: Node, then: Node, alt: Node) -> Self {
        let alternative = Node::binary(OpKind::Alternative, then, alt);
        Node::binary(OpKind::Ternary, cond, alternative)
    }
}
