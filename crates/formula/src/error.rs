//! Formula engine error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormulaError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unterminated attribute reference at offset {0}")]
    UnterminatedAttributeRef(usize),

    #[error("expected '{expected}', found '{found}' at offset {offset}")]
    Expected {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    #[error("trailing tokens after a complete expression")]
    TrailingTokens,
}
