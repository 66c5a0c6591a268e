//! Policy engine error types (§7): device model/policy parsing, pipeline
//! configuration, and change-processing failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PolicyError>;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("policy not found: {0}")]
    NotFound(String),

    #[error("pipeline configuration inconsistent: {0}")]
    PipelineConfiguration(String),

    #[error("formula error: {0}")]
    Formula(#[from] edgepolicy_formula::FormulaError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<PolicyError> for edgepolicy_core::Error {
    fn from(err: PolicyError) -> Self {
        edgepolicy_core::Error::Policy(err.to_string())
    }
}
