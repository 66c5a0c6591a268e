//! Virtual device and persistence store error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("attribute {attribute} expects type {expected:?}, got a value of a different type")]
    TypeMismatch { attribute: String, expected: edgepolicy_core::types::ValueType },

    #[error("attribute {attribute} value {value} is out of range [{lower:?}, {upper:?}]")]
    OutOfRange {
        attribute: String,
        value: f64,
        lower: Option<f64>,
        upper: Option<f64>,
    },

    #[error("unknown format: {0}")]
    UnknownFormat(String),

    #[error("format {0} is not an alert format")]
    NotAnAlertFormat(String),

    #[error("message parse error {code}: {message}")]
    Parse { code: edgepolicy_core::ParseErrorCode, message: String },

    #[error("policy error: {0}")]
    Policy(#[from] edgepolicy_policy_engine::PolicyError),

    #[error("formula error: {0}")]
    Formula(#[from] edgepolicy_formula::FormulaError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] edgepolicy_scheduler::SchedulerError),

    #[error("message gateway error: {0}")]
    Gateway(String),

    #[error("device is cancelled")]
    Cancelled,
}

impl From<DeviceError> for edgepolicy_core::Error {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::UnknownAttribute(_)
            | DeviceError::TypeMismatch { .. }
            | DeviceError::OutOfRange { .. } => edgepolicy_core::Error::Validation(err.to_string()),
            DeviceError::Parse { code, message } => edgepolicy_core::Error::Parse { code, message },
            DeviceError::UnknownFormat(_) | DeviceError::NotAnAlertFormat(_) => {
                edgepolicy_core::Error::Parse {
                    code: edgepolicy_core::ParseErrorCode::MissingAlertFormat,
                    message: err.to_string(),
                }
            }
            DeviceError::Gateway(_) => edgepolicy_core::Error::Transport(err.to_string()),
            DeviceError::Policy(_) | DeviceError::Persistence(_) => {
                edgepolicy_core::Error::Policy(err.to_string())
            }
            DeviceError::Scheduler(_) => edgepolicy_core::Error::Internal(err.to_string()),
            DeviceError::Formula(_) => edgepolicy_core::Error::Internal(err.to_string()),
            DeviceError::Cancelled => edgepolicy_core::Error::Cancelled,
        }
    }
}
