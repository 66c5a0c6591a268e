//! Scheduled-window dispatcher error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("window and slide must be positive, got window={window_ms}ms slide={slide_ms}ms")]
    InvalidWindow { window_ms: i64, slide_ms: i64 },
}

impl From<SchedulerError> for edgepolicy_core::Error {
    fn from(err: SchedulerError) -> Self {
        edgepolicy_core::Error::Validation(err.to_string())
    }
}
