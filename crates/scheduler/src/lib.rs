//! # Scheduled-Window Dispatcher
//!
//! One logical timer per virtual device (C7), firing windowed policy
//! functions on their slide boundaries and feeding the reduced value back
//! through the `WindowSink` trait (`edgepolicy-core`) rather than
//! depending on the virtual device core crate that implements it.

pub mod dispatcher;
pub mod error;

pub use dispatcher::{ScheduledPolicyData, ScheduledWindowDispatcher};
pub use error::{Result, SchedulerError};
