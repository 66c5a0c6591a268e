//! Unified error currency shared across crate boundaries.
//!
//! Each crate also defines its own narrower `thiserror` enum for its
//! internal concerns (e.g. `edgepolicy_crypto::TrustStoreError`); this type
//! is what cross-crate trait signatures (`PolicyServerClient`,
//! `MessageGateway`) speak, with `#[from]` conversions bridging the two.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric codes for malformed wire messages and policies (§7).
/// The enumeration is part of the external contract: codes are never
/// renumbered once shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ParseErrorCode {
    WrongStructure = 1001,
    UnsupportedType = 1019,
    MissingAlertFormat = 1103,
    NonNumericStatusCode = 1304,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Attribute unknown, type mismatch, or out-of-range. Warning-only for
    /// actions that pass through.
    #[error("validation error: {0}")]
    Validation(String),

    /// Message or policy JSON malformed; carries a stable numeric code.
    #[error("parse error {code}: {message}")]
    Parse { code: ParseErrorCode, message: String },

    /// Signature mismatch, missing key, or unsupported algorithm in the
    /// trust store.
    #[error("trust store error: {0}")]
    TrustStore(String),

    /// Collaborator-reported transport failure, surfaced unchanged except
    /// during policy refresh (§4.6), where it is converted to a
    /// bad-mapping state instead of propagating.
    #[error("transport error: {0}")]
    Transport(String),

    /// Pipeline configuration inconsistent (e.g. pipeline shorter than the
    /// recorded index). Logged and swallowed by callers to preserve
    /// liveness; never meant to abort a running device.
    #[error("policy error: {0}")]
    Policy(String),

    /// Terminal, non-retriable: the operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl std::fmt::Display for ParseErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u32)
    }
}
