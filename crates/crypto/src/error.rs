//! Trust store error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrustStoreError>;

#[derive(Error, Debug)]
pub enum TrustStoreError {
    #[error("store signature is missing")]
    MissingSignature,

    #[error("store signature does not match")]
    SignatureMismatch,

    #[error("malformed store: {0}")]
    Malformed(String),

    #[error("no private key is available for signing")]
    MissingPrivateKey,

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("device is already activated with different credentials")]
    AlreadyActivated,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("encryption failure: {0}")]
    Encryption(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TrustStoreError> for edgepolicy_core::Error {
    fn from(err: TrustStoreError) -> Self {
        edgepolicy_core::Error::TrustStore(err.to_string())
    }
}
