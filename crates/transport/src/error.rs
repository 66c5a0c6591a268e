//! Transport-layer error type: everything that can go wrong talking to the
//! cloud-side policy server or delivering a queued message (§7 `TransportError`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server responded {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("no request handler registered for {endpoint} {url}")]
    NoHandlerRegistered { endpoint: String, url: String },
}

impl From<TransportError> for edgepolicy_core::Error {
    fn from(err: TransportError) -> Self {
        edgepolicy_core::Error::Transport(err.to_string())
    }
}

impl From<TransportError> for edgepolicy_device_core::error::DeviceError {
    fn from(err: TransportError) -> Self {
        edgepolicy_device_core::error::DeviceError::Gateway(err.to_string())
    }
}
