//! # Transport
//!
//! HTTP implementation of the `PolicyServerClient` (C6 collaborator) and
//! `MessageGateway`/`MessagePersistence` (C9) traits defined in
//! `edgepolicy-policy-engine` and `edgepolicy-device-core`, plus the
//! remaining-retries delivery policy (§6) that drives message delivery.

pub mod error;
pub mod gateway;
pub mod persistence;
pub mod rest_client;
pub mod retry;

pub use error::{Result, TransportError};
pub use gateway::{DeviceRequestHandler, HttpMessageGateway, HttpMessageSender, MessageSender};
pub use persistence::InMemoryMessagePersistence;
pub use rest_client::{HttpPolicyServerClient, RequestIdentity};
pub use retry::RetryBudget;
