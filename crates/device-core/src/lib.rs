//! # Device Core
//!
//! - Persistence Store (C3): named opaque key/value stores mutated through
//!   buffered transactions.
//! - `DeviceAnalog`/attribute validation (§3): type and bound checks against
//!   a parsed device model.
//! - Message wire format and gateway/persistence collaborator contracts
//!   (§6, §4.9).
//! - Virtual Device Core (C8): per-endpoint attribute state, policy pipeline
//!   execution, and computed-metric trigger map.
//! - The process-wide virtual device registry and policy-change listener
//!   that connects C8 to the device policy manager (C6) without a cyclic
//!   crate dependency.

pub mod device_analog;
pub mod error;
pub mod message;
pub mod persistence;
pub mod registry;
pub mod virtual_device;

pub use device_analog::{validate_value, VirtualDeviceAttribute};
pub use error::{DeviceError, Result};
pub use message::{
    Direction, Message, MessageGateway, MessagePersistence, Payload, Priority, Reliability,
    RequestHandler, Scalar,
};
pub use persistence::{NamedStore, PersistenceStoreRegistry, Tx};
pub use registry::{EndpointPolicyListener, VirtualDeviceRegistry};
pub use virtual_device::{AlertBuilder, VirtualDeviceCore};
