//! # Device Model, Policy Function Library, and Device Policy Manager
//!
//! - Device Model Registry (C2): pure JSON parser plus a URN-keyed cache.
//! - Policy Function Library (C5): the `apply`/`get` pipeline-function
//!   contract, its built-in functions, and the `FunctionRegistry`.
//! - Device Policy Manager (C6): the three-way-consistent policy mappings
//!   and server-driven change processing.

pub mod device_model;
pub mod error;
pub mod functions;
pub mod manager;
pub mod policy;

pub use device_model::{AlertSeverity, DeviceModel, DeviceModelFetcher, DeviceModelRegistry};
pub use error::{PolicyError, Result};
pub use functions::{FunctionRegistry, NetworkCostTier, PipelineContext, PolicyFunction};
pub use manager::{
    ChangeOp, DevicePolicyManager, PolicyChangeItem, PolicyChangeListener, PolicyServerClient,
};
pub use policy::{DevicePolicy, DevicePolicyFunction};
