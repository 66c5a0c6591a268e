//! Cross-cutting collaborator traits. Component-specific contracts (the
//! policy server client, the message gateway) live in the crate that owns
//! their payload types; only contracts that would otherwise force a cyclic
//! crate dependency live here.

use crate::types::{DeviceModelUrn, EndpointId};
use crate::Result;
use async_trait::async_trait;

/// Trait for components with explicit startup/shutdown/health semantics.
pub trait Lifecycle {
    fn initialize(&mut self) -> Result<()>;
    fn shutdown(&mut self) -> Result<()>;
    fn health_check(&self) -> Result<()>;
}

/// Trait for components that can validate their own invariants.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Callback target for the scheduled-window dispatcher (C7). The dispatcher
/// crate depends only on this trait, not on the virtual-device core crate
/// that implements it, breaking what would otherwise be a C7 <-> C8 cycle
/// (SPEC_FULL §9, "cyclic virtual-device <-> policy-manager references").
#[async_trait]
pub trait WindowSink: Send + Sync {
    /// Delivers the reduced value produced when a scheduled window fires
    /// for `attribute` on `endpoint`, continuing pipeline execution from
    /// `resume_at_index` (the recorded pipeline index for that window).
    async fn deliver_scheduled_value(
        &self,
        endpoint: &EndpointId,
        device_model: &DeviceModelUrn,
        attribute: &str,
        resume_at_index: usize,
        value: f64,
    );
}
