//! Trust store telemetry trait.
//!
//! Defines the recording surface for trust-store operations without
//! depending on the telemetry crate directly, avoiding a dependency cycle
//! (the concrete recorder lives in `edgepolicy-telemetry` instead).

/// Recorder for trust-store operation metrics.
pub trait TrustStoreTelemetry: Send + Sync {
    /// Records an RSA key-pair generation attempt.
    fn record_key_pair_generation(&self, success: bool);

    /// Records a signing operation (shared-secret HMAC or RSA).
    fn record_signing_operation(&self, duration_ns: u64, success: bool);

    /// Records a completed JWT client-assertion build.
    fn record_assertion_built(&self);

    /// Records a store serialization (`save`).
    fn record_save(&self);

    /// Records a store deserialization (`load`), noting whether the HMAC
    /// signature verified.
    fn record_load(&self, hmac_valid: bool);
}
