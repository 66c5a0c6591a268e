//! Implements `edgepolicy_crypto`'s `TrustStoreTelemetry` trait, wrapping
//! `TrustStoreMetrics` for the collector to pull a snapshot from.

use crate::crypto_metrics::TrustStoreMetrics;
use edgepolicy_crypto::TrustStoreTelemetry as TrustStoreTelemetryTrait;
use std::sync::Arc;

#[derive(Clone)]
pub struct TrustStoreTelemetryImpl {
    metrics: Arc<TrustStoreMetrics>,
}

impl TrustStoreTelemetryImpl {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(TrustStoreMetrics::new()),
        }
    }

    /// Current metrics snapshot.
    pub fn get_metrics(&self) -> Vec<crate::Metric> {
        self.metrics.metrics()
    }
}

impl Default for TrustStoreTelemetryImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustStoreTelemetryTrait for TrustStoreTelemetryImpl {
    fn record_key_pair_generation(&self, success: bool) {
        self.metrics.record_key_pair_generation(success);
    }

    fn record_signing_operation(&self, duration_ns: u64, success: bool) {
        self.metrics.record_signing_operation(duration_ns, success);
    }

    fn record_assertion_built(&self) {
        self.metrics.record_assertion_built();
    }

    fn record_save(&self) {
        self.metrics.record_save();
    }

    fn record_load(&self, hmac_valid: bool) {
        self.metrics.record_load(hmac_valid);
    }
}
