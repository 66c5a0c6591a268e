//! Trust-store operation instrumentation (§4.1): provisioning, key-pair
//! generation, signing, and load/save round trips.

use crate::types::Metric;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trust-store metrics collector.
pub struct TrustStoreMetrics {
    key_pair_generations_total: Arc<AtomicU64>,
    key_pair_generation_failures_total: Arc<AtomicU64>,

    signing_operations_total: Arc<AtomicU64>,
    signing_duration_ns_sum: Arc<AtomicU64>,
    signing_failures_total: Arc<AtomicU64>,

    assertions_built_total: Arc<AtomicU64>,

    saves_total: Arc<AtomicU64>,
    loads_total: Arc<AtomicU64>,
    load_hmac_failures_total: Arc<AtomicU64>,
}

impl TrustStoreMetrics {
    pub fn new() -> Self {
        Self {
            key_pair_generations_total: Arc::new(AtomicU64::new(0)),
            key_pair_generation_failures_total: Arc::new(AtomicU64::new(0)),
            signing_operations_total: Arc::new(AtomicU64::new(0)),
            signing_duration_ns_sum: Arc::new(AtomicU64::new(0)),
            signing_failures_total: Arc::new(AtomicU64::new(0)),
            assertions_built_total: Arc::new(AtomicU64::new(0)),
            saves_total: Arc::new(AtomicU64::new(0)),
            loads_total: Arc::new(AtomicU64::new(0)),
            load_hmac_failures_total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_key_pair_generation(&self, success: bool) {
        self.key_pair_generations_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.key_pair_generation_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_signing_operation(&self, duration_ns: u64, success: bool) {
        self.signing_operations_total.fetch_add(1, Ordering::Relaxed);
        self.signing_duration_ns_sum.fetch_add(duration_ns, Ordering::Relaxed);
        if !success {
            self.signing_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_assertion_built(&self) {
        self.assertions_built_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self) {
        self.saves_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self, hmac_valid: bool) {
        self.loads_total.fetch_add(1, Ordering::Relaxed);
        if !hmac_valid {
            self.load_hmac_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn metrics(&self) -> Vec<Metric> {
        let labels = || vec![("module".to_string(), "trust_store".to_string())];

        let signing_ops = self.signing_operations_total.load(Ordering::Relaxed);
        let signing_duration_sum = self.signing_duration_ns_sum.load(Ordering::Relaxed);
        let avg_signing_duration_ms = if signing_ops > 0 {
            (signing_duration_sum as f64 / signing_ops as f64) / 1_000_000.0
        } else {
            0.0
        };

        vec![
            Metric::counter(
                "trust_store_key_pair_generations_total".to_string(),
                self.key_pair_generations_total.load(Ordering::Relaxed) as f64,
                labels(),
            ),
            Metric::counter(
                "trust_store_key_pair_generation_failures_total".to_string(),
                self.key_pair_generation_failures_total.load(Ordering::Relaxed) as f64,
                labels(),
            ),
            Metric::counter(
                "trust_store_signing_operations_total".to_string(),
                signing_ops as f64,
                labels(),
            ),
            Metric::gauge(
                "trust_store_signing_avg_duration_ms".to_string(),
                avg_signing_duration_ms,
                labels(),
            ),
            Metric::counter(
                "trust_store_signing_failures_total".to_string(),
                self.signing_failures_total.load(Ordering::Relaxed) as f64,
                labels(),
            ),
            Metric::counter(
                "trust_store_assertions_built_total".to_string(),
                self.assertions_built_total.load(Ordering::Relaxed) as f64,
                labels(),
            ),
            Metric::counter(
                "trust_store_saves_total".to_string(),
                self.saves_total.load(Ordering::Relaxed) as f64,
                labels(),
            ),
            Metric::counter(
                "trust_store_loads_total".to_string(),
                self.loads_total.load(Ordering::Relaxed) as f64,
                labels(),
            ),
            Metric::counter(
                "trust_store_load_hmac_failures_total".to_string(),
                self.load_hmac_failures_total.load(Ordering::Relaxed) as f64,
                labels(),
            ),
        ]
    }
}

impl Default for TrustStoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_signing_and_failure_counts() {
        let metrics = TrustStoreMetrics::new();
        metrics.record_signing_operation(1_000_000, true);
        metrics.record_signing_operation(2_000_000, false);

        let snapshot = metrics.metrics();
        let ops = snapshot
            .iter()
            .find(|m| m.name == "trust_store_signing_operations_total")
            .unwrap();
        assert_eq!(ops.value, 2.0);

        let failures = snapshot
            .iter()
            .find(|m| m.name == "trust_store_signing_failures_total")
            .unwrap();
        assert_eq!(failures.value, 1.0);
    }

    #[test]
    fn records_load_hmac_failure() {
        let metrics = TrustStoreMetrics::new();
        metrics.record_load(false);
        metrics.record_load(true);

        let snapshot = metrics.metrics();
        let failures = snapshot
            .iter()
            .find(|m| m.name == "trust_store_load_hmac_failures_total")
            .unwrap();
        assert_eq!(failures.value, 1.0);
    }
}
