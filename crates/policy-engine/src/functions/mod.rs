//! Policy Function Library (C5): the `apply`/`get` contract, the built-in
//! functions, and the registry that builds an executable step from a
//! `DevicePolicyFunction`'s id and parameter bag.

mod batch;
mod bucket;
mod condition;
mod dedup;
mod sample;

use std::collections::HashMap;
use std::sync::Arc;

use edgepolicy_formula::AttributeValue;

use crate::device_model::AlertSeverity;
use crate::error::{PolicyError, Result};

/// What a pipeline step observes and can act on beyond its own input value.
/// Implemented by the virtual device core (C8).
pub trait PipelineContext: edgepolicy_formula::AttributeContext {
    fn now_ms(&self) -> i64;

    /// Queues an action invocation with its converted arguments
    /// (`actionCondition`).
    fn queue_action(&self, name: &str, arguments: HashMap<String, serde_json::Value>);

    /// Queues an alert built from a format URN, its fields, and severity
    /// (`alertCondition`, `detectDuplicates`).
    fn queue_alert(&self, format_urn: &str, severity: AlertSeverity, fields: HashMap<String, AttributeValue>);

    /// Current network cost tier, ascending `SATELLITE < CELLULAR <
    /// BLUETOOTH < WIFI < ETHERNET` (`batchByCost`).
    fn network_cost_tier(&self) -> NetworkCostTier;

    /// Persists one value under `endpoint_id`/`attribute` for a
    /// persistent-mode batch accumulator.
    fn persist_batched_value(&self, attribute: &str, value: &AttributeValue);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkCostTier {
    Satellite,
    Cellular,
    Bluetooth,
    Wifi,
    Ethernet,
}

/// A built, ready-to-run pipeline step. One instance is constructed per
/// (policy, attribute, pipeline-index) and lives for as long as that
/// assignment does; its own interior state plays the role of the
/// per-pipeline scratch map described in §4.5.
pub trait PolicyFunction: Send + Sync {
    /// Returns `true` if `value` should propagate to the next function (or
    /// be considered ready when this is the pipeline's last step).
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool;

    /// Called after `apply` returned `true`, or when a scheduled window
    /// fires. Returns the effective value, if any.
    fn get(&self, ctx: &dyn PipelineContext) -> Option<AttributeValue>;
}

type ParameterMap = HashMap<String, serde_json::Value>;

trait FunctionFactory: Send + Sync {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>>;
}

/// Static registry of function-id -> factory, built once at process start
/// and consulted whenever a policy's pipeline is instantiated.
pub struct FunctionRegistry {
    factories: HashMap<&'static str, Arc<dyn FunctionFactory>>,
}

impl FunctionRegistry {
    pub fn with_defaults() -> Self {
        let mut factories: HashMap<&'static str, Arc<dyn FunctionFactory>> = HashMap::new();
        factories.insert("filterCondition", Arc::new(condition::FilterConditionFactory));
        factories.insert("actionCondition", Arc::new(condition::ActionConditionFactory));
        factories.insert("alertCondition", Arc::new(condition::AlertConditionFactory));
        factories.insert("computedMetric", Arc::new(condition::ComputedMetricFactory));
        factories.insert("eliminateDuplicates", Arc::new(dedup::EliminateDuplicatesFactory));
        factories.insert("detectDuplicates", Arc::new(dedup::DetectDuplicatesFactory));
        factories.insert("sampleQuality", Arc::new(sample::SampleQualityFactory));
        factories.insert("mean", Arc::new(bucket::BucketFactory(bucket::Reduction::Mean)));
        factories.insert("min", Arc::new(bucket::BucketFactory(bucket::Reduction::Min)));
        factories.insert("max", Arc::new(bucket::BucketFactory(bucket::Reduction::Max)));
        factories.insert(
            "standardDeviation",
            Arc::new(bucket::BucketFactory(bucket::Reduction::StandardDeviation)),
        );
        factories.insert("batchBySize", Arc::new(batch::BatchBySizeFactory));
        factories.insert("batchByTime", Arc::new(batch::BatchByTimeFactory));
        factories.insert("batchByCost", Arc::new(batch::BatchByCostFactory));
        Self { factories }
    }

    /// Builds an executable step for `id` from its raw parameter bag.
    pub fn build(&self, id: &str, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| PolicyError::PipelineConfiguration(format!("unknown function id: {id}")))?;
        factory.build(parameters)
    }

    /// Lists registered function ids, for startup diagnostics.
    pub fn describe(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.factories.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn param_str<'a>(parameters: &'a ParameterMap, key: &str) -> Option<&'a str> {
    parameters.get(key).and_then(|v| v.as_str())
}

fn param_f64(parameters: &ParameterMap, key: &str) -> Option<f64> {
    parameters.get(key).and_then(|v| v.as_f64())
}

fn param_bool(parameters: &ParameterMap, key: &str, default: bool) -> bool {
    parameters.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_describes_all_builtin_functions() {
        let registry = FunctionRegistry::with_defaults();
        let ids = registry.describe();
        assert!(ids.contains(&"filterCondition"));
        assert!(ids.contains(&"mean"));
        assert!(ids.contains(&"batchByCost"));
        assert_eq!(ids.len(), 14);
    }

    #[test]
    fn unknown_function_id_is_a_configuration_error() {
        let registry = FunctionRegistry::with_defaults();
        assert!(registry.build("doesNotExist", &HashMap::new()).is_err());
    }
}
