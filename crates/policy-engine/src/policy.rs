//! `DevicePolicy` and its function pipelines (§3, §4.5).

use std::collections::HashMap;

use edgepolicy_core::types::{DeviceModelUrn, PolicyId};
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, Result};

/// One step of an attribute's pipeline: a function id plus its unordered,
/// function-specific parameter bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePolicyFunction {
    pub id: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Immutable, parsed device policy: an ordered pipeline per attribute name
/// (or the `"*"` sentinel meaning every attribute).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePolicy {
    pub id: PolicyId,
    pub device_model_urn: DeviceModelUrn,
    pub description: String,
    pub enabled: bool,
    pub last_modified: i64,
    pub pipelines: HashMap<String, Vec<DevicePolicyFunction>>,
}

#[derive(Deserialize)]
struct RawPolicy {
    id: String,
    #[serde(rename = "deviceModelUrn")]
    device_model_urn: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(rename = "lastModified")]
    last_modified: i64,
    #[serde(default)]
    pipelines: HashMap<String, Vec<DevicePolicyFunction>>,
}

fn default_enabled() -> bool {
    true
}

impl DevicePolicy {
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawPolicy =
            serde_json::from_str(json).map_err(|e| PolicyError::Parse(format!("device policy: {e}")))?;
        Ok(Self {
            id: PolicyId::new(raw.id),
            device_model_urn: DeviceModelUrn::new(raw.device_model_urn),
            description: raw.description,
            enabled: raw.enabled,
            last_modified: raw.last_modified,
            pipelines: raw.pipelines,
        })
    }

    /// Returns the pipeline for `attribute`, falling back to the `"*"`
    /// wildcard pipeline when no attribute-specific one exists.
    pub fn pipeline_for(&self, attribute: &str) -> Option<&[DevicePolicyFunction]> {
        self.pipelines
            .get(attribute)
            .or_else(|| self.pipelines.get(edgepolicy_core::types::ALL_ATTRIBUTES))
            .map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_with_pipeline() {
        let json = r#"{
            "id": "policy-1",
            "deviceModelUrn": "urn:model:thermostat",
            "description": "test",
            "enabled": true,
            "lastModified": 1000,
            "pipelines": {
                "temp": [{"id": "mean", "parameters": {"window": 1000, "slide": 500}}]
            }
        }"#;
        let policy = DevicePolicy::parse(json).unwrap();
        assert_eq!(policy.pipeline_for("temp").unwrap().len(), 1);
        assert!(policy.pipeline_for("missing").is_none());
    }

    #[test]
    fn falls_back_to_wildcard_pipeline() {
        let json = r#"{
            "id": "policy-1",
            "deviceModelUrn": "urn:model:thermostat",
            "lastModified": 1000,
            "pipelines": {
                "*": [{"id": "filterCondition", "parameters": {}}]
            }
        }"#;
        let policy = DevicePolicy::parse(json).unwrap();
        assert_eq!(policy.pipeline_for("anything").unwrap().len(), 1);
    }
}
