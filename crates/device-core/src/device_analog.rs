//! `DeviceAnalog`/`VirtualDeviceAttribute` (§3): the device-side binding of
//! a device model to one endpoint, and per-attribute type/range validation
//! against it.

use edgepolicy_core::types::ValueType;
use edgepolicy_formula::AttributeValue;
use edgepolicy_policy_engine::device_model::DeviceModelAttribute;

use crate::error::{DeviceError, Result};

/// A device-model attribute as seen on the device side: always settable
/// (server-to-device write restrictions are enforced by policy, not by the
/// virtual device itself), plus its last-known value.
#[derive(Debug, Clone)]
pub struct VirtualDeviceAttribute {
    pub model: DeviceModelAttribute,
    pub value: Option<AttributeValue>,
    pub settable: bool,
}

impl VirtualDeviceAttribute {
    pub fn new(model: DeviceModelAttribute) -> Self {
        Self {
            model,
            value: None,
            settable: true,
        }
    }
}

/// Validates `value` against `attribute`'s declared type and numeric
/// bounds. A `None` declared type (degraded at model-parse time) accepts
/// any value without a type check, but bounds are still enforced when set.
pub fn validate_value(name: &str, attribute: &DeviceModelAttribute, value: &AttributeValue) -> Result<()> {
    if let Some(expected) = attribute.value_type {
        let matches = match (expected, value) {
            (ValueType::Integer | ValueType::Number, AttributeValue::Number(_)) => true,
            (ValueType::Boolean, AttributeValue::Boolean(_)) => true,
            (ValueType::String | ValueType::Uri | ValueType::Datetime, AttributeValue::String(_)) => true,
            _ => false,
        };
        if !matches {
            return Err(DeviceError::TypeMismatch {
                attribute: name.to_string(),
                expected,
            });
        }
    }

    if let AttributeValue::Number(n) = value {
        if attribute.lower_bound.is_some_and(|lower| *n < lower) || attribute.upper_bound.is_some_and(|upper| *n > upper) {
            return Err(DeviceError::OutOfRange {
                attribute: name.to_string(),
                value: *n,
                lower: attribute.lower_bound,
                upper: attribute.upper_bound,
            });
        }
    }

    Ok(())
}
