//! Core type definitions shared by every crate in the runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identifier for an activated device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier for a device as known to the device policy manager: either a
/// directly-connected device's own endpoint id, or an indirectly-connected
/// device's id as reported by its gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Device model URN, e.g. `urn:com:acme:thermostat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceModelUrn(String);

impl DeviceModelUrn {
    pub fn new(urn: impl Into<String>) -> Self {
        Self(urn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceModelUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceModelUrn {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Device policy identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PolicyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Sentinel attribute-name key meaning "all attributes" in a device policy's
/// pipeline map (`DevicePolicy::pipelines`).
pub const ALL_ATTRIBUTES: &str = "*";

/// Monotonically increasing per-endpoint ordinal used as the message sort key
/// (§5 ordering guarantees). Wraps at `i64::MAX` rather than panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ordinal(i64);

impl Ordinal {
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the current value and advances, wrapping at `i64::MAX`.
    pub fn next(&mut self) -> Self {
        let current = *self;
        self.0 = if self.0 == i64::MAX { 0 } else { self.0 + 1 };
        current
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl Default for Ordinal {
    fn default() -> Self {
        Self::zero()
    }
}

/// Network access type of a device-model attribute, action argument, or
/// format field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
    Executable,
}

/// Value type for a device-model attribute, action argument, or format
/// field. Unknown/unsupported type strings degrade to `None` at the parser
/// boundary (§4.2), never reaching this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Integer,
    Number,
    Boolean,
    String,
    Uri,
    Datetime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_wraps_at_i64_max() {
        let mut ord = Ordinal(i64::MAX);
        let emitted = ord.next();
        assert_eq!(emitted.value(), i64::MAX);
        assert_eq!(ord.value(), 0);
    }

    #[test]
    fn ordinal_increments() {
        let mut ord = Ordinal::zero();
        assert_eq!(ord.next().value(), 0);
        assert_eq!(ord.next().value(), 1);
        assert_eq!(ord.value(), 2);
    }
}
