//! Device Model Registry (C2): a pure JSON -> in-memory-model parser plus a
//! URN-keyed cache with a pluggable fetch collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use edgepolicy_core::types::{Access, DeviceModelUrn, ValueType};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{PolicyError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceModelAttribute {
    pub name: String,
    pub urn: String,
    pub access: Access,
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceModelAction {
    pub name: String,
    #[serde(rename = "argType")]
    pub arg_type: Option<ValueType>,
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatKind {
    Alert,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Critical,
    Significant,
    Normal,
    Low,
}

impl Default for AlertSeverity {
    fn default() -> Self {
        AlertSeverity::Significant
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatField {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceModelFormat {
    pub urn: String,
    pub kind: FormatKind,
    pub fields: Vec<FormatField>,
}

/// Immutable descriptor for a class of device, identified by a URN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceModel {
    pub urn: String,
    pub attributes: HashMap<String, DeviceModelAttribute>,
    pub actions: HashMap<String, DeviceModelAction>,
    pub formats: HashMap<String, DeviceModelFormat>,
}

/// Raw wire shapes accepted while parsing (unknown `type` strings degrade
/// to `None` rather than rejecting the whole model).
#[derive(Deserialize)]
struct RawAttribute {
    name: String,
    urn: String,
    access: Access,
    #[serde(rename = "type")]
    value_type: String,
    #[serde(default)]
    lower_bound: Option<f64>,
    #[serde(default)]
    upper_bound: Option<f64>,
    #[serde(default)]
    default_value: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawAction {
    name: String,
    #[serde(rename = "argType")]
    arg_type: String,
    #[serde(default)]
    lower_bound: Option<f64>,
    #[serde(default)]
    upper_bound: Option<f64>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    value_type: String,
    #[serde(default)]
    optional: bool,
}

#[derive(Deserialize)]
struct RawFormat {
    urn: String,
    kind: FormatKind,
    fields: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawModel {
    urn: String,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
    #[serde(default)]
    actions: Vec<RawAction>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

fn parse_value_type(raw: &str) -> Option<ValueType> {
    match raw {
        "INTEGER" => Some(ValueType::Integer),
        "NUMBER" => Some(ValueType::Number),
        "BOOLEAN" => Some(ValueType::Boolean),
        "STRING" => Some(ValueType::String),
        "URI" => Some(ValueType::Uri),
        "DATETIME" => Some(ValueType::Datetime),
        other => {
            tracing::warn!(type_name = other, "device model: unsupported type, degrading to null");
            None
        }
    }
}

impl DeviceModel {
    /// Parses a device model from its JSON wire form (§4.2). Unknown type
    /// strings degrade the affected field's type to `null`; they are not a
    /// parse failure on their own.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawModel = serde_json::from_str(json)
            .map_err(|e| PolicyError::Parse(format!("device model: {e}")))?;

        let attributes = raw
            .attributes
            .into_iter()
            .map(|a| {
                (
                    a.name.clone(),
                    DeviceModelAttribute {
                        name: a.name,
                        urn: a.urn,
                        access: a.access,
                        value_type: parse_value_type(&a.value_type),
                        lower_bound: a.lower_bound,
                        upper_bound: a.upper_bound,
                        default_value: a.default_value,
                    },
                )
            })
            .collect();

        let actions = raw
            .actions
            .into_iter()
            .map(|a| {
                (
                    a.name.clone(),
                    DeviceModelAction {
                        name: a.name,
                        arg_type: parse_value_type(&a.arg_type),
                        lower_bound: a.lower_bound,
                        upper_bound: a.upper_bound,
                    },
                )
            })
            .collect();

        let formats = raw
            .formats
            .into_iter()
            .map(|f| {
                (
                    f.urn.clone(),
                    DeviceModelFormat {
                        urn: f.urn,
                        kind: f.kind,
                        fields: f
                            .fields
                            .into_iter()
                            .map(|field| FormatField {
                                name: field.name,
                                value_type: parse_value_type(&field.value_type),
                                optional: field.optional,
                            })
                            .collect(),
                    },
                )
            })
            .collect();

        Ok(Self {
            urn: raw.urn,
            attributes,
            actions,
            formats,
        })
    }
}

/// Collaborator contract for fetching a device model that isn't cached
/// yet. The cloud-side `GET /deviceModels/{urn}` endpoint implements this;
/// this crate only depends on the trait.
#[async_trait]
pub trait DeviceModelFetcher: Send + Sync {
    async fn fetch(&self, urn: &DeviceModelUrn) -> Result<DeviceModel>;
}

/// Caches parsed device models keyed by URN, fetching on miss via a
/// pluggable collaborator.
pub struct DeviceModelRegistry {
    fetcher: Arc<dyn DeviceModelFetcher>,
    cache: RwLock<HashMap<String, Arc<DeviceModel>>>,
}

impl DeviceModelRegistry {
    pub fn new(fetcher: Arc<dyn DeviceModelFetcher>) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch(&self, urn: &DeviceModelUrn) -> Result<Arc<DeviceModel>> {
        if let Some(model) = self.cache.read().await.get(urn.as_str()) {
            return Ok(Arc::clone(model));
        }
        let model = Arc::new(self.fetcher.fetch(urn).await?);
        self.cache
            .write()
            .await
            .insert(urn.as_str().to_string(), Arc::clone(&model));
        Ok(model)
    }

    pub async fn get_cached(&self, urn: &DeviceModelUrn) -> Option<Arc<DeviceModel>> {
        self.cache.read().await.get(urn.as_str()).cloned()
    }
}
