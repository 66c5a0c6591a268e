//! Message wire format (§6) and the message gateway / persistence
//! collaborator contracts the virtual device core speaks against (§4.9).
//! This crate ships no transport implementation; a transport crate
//! implements `MessageGateway` and `MessagePersistence` by depending on
//! this one, the same way the policy-engine crate owns `PolicyServerClient`
//! for its consumer (C6) rather than its eventual HTTP implementer.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use edgepolicy_core::types::EndpointId;
use edgepolicy_policy_engine::AlertSeverity;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reliability {
    NoGuarantee,
    BestEffort,
    GuaranteedDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    FromDevice,
    ToDevice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Number(f64),
    Boolean(bool),
    String(String),
}

impl From<edgepolicy_formula::AttributeValue> for Scalar {
    fn from(value: edgepolicy_formula::AttributeValue) -> Self {
        match value {
            edgepolicy_formula::AttributeValue::Number(n) => Scalar::Number(n),
            edgepolicy_formula::AttributeValue::Boolean(b) => Scalar::Boolean(b),
            edgepolicy_formula::AttributeValue::String(s) => Scalar::String(s),
        }
    }
}

/// Type-specific payload. `properties`/`diagnostics`/the other common
/// envelope fields live on `Message` itself; only the type-specific shape
/// sits behind this tagged union (§9 "duck-typed alert/data objects").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    Data {
        format: String,
        data: HashMap<String, Scalar>,
    },
    Alert {
        format: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_alert_severity")]
        severity: AlertSeverity,
        data: HashMap<String, Scalar>,
    },
    Request {
        method: String,
        url: String,
        headers: HashMap<String, Vec<String>>,
        #[serde(default)]
        params: Option<HashMap<String, String>>,
        body: String,
    },
    Response {
        #[serde(rename = "statusCode")]
        status_code: u16,
        url: String,
        #[serde(rename = "requestId")]
        request_id: String,
        headers: HashMap<String, Vec<String>>,
        body: String,
    },
    ResourcesReport {
        data: HashMap<String, Scalar>,
    },
}

fn default_alert_severity() -> AlertSeverity {
    AlertSeverity::Significant
}

/// A message flowing between a virtual device and the cloud-side policy
/// server, as described by §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: uuid::Uuid,
    #[serde(rename = "clientId")]
    pub client_id: uuid::Uuid,
    pub source: String,
    pub destination: String,
    pub priority: Priority,
    pub reliability: Reliability,
    #[serde(rename = "eventTime")]
    pub event_time: i64,
    pub sender: String,
    pub direction: Direction,
    #[serde(default)]
    pub properties: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub diagnostics: HashMap<String, Scalar>,
    #[serde(rename = "receivedTime", default)]
    pub received_time: Option<i64>,
    #[serde(rename = "sentTime", default)]
    pub sent_time: Option<i64>,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Collaborator contract the virtual device core uses to emit messages
/// (§4.9). Implemented by the transport layer.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn queue(&self, message: Message) -> Result<()>;
    async fn queue_all(&self, messages: Vec<Message>) -> Result<()>;

    /// Registers a handler for server-originated REQUEST messages whose
    /// `url` matches `url_pattern` for `endpoint`.
    async fn register_request_handler(
        &self,
        endpoint: EndpointId,
        url_pattern: String,
        handler: std::sync::Arc<dyn RequestHandler>,
    ) -> Result<()>;

    fn build_response_message(
        &self,
        request: &Message,
        status_code: u16,
        headers: HashMap<String, Vec<String>>,
        body: String,
    ) -> Message;
}

/// Handles a server-originated request for one endpoint/url-pattern pair.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: &Message) -> Result<Message>;
}

/// Persistence collaborator for queued-but-unsent messages (§4.9),
/// distinct from the generic C3 `PersistenceStoreRegistry`: this one is
/// scoped to messages, keyed by endpoint.
#[async_trait]
pub trait MessagePersistence: Send + Sync {
    async fn save(&self, endpoint: &EndpointId, messages: &[Message]) -> Result<()>;
    async fn load(&self, endpoint: &EndpointId) -> Result<Vec<Message>>;
    async fn delete(&self, messages: &[Message]) -> Result<()>;
}
