//! Virtual Device Core (C8): one instance per (endpoint-id, device-model),
//! owning the attribute map, the per-attribute pipeline instances, and the
//! computed-metric trigger map described in §4.8.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use base64::Engine;

use edgepolicy_core::traits::WindowSink;
use edgepolicy_core::types::{DeviceModelUrn, EndpointId, Ordinal, ALL_ATTRIBUTES};
use edgepolicy_formula::{AttributeContext, AttributeValue};
use edgepolicy_policy_engine::device_model::FormatKind;
use edgepolicy_policy_engine::{
    AlertSeverity, DeviceModel, DevicePolicy, FunctionRegistry, NetworkCostTier, PipelineContext,
    PolicyFunction,
};
use edgepolicy_scheduler::ScheduledWindowDispatcher;

use crate::device_analog::validate_value;
use crate::error::{DeviceError, Result};
use crate::message::{Direction, Message, MessageGateway, Payload, Priority, Reliability, Scalar};
use crate::persistence::PersistenceStoreRegistry;

struct VirtualDeviceContext<'a> {
    device: &'a VirtualDeviceCore,
    actions: Mutex<Vec<(String, HashMap<String, serde_json::Value>)>>,
    alerts: Mutex<Vec<(String, AlertSeverity, HashMap<String, AttributeValue>)>>,
    persisted: Mutex<Vec<(String, AttributeValue)>>,
}

impl<'a> VirtualDeviceContext<'a> {
    fn new(device: &'a VirtualDeviceCore) -> Self {
        Self {
            device,
            actions: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
            persisted: Mutex::new(Vec::new()),
        }
    }
}

impl AttributeContext for VirtualDeviceContext<'_> {
    fn current_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.device.attributes.read().unwrap().get(name).cloned()
    }

    fn in_process_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.device.in_process.read().unwrap().get(name).cloned()
    }
}

impl PipelineContext for VirtualDeviceContext<'_> {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn queue_action(&self, name: &str, arguments: HashMap<String, serde_json::Value>) {
        self.actions.lock().unwrap().push((name.to_string(), arguments));
    }

    fn queue_alert(&self, format_urn: &str, severity: AlertSeverity, fields: HashMap<String, AttributeValue>) {
        self.alerts.lock().unwrap().push((format_urn.to_string(), severity, fields));
    }

    fn network_cost_tier(&self) -> NetworkCostTier {
        *self.device.network_cost_tier.read().unwrap()
    }

    fn persist_batched_value(&self, attribute: &str, value: &AttributeValue) {
        self.persisted.lock().unwrap().push((attribute.to_string(), value.clone()));
    }
}

struct PipelineOutcome {
    value: Option<AttributeValue>,
    actions: Vec<(String, HashMap<String, serde_json::Value>)>,
    alerts: Vec<(String, AlertSeverity, HashMap<String, AttributeValue>)>,
    persisted: Vec<(String, AttributeValue)>,
}

/// Forwards scheduled deliveries to the owning device without giving the
/// dispatcher a strong reference back to it, so the device can be dropped
/// (and its background timer task wound down by `cancel`) without the
/// scheduler keeping it alive.
struct WeakDeviceSink(std::sync::Weak<VirtualDeviceCore>);

#[async_trait]
impl WindowSink for WeakDeviceSink {
    async fn deliver_scheduled_value(
        &self,
        endpoint: &EndpointId,
        device_model: &DeviceModelUrn,
        attribute: &str,
        resume_at_index: usize,
        value: f64,
    ) {
        if let Some(device) = self.0.upgrade() {
            device
                .deliver_scheduled_value(endpoint, device_model, attribute, resume_at_index, value)
                .await;
        }
    }
}

/// Per (endpoint-id, device-model) runtime instance. Validates every
/// attribute touch against the model, routes through the assigned
/// policy's pipelines, and maintains the computed-metric trigger map.
pub struct VirtualDeviceCore {
    endpoint_id: EndpointId,
    device_model: Arc<DeviceModel>,
    function_registry: Arc<FunctionRegistry>,
    gateway: Arc<dyn MessageGateway>,
    persistence: Arc<PersistenceStoreRegistry>,
    attributes: RwLock<HashMap<String, AttributeValue>>,
    in_process: RwLock<HashMap<String, AttributeValue>>,
    pipelines: RwLock<HashMap<String, Vec<Arc<dyn PolicyFunction>>>>,
    policy: RwLock<Option<Arc<DevicePolicy>>>,
    computed_triggers: RwLock<Vec<(HashSet<String>, String)>>,
    network_cost_tier: RwLock<NetworkCostTier>,
    ordinal: Mutex<Ordinal>,
    cancelled: AtomicBool,
    /// Scheduled-window dispatcher (C7) driving `mean`/`min`/`max`/
    /// `standardDeviation` reducers, which never propagate on their own
    /// `apply`. One timer task per device; cancelled alongside it.
    scheduler: Arc<ScheduledWindowDispatcher>,
    /// `(window_ms, slide_ms)` currently registered with `scheduler`, keyed
    /// by attribute, so a policy change can deregister cleanly.
    scheduled_windows: RwLock<HashMap<String, (i64, i64)>>,
}

impl VirtualDeviceCore {
    pub fn new(
        endpoint_id: EndpointId,
        device_model: Arc<DeviceModel>,
        function_registry: Arc<FunctionRegistry>,
        gateway: Arc<dyn MessageGateway>,
        persistence: Arc<PersistenceStoreRegistry>,
    ) -> Arc<Self> {
        let device_model_urn = DeviceModelUrn::new(device_model.urn.clone());
        let dispatcher_endpoint = endpoint_id.clone();
        Arc::new_cyclic(|weak| {
            let scheduler = ScheduledWindowDispatcher::spawn(
                dispatcher_endpoint,
                device_model_urn,
                Arc::new(WeakDeviceSink(weak.clone())) as Arc<dyn WindowSink>,
            );
            Self {
                endpoint_id,
                device_model,
                function_registry,
                gateway,
                persistence,
                attributes: RwLock::new(HashMap::new()),
                in_process: RwLock::new(HashMap::new()),
                pipelines: RwLock::new(HashMap::new()),
                policy: RwLock::new(None),
                computed_triggers: RwLock::new(Vec::new()),
                network_cost_tier: RwLock::new(NetworkCostTier::Wifi),
                ordinal: Mutex::new(Ordinal::zero()),
                cancelled: AtomicBool::new(false),
                scheduler,
                scheduled_windows: RwLock::new(HashMap::new()),
            }
        })
    }

    pub fn endpoint_id(&self) -> &EndpointId {
        &self.endpoint_id
    }

    pub fn device_model_urn(&self) -> &str {
        &self.device_model.urn
    }

    pub fn set_network_cost_tier(&self, tier: NetworkCostTier) {
        *self.network_cost_tier.write().unwrap() = tier;
    }

    pub fn current_value(&self, attribute: &str) -> Option<AttributeValue> {
        self.attributes.read().unwrap().get(attribute).cloned()
    }

    /// Stops the scheduled dispatcher from feeding further values into this
    /// device and drops any queued-but-unsent batched state (§5
    /// cancellation).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.scheduler.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Assigns (or clears) the device's policy. Flushes every currently
    /// built pipeline's pending window/batch state through one final data
    /// message *before* discarding the old pipeline instances (§4.6 "the
    /// un-assign must flush the current window... before the mapping is
    /// removed", scenario S5).
    pub async fn set_policy(&self, policy: Option<Arc<DevicePolicy>>) -> Result<Vec<Message>> {
        let flushed = self.flush_pipelines().await?;
        self.pipelines.write().unwrap().clear();
        let stale: Vec<(String, i64, i64)> = {
            let mut scheduled = self.scheduled_windows.write().unwrap();
            let stale = scheduled.iter().map(|(a, (w, s))| (a.clone(), *w, *s)).collect();
            scheduled.clear();
            stale
        };
        for (attribute, window_ms, slide_ms) in stale {
            self.scheduler.remove_timed_policy_data(window_ms, slide_ms, &attribute).await;
        }
        self.rebuild_computed_triggers(&policy);
        *self.policy.write().unwrap() = policy;
        Ok(flushed)
    }

    fn rebuild_computed_triggers(&self, policy: &Option<Arc<DevicePolicy>>) {
        let mut triggers = Vec::new();
        if let Some(policy) = policy {
            for (attribute, pipeline) in &policy.pipelines {
                if attribute.as_str() == ALL_ATTRIBUTES {
                    continue;
                }
                let Some(first) = pipeline.first() else { continue };
                if first.id != "computedMetric" {
                    continue;
                }
                let Some(formula_src) = first.parameters.get("formula").and_then(|v| v.as_str()) else {
                    continue;
                };
                if let Ok(formula) = edgepolicy_formula::Formula::parse(formula_src) {
                    let trigger_set: HashSet<String> = formula.referenced_attributes().into_iter().collect();
                    if !trigger_set.is_empty() {
                        triggers.push((trigger_set, attribute.clone()));
                    }
                }
            }
        }
        *self.computed_triggers.write().unwrap() = triggers;
    }

    /// Windowed-reducer ids whose `apply` never propagates: only a
    /// scheduled `get` call (C7) produces a value for these (§4.5).
    const WINDOWED_REDUCER_IDS: [&'static str; 4] = ["mean", "min", "max", "standardDeviation"];

    async fn ensure_pipeline(&self, attribute: &str, policy: &DevicePolicy) -> Result<()> {
        if self.pipelines.read().unwrap().contains_key(attribute) {
            return Ok(());
        }
        let defs = policy.pipeline_for(attribute).ok_or_else(|| {
            DeviceError::Policy(edgepolicy_policy_engine::PolicyError::PipelineConfiguration(format!(
                "no pipeline configured for attribute {attribute}"
            )))
        })?;
        let mut built: Vec<Arc<dyn PolicyFunction>> = Vec::with_capacity(defs.len());
        for (index, def) in defs.iter().enumerate() {
            let function: Arc<dyn PolicyFunction> = Arc::from(self.function_registry.build(&def.id, &def.parameters)?);
            if Self::WINDOWED_REDUCER_IDS.contains(&def.id.as_str()) {
                let window_ms = def.parameters.get("window").and_then(|v| v.as_f64()).unwrap_or(0.0) as i64;
                let slide_ms = def.parameters.get("slide").and_then(|v| v.as_f64()).unwrap_or(0.0) as i64;
                self.scheduler
                    .add_timed_policy_data(window_ms, slide_ms, attribute.to_string(), Arc::clone(&function), index + 1)
                    .await?;
                self.scheduled_windows.write().unwrap().insert(attribute.to_string(), (window_ms, slide_ms));
            }
            built.push(function);
        }
        self.pipelines.write().unwrap().insert(attribute.to_string(), built);
        Ok(())
    }

    async fn run_attribute_pipeline(&self, attribute: &str, start_index: usize, value: AttributeValue) -> Result<PipelineOutcome> {
        let ctx = VirtualDeviceContext::new(self);
        let outcome_value = {
            let pipelines = self.pipelines.read().unwrap();
            let chain = pipelines.get(attribute).ok_or_else(|| {
                DeviceError::Policy(edgepolicy_policy_engine::PolicyError::PipelineConfiguration(format!(
                    "no built pipeline for attribute {attribute}"
                )))
            })?;
            let mut current = Some(value);
            for func in chain.iter().skip(start_index) {
                let v = match current.take() {
                    Some(v) => v,
                    None => break,
                };
                if !func.apply(&ctx, v) {
                    break;
                }
                current = func.get(&ctx);
                if let Some(ref cv) = current {
                    self.in_process.write().unwrap().insert(attribute.to_string(), cv.clone());
                }
            }
            current
        };
        Ok(PipelineOutcome {
            value: outcome_value,
            actions: ctx.actions.into_inner().unwrap(),
            alerts: ctx.alerts.into_inner().unwrap(),
            persisted: ctx.persisted.into_inner().unwrap(),
        })
    }

    async fn flush_pipelines(&self) -> Result<Vec<Message>> {
        let ctx = VirtualDeviceContext::new(self);
        let flushed: Vec<(String, AttributeValue)> = {
            let pipelines = self.pipelines.read().unwrap();
            pipelines
                .iter()
                .filter_map(|(attribute, chain)| {
                    chain.last().and_then(|last| last.get(&ctx)).map(|value| (attribute.clone(), value))
                })
                .collect()
        };
        let messages: Vec<Message> = flushed
            .into_iter()
            .map(|(attribute, value)| {
                let mut fields = HashMap::new();
                fields.insert(attribute, value);
                self.build_data_message(fields)
            })
            .collect();
        if !messages.is_empty() {
            self.gateway.queue_all(messages.clone()).await?;
        }
        Ok(messages)
    }

    async fn dispatch_side_effects(
        &self,
        alerts: Vec<(String, AlertSeverity, HashMap<String, AttributeValue>)>,
        actions: Vec<(String, HashMap<String, serde_json::Value>)>,
        persisted: Vec<(String, AttributeValue)>,
    ) -> Result<()> {
        for (name, arguments) in actions {
            tracing::info!(endpoint = %self.endpoint_id, action = %name, ?arguments, "policy action queued");
        }
        if !alerts.is_empty() {
            let messages = alerts
                .into_iter()
                .map(|(urn, severity, fields)| self.build_alert_message(urn, severity, None, fields))
                .collect();
            self.gateway.queue_all(messages).await?;
        }
        if !persisted.is_empty() {
            let store = self.persistence.get("batches").await;
            let mut tx = store.open_transaction();
            for (attribute, value) in persisted {
                let key = format!("{}/{attribute}", self.endpoint_id.as_str());
                let scalar: Scalar = value.into();
                let bytes = serde_json::to_vec(&scalar).map_err(|e| DeviceError::Persistence(e.to_string()))?;
                tx.put_opaque(key, bytes);
            }
            tx.commit().await.map_err(|e| DeviceError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    async fn apply_computed_triggers(
        &self,
        updated: &HashMap<String, AttributeValue>,
        data: &mut HashMap<String, AttributeValue>,
    ) -> Result<()> {
        let updated_keys: HashSet<&str> = updated.keys().map(String::as_str).collect();
        let triggers = self.computed_triggers.read().unwrap().clone();
        for (trigger_set, target) in triggers {
            if updated.contains_key(&target) {
                // The target attribute was itself just set directly; a
                // computed metric never overrides a direct write.
                continue;
            }
            if !trigger_set.iter().all(|a| updated_keys.contains(a.as_str())) {
                continue;
            }
            let Some(policy) = self.policy.read().unwrap().clone() else { continue };
            self.ensure_pipeline(&target, &policy).await?;
            let outcome = self.run_attribute_pipeline(&target, 0, AttributeValue::Number(0.0)).await?;
            self.dispatch_side_effects(outcome.alerts, outcome.actions, outcome.persisted).await?;
            if let Some(v) = outcome.value {
                self.attributes.write().unwrap().insert(target.clone(), v.clone());
                data.insert(target, v);
            }
        }
        Ok(())
    }

    fn next_ordinal(&self) -> Ordinal {
        self.ordinal.lock().unwrap().next()
    }

    fn build_data_message(&self, fields: HashMap<String, AttributeValue>) -> Message {
        let mut properties = HashMap::new();
        properties.insert("ordinal".to_string(), vec![self.next_ordinal().value().to_string()]);
        Message {
            id: uuid::Uuid::now_v7(),
            client_id: uuid::Uuid::now_v7(),
            source: self.endpoint_id.as_str().to_string(),
            destination: "server".to_string(),
            priority: Priority::Lowest,
            reliability: Reliability::BestEffort,
            event_time: chrono::Utc::now().timestamp_millis(),
            sender: self.endpoint_id.as_str().to_string(),
            direction: Direction::FromDevice,
            properties,
            diagnostics: HashMap::new(),
            received_time: None,
            sent_time: None,
            payload: Payload::Data {
                format: self.device_model.urn.clone(),
                data: fields.into_iter().map(|(k, v)| (k, Scalar::from(v))).collect(),
            },
        }
    }

    fn build_alert_message(
        &self,
        format_urn: String,
        severity: AlertSeverity,
        description: Option<String>,
        fields: HashMap<String, AttributeValue>,
    ) -> Message {
        let mut properties = HashMap::new();
        properties.insert("ordinal".to_string(), vec![self.next_ordinal().value().to_string()]);
        Message {
            id: uuid::Uuid::now_v7(),
            client_id: uuid::Uuid::now_v7(),
            source: self.endpoint_id.as_str().to_string(),
            destination: "server".to_string(),
            priority: Priority::Highest,
            reliability: Reliability::BestEffort,
            event_time: chrono::Utc::now().timestamp_millis(),
            sender: self.endpoint_id.as_str().to_string(),
            direction: Direction::FromDevice,
            properties,
            diagnostics: HashMap::new(),
            received_time: None,
            sent_time: None,
            payload: Payload::Alert {
                format: format_urn,
                description,
                severity,
                data: fields.into_iter().map(|(k, v)| (k, Scalar::from(v))).collect(),
            },
        }
    }

    async fn emit_data_message(&self, fields: HashMap<String, AttributeValue>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let message = self.build_data_message(fields);
        self.gateway.queue(message).await
    }

    /// Applies a batch of already-final values, bypassing policy (§4.8
    /// `update(map)`). Still drives the computed-metric trigger map.
    pub async fn update(&self, values: HashMap<String, AttributeValue>) -> Result<()> {
        if self.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        for (name, value) in &values {
            let attribute = self
                .device_model
                .attributes
                .get(name)
                .ok_or_else(|| DeviceError::UnknownAttribute(name.clone()))?;
            validate_value(name, attribute, value)?;
        }
        {
            let mut attrs = self.attributes.write().unwrap();
            for (name, value) in &values {
                attrs.insert(name.clone(), value.clone());
            }
        }
        let mut data = values.clone();
        self.apply_computed_triggers(&values, &mut data).await?;
        self.emit_data_message(data).await
    }

    /// Offers one value for the policy pipeline to consider (§4.8
    /// `offer(name, value)`). With no assigned policy this is equivalent
    /// to `update({name: value})`.
    pub async fn offer(&self, name: &str, value: AttributeValue) -> Result<()> {
        if self.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        let attribute = self
            .device_model
            .attributes
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceError::UnknownAttribute(name.to_string()))?;
        validate_value(name, &attribute, &value)?;
        self.attributes.write().unwrap().insert(name.to_string(), value.clone());

        let policy = self.policy.read().unwrap().clone();
        let Some(policy) = policy else {
            let mut updated = HashMap::new();
            updated.insert(name.to_string(), value);
            let mut data = updated.clone();
            self.apply_computed_triggers(&updated, &mut data).await?;
            return self.emit_data_message(data).await;
        };

        self.ensure_pipeline(name, &policy).await?;
        let outcome = self.run_attribute_pipeline(name, 0, value.clone()).await?;
        self.dispatch_side_effects(outcome.alerts, outcome.actions, outcome.persisted).await?;

        let mut data = HashMap::new();
        if let Some(v) = outcome.value {
            data.insert(name.to_string(), v);
        }
        let mut updated = HashMap::new();
        updated.insert(name.to_string(), value);
        self.apply_computed_triggers(&updated, &mut data).await?;
        self.emit_data_message(data).await
    }

    /// Builder for an alert against a `DeviceModelFormat` of kind `ALERT`
    /// (§4.8 `create_alert`).
    pub fn create_alert(self: &Arc<Self>, format_urn: impl Into<String>) -> AlertBuilder {
        AlertBuilder {
            device: Arc::clone(self),
            format_urn: format_urn.into(),
            severity: AlertSeverity::Significant,
            description: None,
            fields: HashMap::new(),
        }
    }

    /// Translates a server-originated REQUEST message into `update()`
    /// calls and produces the corresponding RESPONSE message (§4.8, §4.9).
    pub async fn handle_request(&self, request: &Message) -> Result<Message> {
        let Payload::Request { body, .. } = &request.payload else {
            return Err(DeviceError::Gateway("expected a REQUEST message".to_string()));
        };
        let decoded = base64::engine::general_purpose::STANDARD.decode(body).map_err(|e| DeviceError::Parse {
            code: edgepolicy_core::ParseErrorCode::WrongStructure,
            message: e.to_string(),
        })?;
        let raw_values: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&decoded).map_err(|e| DeviceError::Parse {
                code: edgepolicy_core::ParseErrorCode::WrongStructure,
                message: e.to_string(),
            })?;
        let mut values = HashMap::with_capacity(raw_values.len());
        for (name, raw) in raw_values {
            values.insert(name, json_to_attribute_value(&raw)?);
        }

        let status_code = match self.update(values).await {
            Ok(()) => 200,
            Err(err) => {
                tracing::warn!(endpoint = %self.endpoint_id, error = %err, "server request translation failed");
                400
            }
        };
        Ok(self.gateway.build_response_message(request, status_code, HashMap::new(), String::new()))
    }
}

fn json_to_attribute_value(raw: &serde_json::Value) -> Result<AttributeValue> {
    match raw {
        serde_json::Value::Number(n) => Ok(AttributeValue::Number(n.as_f64().unwrap_or(f64::NAN))),
        serde_json::Value::Bool(b) => Ok(AttributeValue::Boolean(*b)),
        serde_json::Value::String(s) => Ok(AttributeValue::String(s.clone())),
        other => Err(DeviceError::Parse {
            code: edgepolicy_core::ParseErrorCode::WrongStructure,
            message: format!("unsupported attribute value in request body: {other}"),
        }),
    }
}

/// Builder returned by `VirtualDeviceCore::create_alert`.
pub struct AlertBuilder {
    device: Arc<VirtualDeviceCore>,
    format_urn: String,
    severity: AlertSeverity,
    description: Option<String>,
    fields: HashMap<String, AttributeValue>,
}

impl AlertBuilder {
    pub fn with_field(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Dispatches the alert through the message gateway. Fails if
    /// `format_urn` is unknown or is not an `ALERT`-kind format.
    pub async fn raise(self) -> Result<()> {
        let format = self
            .device
            .device_model
            .formats
            .get(&self.format_urn)
            .ok_or_else(|| DeviceError::UnknownFormat(self.format_urn.clone()))?;
        if format.kind != FormatKind::Alert {
            return Err(DeviceError::NotAnAlertFormat(self.format_urn.clone()));
        }
        let message = self
            .device
            .build_alert_message(self.format_urn, self.severity, self.description, self.fields);
        self.device.gateway.queue(message).await
    }
}

#[async_trait]
impl WindowSink for VirtualDeviceCore {
    /// Continues the recorded pipeline from `resume_at_index`, feeding in
    /// the scheduled dispatcher's reduced value, and emits a data message
    /// if a value survives to the end of the chain.
    async fn deliver_scheduled_value(
        &self,
        endpoint: &EndpointId,
        _device_model: &DeviceModelUrn,
        attribute: &str,
        resume_at_index: usize,
        value: f64,
    ) {
        if endpoint != &self.endpoint_id || self.is_cancelled() {
            return;
        }
        match self
            .run_attribute_pipeline(attribute, resume_at_index, AttributeValue::Number(value))
            .await
        {
            Ok(outcome) => {
                if let Err(err) = self
                    .dispatch_side_effects(outcome.alerts, outcome.actions, outcome.persisted)
                    .await
                {
                    tracing::warn!(%attribute, error = %err, "scheduled window side-effect dispatch failed");
                }
                if let Some(v) = outcome.value {
                    let mut fields = HashMap::new();
                    fields.insert(attribute.to_string(), v);
                    if let Err(err) = self.emit_data_message(fields).await {
                        tracing::warn!(%attribute, error = %err, "scheduled window delivery failed");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%attribute, error = %err, "scheduled window pipeline resume failed");
            }
        }
    }
}
