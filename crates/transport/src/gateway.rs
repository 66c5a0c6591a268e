//! `MessageGateway`/`MessagePersistence` implementation (§4.9, §6): queues
//! messages for delivery to the cloud-side policy server, retrying failed
//! sends against the remaining-retries budget and falling back to
//! persistence when a message's budget is exhausted before it can be
//! delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use edgepolicy_core::types::EndpointId;
use edgepolicy_device_core::error::Result as DeviceResult;
use edgepolicy_device_core::{Message, MessageGateway, MessagePersistence, Payload, RequestHandler};

use crate::retry::RetryBudget;
use crate::TransportError;

/// Sends one message to the cloud-side policy server and reports whether it
/// arrived. Kept as a trait so `HttpMessageGateway`'s queueing/retry/ordinal
/// logic can be exercised in tests without a live HTTP endpoint, the same
/// way `PolicyServerClient` is faked in the policy-engine crate's tests.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), TransportError>;
}

/// Posts a message to the cloud REST surface's message-submission endpoint,
/// authenticated the same way as `HttpPolicyServerClient` (§6).
pub struct HttpMessageSender<I> {
    http: reqwest::Client,
    base_url: String,
    identity: I,
}

impl<I: crate::rest_client::RequestIdentity> HttpMessageSender<I> {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, identity: I) -> Self {
        Self { http, base_url: base_url.into(), identity }
    }
}

#[async_trait]
impl<I: crate::rest_client::RequestIdentity + Send + Sync> MessageSender for HttpMessageSender<I> {
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.identity.bearer_token()))
            .header("X-EndpointId", self.identity.endpoint_id())
            .json(message)
            .send()
            .await
            .map_err(|source| TransportError::Request { url: url.clone(), source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { url, status: status.as_u16(), body });
        }
        Ok(())
    }
}

/// Per-endpoint monotonic ordinal establishing the message sort key (§5),
/// wrapping at `i64::MAX` rather than panicking on overflow.
#[derive(Default)]
struct Ordinals {
    counters: HashMap<EndpointId, AtomicI64>,
}

impl Ordinals {
    fn next(&mut self, endpoint: &EndpointId) -> i64 {
        let counter = self.counters.entry(endpoint.clone()).or_insert_with(|| AtomicI64::new(0));
        let value = counter.fetch_add(1, Ordering::SeqCst);
        if value == i64::MAX {
            counter.store(0, Ordering::SeqCst);
        }
        value
    }
}

pub struct HttpMessageGateway<S> {
    sender: S,
    persistence: Arc<dyn MessagePersistence>,
    handlers: RwLock<HashMap<(EndpointId, String), Arc<dyn RequestHandler>>>,
    ordinals: std::sync::Mutex<Ordinals>,
}

impl<S: MessageSender> HttpMessageGateway<S> {
    pub fn new(sender: S, persistence: Arc<dyn MessagePersistence>) -> Self {
        Self {
            sender,
            persistence,
            handlers: RwLock::new(HashMap::new()),
            ordinals: std::sync::Mutex::new(Ordinals::default()),
        }
    }

    fn source_endpoint(message: &Message) -> EndpointId {
        EndpointId::new(message.source.clone())
    }

    /// Attempts delivery up to the message's reliability-derived retry
    /// budget (§6), falling back to persistence if every attempt fails.
    async fn deliver_with_retry(&self, message: Message) -> DeviceResult<()> {
        let endpoint = Self::source_endpoint(&message);
        let mut budget = RetryBudget::for_reliability(message.reliability);
        loop {
            match self.sender.send(&message).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        message_id = %message.id,
                        attempt = budget.attempts(),
                        error = %err,
                        "message delivery failed"
                    );
                    if !budget.consume() {
                        tracing::warn!(endpoint = %endpoint, message_id = %message.id, "retry budget exhausted, persisting for later");
                        return self
                            .persistence
                            .save(&endpoint, std::slice::from_ref(&message))
                            .await;
                    }
                    tokio::time::sleep(RetryBudget::backoff_for_attempt(budget.attempts())).await;
                }
            }
        }
    }

    /// Orders by descending priority, breaking ties by each message's
    /// per-endpoint ordinal so equal-priority messages from the same
    /// source are never reordered relative to each other (§5).
    fn order_for_send(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut tagged: Vec<(i64, Message)> = {
            let mut ordinals = self.ordinals.lock().unwrap();
            messages
                .into_iter()
                .map(|m| {
                    let endpoint = Self::source_endpoint(&m);
                    (ordinals.next(&endpoint), m)
                })
                .collect()
        };
        tagged.sort_by(|(ord_a, a), (ord_b, b)| b.priority.cmp(&a.priority).then(ord_a.cmp(ord_b)));
        tagged.into_iter().map(|(_, m)| m).collect()
    }
}

#[async_trait]
impl<S: MessageSender + 'static> MessageGateway for HttpMessageGateway<S> {
    async fn queue(&self, message: Message) -> DeviceResult<()> {
        self.deliver_with_retry(message).await
    }

    async fn queue_all(&self, messages: Vec<Message>) -> DeviceResult<()> {
        for message in self.order_for_send(messages) {
            self.deliver_with_retry(message).await?;
        }
        Ok(())
    }

    async fn register_request_handler(
        &self,
        endpoint: EndpointId,
        url_pattern: String,
        handler: Arc<dyn RequestHandler>,
    ) -> DeviceResult<()> {
        self.handlers.write().await.insert((endpoint, url_pattern), handler);
        Ok(())
    }

    fn build_response_message(
        &self,
        request: &Message,
        status_code: u16,
        headers: HashMap<String, Vec<String>>,
        body: String,
    ) -> Message {
        Message {
            id: uuid::Uuid::now_v7(),
            client_id: request.client_id,
            source: request.destination.clone(),
            destination: request.source.clone(),
            priority: request.priority,
            reliability: request.reliability,
            event_time: request.event_time,
            sender: request.sender.clone(),
            direction: edgepolicy_device_core::Direction::FromDevice,
            properties: HashMap::new(),
            diagnostics: HashMap::new(),
            received_time: None,
            sent_time: None,
            payload: Payload::Response {
                status_code,
                url: match &request.payload {
                    Payload::Request { url, .. } => url.clone(),
                    _ => String::new(),
                },
                request_id: request.id.to_string(),
                headers,
                body,
            },
        }
    }
}

impl<S> HttpMessageGateway<S> {
    /// Looks up the registered handler whose `url_pattern` matches the
    /// request's url and endpoint, dispatching to it. `None` if nothing
    /// was registered for this (endpoint, url) pair.
    pub async fn find_handler(
        &self,
        endpoint: &EndpointId,
        url: &str,
    ) -> Option<Arc<dyn RequestHandler>> {
        let handlers = self.handlers.read().await;
        handlers
            .iter()
            .find(|((e, pattern), _)| e == endpoint && url_matches(pattern, url))
            .map(|(_, handler)| Arc::clone(handler))
    }

    /// Dispatches a server-originated REQUEST message to its registered
    /// handler and returns the RESPONSE it produces, or a transport error
    /// if no handler was ever registered for this (endpoint, url) pair.
    pub async fn dispatch_request(&self, endpoint: &EndpointId, request: &Message) -> DeviceResult<Message> {
        let url = match &request.payload {
            Payload::Request { url, .. } => url.clone(),
            _ => return Err(edgepolicy_device_core::error::DeviceError::Gateway(
                "dispatch_request called on a non-REQUEST message".to_string(),
            )),
        };
        match self.find_handler(endpoint, &url).await {
            Some(handler) => handler.handle(request).await,
            None => Err(crate::TransportError::NoHandlerRegistered {
                endpoint: endpoint.as_str().to_string(),
                url,
            }
            .into()),
        }
    }
}

/// `*` matches any url; anything else is matched literally. The cloud
/// surface never documents glob syntax beyond a full wildcard, so that's
/// all this supports.
fn url_matches(pattern: &str, url: &str) -> bool {
    pattern == "*" || pattern == url
}

/// `RequestHandler` that forwards to a virtual device's own
/// `handle_request`, holding only a `Weak` reference the same way
/// `WeakDeviceSink` does for the scheduled-window dispatcher, so that
/// registering this handler with the gateway never keeps the device alive
/// past its own lifetime.
pub struct DeviceRequestHandler(std::sync::Weak<edgepolicy_device_core::VirtualDeviceCore>);

impl DeviceRequestHandler {
    pub fn new(device: &Arc<edgepolicy_device_core::VirtualDeviceCore>) -> Self {
        Self(Arc::downgrade(device))
    }
}

#[async_trait]
impl RequestHandler for DeviceRequestHandler {
    async fn handle(&self, request: &Message) -> DeviceResult<Message> {
        match self.0.upgrade() {
            Some(device) => device.handle_request(request).await,
            None => Err(edgepolicy_device_core::error::DeviceError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use edgepolicy_device_core::{Direction, Priority, Reliability};

    struct FlakySender {
        fail_times: AtomicUsize,
    }

    #[async_trait]
    impl MessageSender for FlakySender {
        async fn send(&self, _message: &Message) -> Result<(), TransportError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(TransportError::Status {
                    url: "test".into(),
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(())
        }
    }

    struct AlwaysFailSender;

    #[async_trait]
    impl MessageSender for AlwaysFailSender {
        async fn send(&self, _message: &Message) -> Result<(), TransportError> {
            Err(TransportError::Status { url: "test".into(), status: 500, body: "down".into() })
        }
    }

    #[derive(Default)]
    struct RecordingPersistence {
        saved: tokio::sync::Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl MessagePersistence for RecordingPersistence {
        async fn save(&self, _endpoint: &EndpointId, messages: &[Message]) -> DeviceResult<()> {
            self.saved.lock().await.extend_from_slice(messages);
            Ok(())
        }
        async fn load(&self, _endpoint: &EndpointId) -> DeviceResult<Vec<Message>> {
            Ok(self.saved.lock().await.clone())
        }
        async fn delete(&self, _messages: &[Message]) -> DeviceResult<()> {
            Ok(())
        }
    }

    fn data_message(priority: Priority) -> Message {
        Message {
            id: uuid::Uuid::now_v7(),
            client_id: uuid::Uuid::now_v7(),
            source: "dev-1".to_string(),
            destination: "cloud".to_string(),
            priority,
            reliability: Reliability::BestEffort,
            event_time: 0,
            sender: "dev-1".to_string(),
            direction: Direction::FromDevice,
            properties: HashMap::new(),
            diagnostics: HashMap::new(),
            received_time: None,
            sent_time: None,
            payload: Payload::Data { format: "f".to_string(), data: HashMap::new() },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds_within_budget() {
        let sender = FlakySender { fail_times: AtomicUsize::new(2) };
        let gateway =
            HttpMessageGateway::new(sender, Arc::new(RecordingPersistence::default()) as Arc<dyn MessagePersistence>);
        gateway.queue(data_message(Priority::Normal)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_persists_message() {
        let persistence = Arc::new(RecordingPersistence::default());
        let gateway = HttpMessageGateway::new(AlwaysFailSender, Arc::clone(&persistence) as Arc<dyn MessagePersistence>);
        gateway.queue(data_message(Priority::Low)).await.unwrap();
        assert_eq!(persistence.saved.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn order_for_send_keeps_equal_priority_stable() {
        let gateway =
            HttpMessageGateway::new(AlwaysFailSender, Arc::new(RecordingPersistence::default()) as Arc<dyn MessagePersistence>);
        let low1 = data_message(Priority::Low);
        let low1_id = low1.id;
        let high = data_message(Priority::High);
        let high_id = high.id;
        let low2 = data_message(Priority::Low);
        let low2_id = low2.id;
        let ordered = gateway.order_for_send(vec![low1, high, low2]);
        assert_eq!(ordered[0].id, high_id);
        assert_eq!(ordered[1].id, low1_id);
        assert_eq!(ordered[2].id, low2_id);
    }

    #[test]
    fn url_pattern_wildcard_matches_anything() {
        assert!(url_matches("*", "/anything"));
        assert!(url_matches("/exact", "/exact"));
        assert!(!url_matches("/exact", "/other"));
    }
}
