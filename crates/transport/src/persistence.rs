//! `MessagePersistence` implementation (§4.9): a per-endpoint store for
//! messages that ran out of retry budget before they could be delivered.
//! Default is a plain in-memory map, the same way the Persistence Store's
//! `NamedStore` is in-memory by default (C3) with a durable backend left
//! as a swap-in for later.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use edgepolicy_core::types::EndpointId;
use edgepolicy_device_core::error::Result as DeviceResult;
use edgepolicy_device_core::{Message, MessagePersistence};

#[derive(Default)]
pub struct InMemoryMessagePersistence {
    by_endpoint: RwLock<HashMap<EndpointId, Vec<Message>>>,
}

impl InMemoryMessagePersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagePersistence for InMemoryMessagePersistence {
    async fn save(&self, endpoint: &EndpointId, messages: &[Message]) -> DeviceResult<()> {
        self.by_endpoint
            .write()
            .await
            .entry(endpoint.clone())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn load(&self, endpoint: &EndpointId) -> DeviceResult<Vec<Message>> {
        Ok(self.by_endpoint.read().await.get(endpoint).cloned().unwrap_or_default())
    }

    async fn delete(&self, messages: &[Message]) -> DeviceResult<()> {
        let ids: std::collections::HashSet<_> = messages.iter().map(|m| m.id).collect();
        let mut by_endpoint = self.by_endpoint.write().await;
        for stored in by_endpoint.values_mut() {
            stored.retain(|m| !ids.contains(&m.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgepolicy_device_core::{Direction, Payload, Priority, Reliability};

    fn message(source: &str) -> Message {
        Message {
            id: uuid::Uuid::now_v7(),
            client_id: uuid::Uuid::now_v7(),
            source: source.to_string(),
            destination: "cloud".to_string(),
            priority: Priority::Normal,
            reliability: Reliability::NoGuarantee,
            event_time: 0,
            sender: source.to_string(),
            direction: Direction::FromDevice,
            properties: HashMap::new(),
            diagnostics: HashMap::new(),
            received_time: None,
            sent_time: None,
            payload: Payload::Data { format: "f".to_string(), data: HashMap::new() },
        }
    }

    #[tokio::test]
    async fn save_load_delete_round_trip() {
        let store = InMemoryMessagePersistence::new();
        let endpoint = EndpointId::new("dev-1");
        let msg = message("dev-1");
        store.save(&endpoint, std::slice::from_ref(&msg)).await.unwrap();

        let loaded = store.load(&endpoint).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, msg.id);

        store.delete(std::slice::from_ref(&msg)).await.unwrap();
        assert!(store.load(&endpoint).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_unknown_endpoint_is_empty() {
        let store = InMemoryMessagePersistence::new();
        let loaded = store.load(&EndpointId::new("nope")).await.unwrap();
        assert!(loaded.is_empty());
    }
}
