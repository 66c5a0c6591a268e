//! Process-wide virtual device registry and the policy-change listener that
//! drives `VirtualDeviceCore::set_policy` from it (§9 design note: listeners
//! hold only the device id they act on and look the virtual device up
//! through a process-wide registry). This breaks what would otherwise be a
//! cyclic reference between the device policy manager (C6, which only
//! knows how to notify listeners) and the virtual device core (C8, which
//! would otherwise need to be looked up through the manager).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use edgepolicy_core::types::{DeviceId, PolicyId};
use edgepolicy_policy_engine::{DevicePolicy, PolicyChangeListener};

use crate::virtual_device::VirtualDeviceCore;

/// Keyed by `DeviceId`: for a directly-connected device this is the same
/// string as its `EndpointId`; for a gateway-reported device it is the id
/// the gateway uses to refer to it.
#[derive(Default)]
pub struct VirtualDeviceRegistry {
    devices: RwLock<HashMap<DeviceId, Arc<VirtualDeviceCore>>>,
}

impl VirtualDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device_id: DeviceId, device: Arc<VirtualDeviceCore>) {
        self.devices.write().unwrap().insert(device_id, device);
    }

    pub fn unregister(&self, device_id: &DeviceId) {
        self.devices.write().unwrap().remove(device_id);
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<Arc<VirtualDeviceCore>> {
        self.devices.read().unwrap().get(device_id).cloned()
    }
}

/// Thin `PolicyChangeListener` that holds only a registry handle, never the
/// device policy manager itself, so C6 and C8 never reference each other
/// directly.
pub struct EndpointPolicyListener {
    registry: Arc<VirtualDeviceRegistry>,
}

impl EndpointPolicyListener {
    pub fn new(registry: Arc<VirtualDeviceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PolicyChangeListener for EndpointPolicyListener {
    async fn policy_assigned(&self, policy: Arc<DevicePolicy>, devices: Vec<DeviceId>) {
        for device_id in devices {
            if let Some(device) = self.registry.get(&device_id) {
                if let Err(err) = device.set_policy(Some(Arc::clone(&policy))).await {
                    tracing::warn!(device = %device_id, error = %err, "failed to assign policy to virtual device");
                }
            }
        }
    }

    async fn policy_unassigned(&self, _policy_id: PolicyId, devices: Vec<DeviceId>) {
        for device_id in devices {
            if let Some(device) = self.registry.get(&device_id) {
                if let Err(err) = device.set_policy(None).await {
                    tracing::warn!(device = %device_id, error = %err, "failed to unassign policy from virtual device");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    use edgepolicy_core::types::EndpointId;
    use edgepolicy_policy_engine::device_model::{DeviceModel, DeviceModelAttribute};
    use edgepolicy_policy_engine::FunctionRegistry;

    use crate::message::{Message, MessageGateway, RequestHandler};
    use crate::persistence::PersistenceStoreRegistry;
    use edgepolicy_core::types::{Access, ValueType};
    use std::collections::HashMap as StdMap;

    struct NullGateway;

    #[async_trait]
    impl MessageGateway for NullGateway {
        async fn queue(&self, _message: Message) -> crate::error::Result<()> {
            Ok(())
        }
        async fn queue_all(&self, _messages: Vec<Message>) -> crate::error::Result<()> {
            Ok(())
        }
        async fn register_request_handler(
            &self,
            _endpoint: EndpointId,
            _url_pattern: String,
            _handler: StdArc<dyn RequestHandler>,
        ) -> crate::error::Result<()> {
            Ok(())
        }
        fn build_response_message(
            &self,
            _request: &Message,
            _status_code: u16,
            _headers: StdMap<String, Vec<String>>,
            _body: String,
        ) -> Message {
            unimplemented!()
        }
    }

    fn model() -> Arc<DeviceModel> {
        let mut attributes = StdMap::new();
        attributes.insert(
            "celsius".to_string(),
            DeviceModelAttribute {
                name: "celsius".to_string(),
                urn: "urn:attr:celsius".to_string(),
                access: Access::ReadWrite,
                value_type: Some(ValueType::Number),
                lower_bound: None,
                upper_bound: None,
                default_value: None,
            },
        );
        Arc::new(DeviceModel {
            urn: "urn:model:thermostat".to_string(),
            attributes,
            actions: StdMap::new(),
            formats: StdMap::new(),
        })
    }

    fn policy_with_no_pipelines() -> Arc<DevicePolicy> {
        let json = r#"{"id":"p1","deviceModelUrn":"urn:model:thermostat","lastModified":1,"pipelines":{}}"#;
        Arc::new(DevicePolicy::parse(json).unwrap())
    }

    #[tokio::test]
    async fn assign_and_unassign_reach_the_registered_device() {
        let registry = Arc::new(VirtualDeviceRegistry::new());
        let device = VirtualDeviceCore::new(
            EndpointId::new("dev-1"),
            model(),
            Arc::new(FunctionRegistry::with_defaults()),
            Arc::new(NullGateway),
            Arc::new(PersistenceStoreRegistry::new()),
        );
        registry.register(DeviceId::new("dev-1"), Arc::clone(&device));

        let listener = EndpointPolicyListener::new(Arc::clone(&registry));
        let policy = policy_with_no_pipelines();
        listener.policy_assigned(Arc::clone(&policy), vec![DeviceId::new("dev-1")]).await;
        listener.policy_unassigned(policy.id.clone(), vec![DeviceId::new("dev-1")]).await;

        // No policy assigned to "dev-2": looked up, found nothing, no panic.
        listener.policy_assigned(policy, vec![DeviceId::new("dev-2")]).await;
    }
}
