//! Device Policy Manager (C6): the three-way-consistent policy mappings and
//! server-driven change processing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use edgepolicy_core::types::{DeviceId, DeviceModelUrn, PolicyId};
use tokio::sync::RwLock;

use crate::device_model::DeviceModel;
use crate::error::Result;
use crate::policy::DevicePolicy;

/// The four consumed REST endpoints (§6), modeled as a collaborator seam so
/// C6's download/refresh paths are testable without a real HTTP stack.
#[async_trait]
pub trait PolicyServerClient: Send + Sync {
    async fn get_device_model(&self, urn: &DeviceModelUrn) -> Result<DeviceModel>;
    async fn get_policy(&self, urn: &DeviceModelUrn, policy_id: &PolicyId) -> Result<DevicePolicy>;
    async fn get_policy_for_device(
        &self,
        urn: &DeviceModelUrn,
        device_id: &DeviceId,
    ) -> Result<Option<DevicePolicy>>;
    /// Lists the devices a gateway currently reports as assigned to
    /// `policy_id`. Returns an empty list for a directly-connected device
    /// (no gateway to ask).
    async fn get_indirectly_connected_devices(
        &self,
        urn: &DeviceModelUrn,
        policy_id: &PolicyId,
        gateway_id: &DeviceId,
    ) -> Result<Vec<DeviceId>>;
}

#[async_trait]
pub trait PolicyChangeListener: Send + Sync {
    async fn policy_assigned(&self, policy: Arc<DevicePolicy>, devices: Vec<DeviceId>);
    async fn policy_unassigned(&self, policy_id: PolicyId, devices: Vec<DeviceId>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Changed,
    Assigned,
    Unassigned,
}

#[derive(Debug, Clone)]
pub struct PolicyChangeItem {
    pub device_model_urn: DeviceModelUrn,
    pub policy_id: PolicyId,
    pub last_modified: i64,
    pub op: ChangeOp,
}

struct CachedPolicy {
    policy: Arc<DevicePolicy>,
    last_modified: i64,
}

/// Owns the three mappings described in §3/§4.6 and keeps them consistent:
/// `by_id`, `by_device` (`None` means "looked up, has no policy"), and
/// `by_model`.
pub struct DevicePolicyManager {
    server: Arc<dyn PolicyServerClient>,
    by_id: RwLock<HashMap<PolicyId, CachedPolicy>>,
    by_device: RwLock<HashMap<DeviceId, HashMap<DeviceModelUrn, Option<PolicyId>>>>,
    by_model: RwLock<HashMap<DeviceModelUrn, HashMap<PolicyId, HashSet<DeviceId>>>>,
    listeners: RwLock<Vec<Arc<dyn PolicyChangeListener>>>,
}

impl DevicePolicyManager {
    pub fn new(server: Arc<dyn PolicyServerClient>) -> Self {
        Self {
            server,
            by_id: RwLock::new(HashMap::new()),
            by_device: RwLock::new(HashMap::new()),
            by_model: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_change_listener(&self, listener: Arc<dyn PolicyChangeListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Looks up the policy assigned to `device_id` under `urn`, downloading
    /// and caching it on first touch. Returns `None` for "known to have no
    /// policy" as well as for a fresh device we haven't resolved yet.
    pub async fn get_policy(
        &self,
        urn: &DeviceModelUrn,
        device_id: &DeviceId,
    ) -> Result<Option<Arc<DevicePolicy>>> {
        if let Some(entry) = self.by_device.read().await.get(device_id).and_then(|m| m.get(urn)) {
            return Ok(match entry {
                Some(policy_id) => self.by_id.read().await.get(policy_id).map(|c| Arc::clone(&c.policy)),
                None => None,
            });
        }

        let policy = self.server.get_policy_for_device(urn, device_id).await?;
        match policy {
            Some(policy) => {
                let policy = Arc::new(policy);
                self.insert_mapping(urn.clone(), device_id.clone(), Arc::clone(&policy))
                    .await;
                Ok(Some(policy))
            }
            None => {
                self.by_device
                    .write()
                    .await
                    .entry(device_id.clone())
                    .or_default()
                    .insert(urn.clone(), None);
                Ok(None)
            }
        }
    }

    async fn insert_mapping(&self, urn: DeviceModelUrn, device_id: DeviceId, policy: Arc<DevicePolicy>) {
        let policy_id = policy.id.clone();
        self.by_id.write().await.insert(
            policy_id.clone(),
            CachedPolicy {
                policy: Arc::clone(&policy),
                last_modified: policy.last_modified,
            },
        );
        self.by_device
            .write()
            .await
            .entry(device_id.clone())
            .or_default()
            .insert(urn.clone(), Some(policy_id.clone()));
        self.by_model
            .write()
            .await
            .entry(urn)
            .or_default()
            .entry(policy_id)
            .or_default()
            .insert(device_id);
    }

    /// Clears a bad mapping so the next `get_policy` self-corrects, per
    /// §4.6's "failure to reach the server converts to a bad-mapping state".
    async fn clear_mapping(&self, urn: &DeviceModelUrn, device_id: &DeviceId) {
        if let Some(models) = self.by_device.write().await.get_mut(device_id) {
            models.remove(urn);
        }
    }

    async fn notify_assigned(&self, policy: Arc<DevicePolicy>, devices: Vec<DeviceId>) {
        if devices.is_empty() {
            return;
        }
        for listener in self.listeners.read().await.iter() {
            listener.policy_assigned(Arc::clone(&policy), devices.clone()).await;
        }
    }

    async fn notify_unassigned(&self, policy_id: PolicyId, devices: Vec<DeviceId>) {
        if devices.is_empty() {
            return;
        }
        for listener in self.listeners.read().await.iter() {
            listener.policy_unassigned(policy_id.clone(), devices.clone()).await;
        }
    }

    /// Processes a server-driven change notification for a gateway or
    /// directly-connected device `dev` (§4.6).
    pub async fn policy_changed(&self, dev: DeviceId, items: Vec<PolicyChangeItem>) -> Result<()> {
        for item in items {
            match item.op {
                ChangeOp::Assigned => self.process_assigned(&dev, &item).await?,
                ChangeOp::Unassigned => self.process_unassigned(&dev, &item).await?,
                ChangeOp::Changed => self.process_changed(&dev, &item).await?,
            }
        }
        Ok(())
    }

    async fn affected_devices(&self, dev: &DeviceId, item: &PolicyChangeItem) -> Result<Vec<DeviceId>> {
        match self
            .server
            .get_indirectly_connected_devices(&item.device_model_urn, &item.policy_id, dev)
            .await
        {
            Ok(devices) if !devices.is_empty() => Ok(devices),
            Ok(_) => Ok(vec![dev.clone()]),
            Err(err) => {
                tracing::warn!(device = %dev, error = %err, "policy manager: ICD lookup failed, marking bad mapping");
                self.clear_mapping(&item.device_model_urn, dev).await;
                Err(err)
            }
        }
    }

    async fn process_assigned(&self, dev: &DeviceId, item: &PolicyChangeItem) -> Result<()> {
        let devices = self.affected_devices(dev, item).await?;
        let mut downloaded: Option<Arc<DevicePolicy>> = None;
        let mut updated = Vec::new();

        for device_id in devices {
            let current = self
                .by_device
                .read()
                .await
                .get(&device_id)
                .and_then(|m| m.get(&item.device_model_urn))
                .cloned()
                .flatten();
            let is_newer = match &current {
                Some(existing_id) => {
                    let existing_modified = self
                        .by_id
                        .read()
                        .await
                        .get(existing_id)
                        .map(|c| c.last_modified)
                        .unwrap_or(i64::MIN);
                    item.last_modified > existing_modified
                }
                None => true,
            };
            if !is_newer {
                continue;
            }

            let policy = match &downloaded {
                Some(p) => Arc::clone(p),
                None => {
                    let fetched = Arc::new(
                        self.server
                            .get_policy(&item.device_model_urn, &item.policy_id)
                            .await?,
                    );
                    downloaded = Some(Arc::clone(&fetched));
                    fetched
                }
            };

            self.insert_mapping(item.device_model_urn.clone(), device_id.clone(), Arc::clone(&policy))
                .await;
            updated.push(device_id);
        }

        if let Some(policy) = downloaded {
            self.notify_assigned(policy, updated).await;
        }
        Ok(())
    }

    async fn process_unassigned(&self, dev: &DeviceId, item: &PolicyChangeItem) -> Result<()> {
        let still_assigned: HashSet<DeviceId> = self
            .server
            .get_indirectly_connected_devices(&item.device_model_urn, &item.policy_id, dev)
            .await
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mapped: Vec<DeviceId> = self
            .by_model
            .read()
            .await
            .get(&item.device_model_urn)
            .and_then(|m| m.get(&item.policy_id))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut removed = Vec::new();
        for device_id in mapped {
            if still_assigned.contains(&device_id) {
                continue;
            }

            let current_policy_id = self
                .by_device
                .read()
                .await
                .get(&device_id)
                .and_then(|m| m.get(&item.device_model_urn))
                .cloned()
                .flatten();

            if let Some(current) = &current_policy_id {
                if *current != item.policy_id {
                    let current_modified = self
                        .by_id
                        .read()
                        .await
                        .get(current)
                        .map(|c| c.last_modified)
                        .unwrap_or(i64::MIN);
                    if current_modified > item.last_modified {
                        continue; // client wins
                    }
                }
            }

            if let Some(models) = self.by_device.write().await.get_mut(&device_id) {
                models.insert(item.device_model_urn.clone(), None);
            }
            if let Some(devices) = self
                .by_model
                .write()
                .await
                .get_mut(&item.device_model_urn)
                .and_then(|m| m.get_mut(&item.policy_id))
            {
                devices.remove(&device_id);
            }
            removed.push(device_id);
        }

        self.notify_unassigned(item.policy_id.clone(), removed).await;
        Ok(())
    }

    async fn process_changed(&self, dev: &DeviceId, item: &PolicyChangeItem) -> Result<()> {
        let cached_modified = self
            .by_id
            .read()
            .await
            .get(&item.policy_id)
            .map(|c| c.last_modified);
        if let Some(modified) = cached_modified {
            if modified >= item.last_modified {
                return Ok(());
            }
        }

        let devices: Vec<DeviceId> = self
            .by_model
            .read()
            .await
            .get(&item.device_model_urn)
            .and_then(|m| m.get(&item.policy_id))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        self.notify_unassigned(item.policy_id.clone(), devices.clone()).await;

        let policy = Arc::new(
            self.server
                .get_policy(&item.device_model_urn, &item.policy_id)
                .await?,
        );
        for device_id in &devices {
            self.insert_mapping(item.device_model_urn.clone(), device_id.clone(), Arc::clone(&policy))
                .await;
        }

        let _ = dev;
        self.notify_assigned(policy, devices).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DevicePolicy;
    use std::collections::HashMap as StdMap;
    use std::sync::Mutex as StdMutex;

    struct FakeServer {
        policies: StdMutex<StdMap<String, DevicePolicy>>,
        icd: StdMutex<StdMap<String, Vec<DeviceId>>>,
    }

    fn policy_json(id: &str, urn: &str, last_modified: i64) -> DevicePolicy {
        let json = format!(
            r#"{{"id":"{id}","deviceModelUrn":"{urn}","lastModified":{last_modified},"pipelines":{{}}}}"#
        );
        DevicePolicy::parse(&json).unwrap()
    }

    #[async_trait]
    impl PolicyServerClient for FakeServer {
        async fn get_device_model(&self, _urn: &DeviceModelUrn) -> Result<DeviceModel> {
            unimplemented!()
        }
        async fn get_policy(&self, _urn: &DeviceModelUrn, policy_id: &PolicyId) -> Result<DevicePolicy> {
            Ok(self.policies.lock().unwrap().get(policy_id.as_str()).unwrap().clone())
        }
        async fn get_policy_for_device(
            &self,
            _urn: &DeviceModelUrn,
            _device_id: &DeviceId,
        ) -> Result<Option<DevicePolicy>> {
            Ok(None)
        }
        async fn get_indirectly_connected_devices(
            &self,
            _urn: &DeviceModelUrn,
            policy_id: &PolicyId,
            _gateway_id: &DeviceId,
        ) -> Result<Vec<DeviceId>> {
            Ok(self.icd.lock().unwrap().get(policy_id.as_str()).cloned().unwrap_or_default())
        }
    }

    struct RecordingListener {
        assigned: StdMutex<Vec<(PolicyId, Vec<DeviceId>)>>,
        unassigned: StdMutex<Vec<(PolicyId, Vec<DeviceId>)>>,
    }

    #[async_trait]
    impl PolicyChangeListener for RecordingListener {
        async fn policy_assigned(&self, policy: Arc<DevicePolicy>, devices: Vec<DeviceId>) {
            self.assigned.lock().unwrap().push((policy.id.clone(), devices));
        }
        async fn policy_unassigned(&self, policy_id: PolicyId, devices: Vec<DeviceId>) {
            self.unassigned.lock().unwrap().push((policy_id, devices));
        }
    }

    #[tokio::test]
    async fn assigned_change_downloads_and_notifies_once() {
        let urn = DeviceModelUrn::new("urn:model:thermostat");
        let mut policies = StdMap::new();
        policies.insert("p1".to_string(), policy_json("p1", "urn:model:thermostat", 10));
        let server = Arc::new(FakeServer {
            policies: StdMutex::new(policies),
            icd: StdMutex::new(StdMap::new()),
        });
        let manager = DevicePolicyManager::new(server);
        let listener = Arc::new(RecordingListener {
            assigned: StdMutex::new(Vec::new()),
            unassigned: StdMutex::new(Vec::new()),
        });
        manager.add_change_listener(listener.clone()).await;

        let dev = DeviceId::new("dev-1");
        let item = PolicyChangeItem {
            device_model_urn: urn.clone(),
            policy_id: PolicyId::new("p1"),
            last_modified: 10,
            op: ChangeOp::Assigned,
        };
        manager.policy_changed(dev.clone(), vec![item]).await.unwrap();

        assert_eq!(listener.assigned.lock().unwrap().len(), 1);
        let policy = manager.get_policy(&urn, &dev).await.unwrap();
        assert!(policy.is_some());
    }
}
