//! `PolicyServerClient` implementation against the cloud REST surface (§6):
//! four read-only endpoints, each carrying a bearer JWT client assertion
//! and the caller's endpoint id.

use async_trait::async_trait;
use serde::Deserialize;

use edgepolicy_core::types::{DeviceId, DeviceModelUrn, PolicyId};
use edgepolicy_policy_engine::manager::PolicyServerClient;
use edgepolicy_policy_engine::{DeviceModel, DevicePolicy, PolicyError};

/// Supplies the bearer assertion and endpoint id carried on every request.
/// Implemented by the trust store in the binary that wires this client up;
/// kept as a trait here so this crate never depends on `edgepolicy-crypto`
/// for something it only needs to call through.
pub trait RequestIdentity: Send + Sync {
    fn bearer_token(&self) -> String;
    fn endpoint_id(&self) -> String;
}

/// Thin HTTP implementation of `PolicyServerClient` (§6 "Cloud REST surface").
pub struct HttpPolicyServerClient<I> {
    http: reqwest::Client,
    base_url: String,
    identity: I,
}

impl<I: RequestIdentity> HttpPolicyServerClient<I> {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, identity: I) -> Self {
        Self { http, base_url: base_url.into(), identity }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.identity.bearer_token()))
            .header("X-EndpointId", self.identity.endpoint_id())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PolicyError> {
        let response = self
            .request(path)
            .query(query)
            .send()
            .await
            .map_err(|e| PolicyError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| PolicyError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PolicyError::Transport(format!("{path} returned {status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|e| PolicyError::Parse(format!("{path}: {e}")))
    }
}

#[derive(Deserialize)]
struct PolicyList {
    items: Vec<RawDevicePolicy>,
}

#[derive(Deserialize)]
struct RawDevicePolicy(serde_json::Value);

#[derive(Deserialize)]
struct DeviceIdList {
    items: Vec<DeviceIdItem>,
}

#[derive(Deserialize)]
struct DeviceIdItem {
    id: String,
}

#[async_trait]
impl<I: RequestIdentity> PolicyServerClient for HttpPolicyServerClient<I> {
    async fn get_device_model(&self, urn: &DeviceModelUrn) -> Result<DeviceModel, PolicyError> {
        let path = format!("/deviceModels/{}", urn.as_str());
        let body: serde_json::Value = self.get_json(&path, &[]).await?;
        DeviceModel::parse(&body.to_string())
    }

    async fn get_policy(
        &self,
        urn: &DeviceModelUrn,
        policy_id: &PolicyId,
    ) -> Result<DevicePolicy, PolicyError> {
        let path = format!("/deviceModels/{}/devicePolicies/{}", urn.as_str(), policy_id.as_str());
        let body: serde_json::Value =
            self.get_json(&path, &[("fields", "id,pipelines,enabled,lastModified")]).await?;
        DevicePolicy::parse(&body.to_string())
    }

    async fn get_policy_for_device(
        &self,
        urn: &DeviceModelUrn,
        device_id: &DeviceId,
    ) -> Result<Option<DevicePolicy>, PolicyError> {
        let query = format!(r#"{{"devices.id":"{}"}}"#, device_id.as_str());
        let path = format!("/deviceModels/{}/devicePolicies", urn.as_str());
        let list: PolicyList = self
            .get_json(
                &path,
                &[
                    ("q", query.as_str()),
                    ("fields", "id,pipelines,enabled,lastModified,deviceModelUrn"),
                ],
            )
            .await?;
        match list.items.into_iter().next() {
            Some(raw) => Ok(Some(DevicePolicy::parse(&raw.0.to_string())?)),
            None => Ok(None),
        }
    }

    async fn get_indirectly_connected_devices(
        &self,
        urn: &DeviceModelUrn,
        policy_id: &PolicyId,
        gateway_id: &DeviceId,
    ) -> Result<Vec<DeviceId>, PolicyError> {
        let query = format!(r#"{{"directlyConnectedOwner":"{}"}}"#, gateway_id.as_str());
        let path =
            format!("/deviceModels/{}/devicePolicies/{}/devices", urn.as_str(), policy_id.as_str());
        let list: DeviceIdList =
            self.get_json(&path, &[("q", query.as_str()), ("fields", "id")]).await?;
        Ok(list.items.into_iter().map(|item| DeviceId::new(item.id)).collect())
    }
}
