//! # Object Store
//!
//! Access to the custom resources themselves: listing siblings, writing back
//! defaulted specs and finalizers, and persisting status.
//!
//! Every write carries the `resourceVersion` the caller read, so a concurrent
//! change surfaces as [`StoreError::Conflict`] instead of being overwritten.

use crate::constants::FIELD_MANAGER;
use crate::engine::{Converging, StatusWriter, StoreError};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// Namespaced custom resources of one kind
#[async_trait]
pub trait ObjectStore<K>: StatusWriter<K> {
    async fn list(&self, namespace: &str) -> Result<Vec<K>, StoreError>;

    /// Replace the whole object (spec, metadata). Status is not written.
    async fn replace(&self, resource: &K) -> Result<K, StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug,
{
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn api_for(&self, resource: &K) -> Result<Api<K>, StoreError> {
        let namespace = resource
            .namespace()
            .ok_or_else(|| StoreError::MissingNamespace {
                name: resource.name_any(),
            })?;
        Ok(self.api(&namespace))
    }
}

/// 409 from the API server means our resourceVersion is stale
fn map_conflict(name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            name: name.to_string(),
        },
        other => StoreError::Kube(other),
    }
}

#[async_trait]
impl<K> StatusWriter<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Converging
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + 'static,
{
    async fn write_status(&self, resource: &K) -> Result<(), StoreError> {
        let name = resource.name_any();
        let patch = json!({
            "metadata": { "resourceVersion": resource.resource_version() },
            "status": serde_json::to_value(resource.remote_status())?,
        });
        debug!(resource.name = %name, "writing status");
        self.api_for(resource)?
            .patch_status(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| map_conflict(&name, e))?;
        Ok(())
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Converging
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + 'static,
{
    async fn list(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        Ok(self
            .api(namespace)
            .list(&ListParams::default())
            .await?
            .items)
    }

    async fn replace(&self, resource: &K) -> Result<K, StoreError> {
        let name = resource.name_any();
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        self.api_for(resource)?
            .replace(&name, &params, resource)
            .await
            .map_err(|e| map_conflict(&name, e))
    }
}

/// Add `finalizer` unless present. Returns whether the metadata changed.
pub fn ensure_finalizer<K: Resource>(resource: &mut K, finalizer: &str) -> bool {
    let finalizers = resource.finalizers_mut();
    if finalizers.iter().any(|f| f == finalizer) {
        return false;
    }
    finalizers.push(finalizer.to_string());
    true
}

/// Remove `finalizer`. Returns whether the metadata changed.
pub fn remove_finalizer<K: Resource>(resource: &mut K, finalizer: &str) -> bool {
    let finalizers = resource.finalizers_mut();
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

pub fn has_finalizer<K: Resource>(resource: &K, finalizer: &str) -> bool {
    resource.finalizers().iter().any(|f| f == finalizer)
}
