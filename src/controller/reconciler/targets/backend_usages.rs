use crate::crd::BackendUsageSpec;
use crate::engine::patch::changed;
use crate::engine::{SetTarget, SyncError};
use crate::remote::types::{BackendUsage, BackendUsageParams, BackendUsagePatch};
use crate::remote::AdminApi;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Backends a product routes to, keyed by backend system name
pub struct BackendUsagesTarget<'a> {
    api: &'a dyn AdminApi,
    product_id: i64,
    /// Backend system name -> remote backend ID
    backends: &'a BTreeMap<String, i64>,
}

impl<'a> BackendUsagesTarget<'a> {
    pub fn new(
        api: &'a dyn AdminApi,
        product_id: i64,
        backends: &'a BTreeMap<String, i64>,
    ) -> Self {
        Self {
            api,
            product_id,
            backends,
        }
    }
}

#[async_trait]
impl SetTarget for BackendUsagesTarget<'_> {
    type Spec = BackendUsageSpec;
    type Item = BackendUsage;
    type Patch = BackendUsagePatch;

    fn kind(&self) -> &'static str {
        "backendUsages"
    }

    async fn list(&self) -> Result<Vec<BackendUsage>, SyncError> {
        Ok(self.api.list_backend_usages(self.product_id).await?)
    }

    /// Usages of backends without a known system name get a key no spec can produce
    fn key_of(&self, item: &BackendUsage) -> String {
        self.backends
            .iter()
            .find(|(_, id)| **id == item.backend_api_id)
            .map(|(system_name, _)| system_name.clone())
            .unwrap_or_else(|| format!("#{}", item.backend_api_id))
    }

    fn diff(
        &self,
        desired: &BackendUsageSpec,
        existing: &BackendUsage,
    ) -> Result<BackendUsagePatch, SyncError> {
        Ok(BackendUsagePatch {
            path: changed(&desired.path, &existing.path),
        })
    }

    async fn create(&self, key: &str, desired: &BackendUsageSpec) -> Result<(), SyncError> {
        let backend_api_id = self
            .backends
            .get(key)
            .copied()
            .ok_or_else(|| SyncError::reference_not_found(format!("backend {key}")))?;
        let params = BackendUsageParams {
            backend_api_id,
            path: desired.path.clone(),
        };
        self.api
            .create_backend_usage(self.product_id, &params)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        existing: &BackendUsage,
        patch: BackendUsagePatch,
    ) -> Result<(), SyncError> {
        Ok(self
            .api
            .update_backend_usage(self.product_id, existing.id, &patch)
            .await?)
    }

    async fn delete(&self, existing: &BackendUsage) -> Result<(), SyncError> {
        Ok(self
            .api
            .delete_backend_usage(self.product_id, existing.id)
            .await?)
    }
}
