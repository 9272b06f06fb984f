use crate::crd::MethodSpec;
use crate::engine::patch::changed;
use crate::engine::{SetTarget, SyncError};
use crate::remote::types::{Method, MethodParams, MethodPatch};
use crate::remote::{AdminApi, Scope};
use async_trait::async_trait;

/// Methods of a backend or product, children of its `hits` metric
pub struct MethodsTarget<'a> {
    api: &'a dyn AdminApi,
    scope: Scope,
    hits_id: i64,
}

impl<'a> MethodsTarget<'a> {
    pub fn new(api: &'a dyn AdminApi, scope: Scope, hits_id: i64) -> Self {
        Self {
            api,
            scope,
            hits_id,
        }
    }
}

#[async_trait]
impl SetTarget for MethodsTarget<'_> {
    type Spec = MethodSpec;
    type Item = Method;
    type Patch = MethodPatch;

    fn kind(&self) -> &'static str {
        "methods"
    }

    async fn list(&self) -> Result<Vec<Method>, SyncError> {
        Ok(self.api.list_methods(self.scope, self.hits_id).await?)
    }

    fn key_of(&self, item: &Method) -> String {
        item.system_name.clone()
    }

    fn diff(&self, desired: &MethodSpec, existing: &Method) -> Result<MethodPatch, SyncError> {
        Ok(MethodPatch {
            friendly_name: changed(&desired.name, &existing.friendly_name),
            description: changed(&desired.description, &existing.description),
        })
    }

    async fn create(&self, key: &str, desired: &MethodSpec) -> Result<(), SyncError> {
        let params = MethodParams {
            friendly_name: desired.name.clone(),
            system_name: key.to_string(),
            description: desired.description.clone(),
        };
        self.api
            .create_method(self.scope, self.hits_id, &params)
            .await?;
        Ok(())
    }

    async fn update(&self, existing: &Method, patch: MethodPatch) -> Result<(), SyncError> {
        Ok(self
            .api
            .update_method(self.scope, self.hits_id, existing.id, &patch)
            .await?)
    }

    async fn delete(&self, existing: &Method) -> Result<(), SyncError> {
        Ok(self
            .api
            .delete_method(self.scope, self.hits_id, existing.id)
            .await?)
    }
}
