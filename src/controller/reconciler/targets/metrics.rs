use crate::crd::MetricSpec;
use crate::engine::patch::changed;
use crate::engine::{SetTarget, SyncError};
use crate::remote::types::{Metric, MetricParams, MetricPatch};
use crate::remote::{AdminApi, Scope};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Metrics of a backend or product
///
/// The remote metric listing includes methods; they are filtered out here so
/// the methods task keeps sole ownership of them.
pub struct MetricsTarget<'a> {
    api: &'a dyn AdminApi,
    scope: Scope,
    hits_id: i64,
}

impl<'a> MetricsTarget<'a> {
    pub fn new(api: &'a dyn AdminApi, scope: Scope, hits_id: i64) -> Self {
        Self {
            api,
            scope,
            hits_id,
        }
    }
}

#[async_trait]
impl SetTarget for MetricsTarget<'_> {
    type Spec = MetricSpec;
    type Item = Metric;
    type Patch = MetricPatch;

    fn kind(&self) -> &'static str {
        "metrics"
    }

    async fn list(&self) -> Result<Vec<Metric>, SyncError> {
        let methods: BTreeSet<String> = self
            .api
            .list_methods(self.scope, self.hits_id)
            .await?
            .into_iter()
            .map(|method| method.system_name)
            .collect();
        Ok(self
            .api
            .list_metrics(self.scope)
            .await?
            .into_iter()
            .filter(|metric| !methods.contains(&metric.system_name))
            .collect())
    }

    fn key_of(&self, item: &Metric) -> String {
        item.system_name.clone()
    }

    fn diff(&self, desired: &MetricSpec, existing: &Metric) -> Result<MetricPatch, SyncError> {
        Ok(MetricPatch {
            friendly_name: changed(&desired.name, &existing.friendly_name),
            unit: changed(&desired.unit, &existing.unit),
            description: changed(&desired.description, &existing.description),
        })
    }

    async fn create(&self, key: &str, desired: &MetricSpec) -> Result<(), SyncError> {
        let params = MetricParams {
            friendly_name: desired.name.clone(),
            system_name: key.to_string(),
            unit: desired.unit.clone(),
            description: desired.description.clone(),
        };
        self.api.create_metric(self.scope, &params).await?;
        Ok(())
    }

    async fn update(&self, existing: &Metric, patch: MetricPatch) -> Result<(), SyncError> {
        Ok(self
            .api
            .update_metric(self.scope, existing.id, &patch)
            .await?)
    }

    async fn delete(&self, existing: &Metric) -> Result<(), SyncError> {
        Ok(self.api.delete_metric(self.scope, existing.id).await?)
    }
}
