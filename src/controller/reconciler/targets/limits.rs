use super::MetricIndex;
use crate::crd::LimitSpec;
use crate::engine::patch::changed;
use crate::engine::{SetTarget, SyncError};
use crate::remote::types::{Limit, LimitParams, LimitPatch};
use crate::remote::AdminApi;
use async_trait::async_trait;

/// Limits of one application plan, keyed by `period:metric_ref`
pub struct LimitsTarget<'a> {
    api: &'a dyn AdminApi,
    plan_id: i64,
    metrics: &'a MetricIndex,
}

impl<'a> LimitsTarget<'a> {
    pub fn new(api: &'a dyn AdminApi, plan_id: i64, metrics: &'a MetricIndex) -> Self {
        Self {
            api,
            plan_id,
            metrics,
        }
    }
}

#[async_trait]
impl SetTarget for LimitsTarget<'_> {
    type Spec = LimitSpec;
    type Item = Limit;
    type Patch = LimitPatch;

    fn kind(&self) -> &'static str {
        "limits"
    }

    async fn list(&self) -> Result<Vec<Limit>, SyncError> {
        Ok(self.api.list_limits(self.plan_id).await?)
    }

    fn key_of(&self, item: &Limit) -> String {
        match self.metrics.reference_of(item.metric_id) {
            Some(reference) => format!("{}:{reference}", item.period),
            None => format!("{}:#{}", item.period, item.metric_id),
        }
    }

    fn diff(&self, desired: &LimitSpec, existing: &Limit) -> Result<LimitPatch, SyncError> {
        Ok(LimitPatch {
            value: changed(&desired.value, &existing.value),
        })
    }

    async fn create(&self, key: &str, desired: &LimitSpec) -> Result<(), SyncError> {
        let reference = desired.metric_method_ref.to_string();
        let metric_id = self.metrics.id_of(&reference).ok_or_else(|| {
            SyncError::reference_not_found(format!(
                "metric method ref {reference} for limit {key}"
            ))
        })?;
        let params = LimitParams {
            period: desired.period.clone(),
            value: desired.value,
        };
        self.api
            .create_limit(self.plan_id, metric_id, &params)
            .await?;
        Ok(())
    }

    async fn update(&self, existing: &Limit, patch: LimitPatch) -> Result<(), SyncError> {
        Ok(self
            .api
            .update_limit(self.plan_id, existing.metric_id, existing.id, &patch)
            .await?)
    }

    async fn delete(&self, existing: &Limit) -> Result<(), SyncError> {
        Ok(self
            .api
            .delete_limit(self.plan_id, existing.metric_id, existing.id)
            .await?)
    }
}
