use super::MetricIndex;
use crate::crd::{mapping_rule_key, MappingRuleSpec};
use crate::engine::patch::changed;
use crate::engine::{OrderedTarget, SyncError};
use crate::remote::types::{MappingRule, MappingRuleParams, MappingRulePatch};
use crate::remote::{AdminApi, Scope};
use async_trait::async_trait;

/// Mapping rules of a backend or product, ordered by position
pub struct MappingRulesTarget<'a> {
    api: &'a dyn AdminApi,
    scope: Scope,
    metrics: &'a MetricIndex,
}

impl<'a> MappingRulesTarget<'a> {
    pub fn new(api: &'a dyn AdminApi, scope: Scope, metrics: &'a MetricIndex) -> Self {
        Self {
            api,
            scope,
            metrics,
        }
    }

    fn metric_id(&self, rule: &MappingRuleSpec) -> Result<i64, SyncError> {
        self.metrics
            .id_of(&rule.metric_method_ref)
            .ok_or_else(|| {
                SyncError::reference_not_found(format!(
                    "metric method ref {} for mapping rule {}",
                    rule.metric_method_ref,
                    rule.key()
                ))
            })
    }
}

#[async_trait]
impl OrderedTarget for MappingRulesTarget<'_> {
    type Spec = MappingRuleSpec;
    type Item = MappingRule;
    type Patch = MappingRulePatch;

    fn kind(&self) -> &'static str {
        "mappingRules"
    }

    async fn list(&self) -> Result<Vec<MappingRule>, SyncError> {
        Ok(self.api.list_mapping_rules(self.scope).await?)
    }

    fn desired_key(&self, spec: &MappingRuleSpec) -> String {
        spec.key()
    }

    fn key_of(&self, item: &MappingRule) -> String {
        mapping_rule_key(&item.http_method, &item.pattern)
    }

    fn position_of(&self, item: &MappingRule) -> u32 {
        item.position
    }

    fn diff(
        &self,
        desired: &MappingRuleSpec,
        existing: &MappingRule,
        position: Option<u32>,
    ) -> Result<MappingRulePatch, SyncError> {
        Ok(MappingRulePatch {
            metric_id: changed(&self.metric_id(desired)?, &existing.metric_id),
            delta: changed(&desired.increment, &existing.delta),
            position,
            last: changed(&desired.last.unwrap_or(false), &existing.last),
        })
    }

    async fn create(&self, desired: &MappingRuleSpec, position: u32) -> Result<(), SyncError> {
        let params = MappingRuleParams {
            http_method: desired.http_method.to_uppercase(),
            pattern: desired.pattern.clone(),
            metric_id: self.metric_id(desired)?,
            delta: desired.increment,
            position,
            last: desired.last.unwrap_or(false),
        };
        self.api.create_mapping_rule(self.scope, &params).await?;
        Ok(())
    }

    async fn update(&self, existing: &MappingRule, patch: MappingRulePatch) -> Result<(), SyncError> {
        Ok(self
            .api
            .update_mapping_rule(self.scope, existing.id, &patch)
            .await?)
    }

    async fn delete(&self, existing: &MappingRule) -> Result<(), SyncError> {
        Ok(self
            .api
            .delete_mapping_rule(self.scope, existing.id)
            .await?)
    }
}
