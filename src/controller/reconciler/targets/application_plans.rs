use crate::crd::ApplicationPlanSpec;
use crate::engine::patch::{changed, changed_opt};
use crate::engine::{SetTarget, SpecErrors, SyncError};
use crate::remote::types::{ApplicationPlan, ApplicationPlanParams, ApplicationPlanPatch};
use crate::remote::AdminApi;
use async_trait::async_trait;

/// Application plans of a product, keyed by system name
///
/// Limits are reconciled separately once every plan exists.
pub struct ApplicationPlansTarget<'a> {
    api: &'a dyn AdminApi,
    product_id: i64,
}

impl<'a> ApplicationPlansTarget<'a> {
    pub fn new(api: &'a dyn AdminApi, product_id: i64) -> Self {
        Self { api, product_id }
    }
}

/// Parse a price such as `"10.50"`
pub(crate) fn parse_price(field: &str, value: Option<&String>) -> Result<Option<f64>, SyncError> {
    value
        .map(|raw| {
            raw.trim().parse::<f64>().map_err(|_| {
                SyncError::InvalidSpec(SpecErrors::single(
                    field,
                    format!("Invalid value: {raw:?}: not a decimal number"),
                ))
            })
        })
        .transpose()
}

/// Prices are compared to the cent
fn price_changed(desired: Option<f64>, existing: f64) -> Option<f64> {
    desired.filter(|d| (d - existing).abs() >= 0.005)
}

fn state_event(published: bool) -> String {
    let event = if published { "publish" } else { "hide" };
    event.to_string()
}

#[async_trait]
impl SetTarget for ApplicationPlansTarget<'_> {
    type Spec = ApplicationPlanSpec;
    type Item = ApplicationPlan;
    type Patch = ApplicationPlanPatch;

    fn kind(&self) -> &'static str {
        "applicationPlans"
    }

    async fn list(&self) -> Result<Vec<ApplicationPlan>, SyncError> {
        Ok(self.api.list_application_plans(self.product_id).await?)
    }

    fn key_of(&self, item: &ApplicationPlan) -> String {
        item.system_name.clone()
    }

    fn diff(
        &self,
        desired: &ApplicationPlanSpec,
        existing: &ApplicationPlan,
    ) -> Result<ApplicationPlanPatch, SyncError> {
        let setup_fee = parse_price("setupFee", desired.setup_fee.as_ref())?;
        let cost_per_month = parse_price("costMonth", desired.cost_month.as_ref())?;
        Ok(ApplicationPlanPatch {
            name: changed_opt(desired.name.as_ref(), &existing.name),
            approval_required: changed_opt(
                desired.apps_require_approval.as_ref(),
                &existing.approval_required,
            ),
            trial_period_days: desired
                .trial_period
                .and_then(|days| changed(&Some(days), &existing.trial_period_days).flatten()),
            setup_fee: price_changed(setup_fee, existing.setup_fee),
            cost_per_month: price_changed(cost_per_month, existing.cost_per_month),
            state_event: desired
                .published
                .filter(|published| *published != existing.is_published())
                .map(state_event),
        })
    }

    async fn create(&self, key: &str, desired: &ApplicationPlanSpec) -> Result<(), SyncError> {
        let params = ApplicationPlanParams {
            name: desired.name.clone().unwrap_or_else(|| key.to_string()),
            system_name: key.to_string(),
            approval_required: desired.apps_require_approval,
            trial_period_days: desired.trial_period,
            setup_fee: parse_price("setupFee", desired.setup_fee.as_ref())?,
            cost_per_month: parse_price("costMonth", desired.cost_month.as_ref())?,
            state_event: desired.published.filter(|p| *p).map(state_event),
        };
        self.api
            .create_application_plan(self.product_id, &params)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        existing: &ApplicationPlan,
        patch: ApplicationPlanPatch,
    ) -> Result<(), SyncError> {
        Ok(self
            .api
            .update_application_plan(self.product_id, existing.id, &patch)
            .await?)
    }

    async fn delete(&self, existing: &ApplicationPlan) -> Result<(), SyncError> {
        Ok(self
            .api
            .delete_application_plan(self.product_id, existing.id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("setupFee", None).unwrap(), None);
        assert_eq!(
            parse_price("setupFee", Some(&"10.50".to_string())).unwrap(),
            Some(10.5)
        );
        assert!(parse_price("setupFee", Some(&"ten".to_string())).is_err());
    }

    #[test]
    fn test_price_compared_to_the_cent() {
        assert_eq!(price_changed(Some(10.0), 10.0), None);
        assert_eq!(price_changed(Some(10.001), 10.0), None);
        assert_eq!(price_changed(Some(12.0), 10.0), Some(12.0));
        assert_eq!(price_changed(None, 10.0), None);
    }
}
