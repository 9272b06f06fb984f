//! # Admin API Types
//!
//! Entities as returned by the 3scale account management API, the payloads
//! used to create them and the typed partial updates.
//!
//! Patches carry only changed fields; every field is optional and skipped
//! when unset, so the form body sent to 3scale never overwrites unchanged
//! attributes.

use crate::engine::Patch;
use serde::{Deserialize, Deserializer, Serialize};

/// 3scale sends `null` for empty strings in several places
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

macro_rules! impl_patch {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl Patch for $ty {
            fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())+
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendApi {
    pub id: i64,
    pub name: String,
    pub system_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub private_endpoint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendApiParams {
    pub name: String,
    pub system_name: String,
    pub description: String,
    pub private_endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendApiPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_endpoint: Option<String>,
}
impl_patch!(BackendApiPatch { name, description, private_endpoint });

/// A product, called service by the admin API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub system_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deployment_option: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceParams {
    pub name: String,
    pub system_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_option: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServicePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_option: Option<String>,
}
impl_patch!(ServicePatch { name, description, deployment_option });

/// Metric or method. Metric listings include methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: i64,
    pub system_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub friendly_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricParams {
    pub friendly_name: String,
    pub system_name: String,
    pub unit: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
impl_patch!(MetricPatch { friendly_name, unit, description });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub id: i64,
    pub system_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub friendly_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodParams {
    pub friendly_name: String,
    pub system_name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
impl_patch!(MethodPatch { friendly_name, description });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    pub id: i64,
    pub metric_id: i64,
    pub pattern: String,
    pub http_method: String,
    pub delta: i64,
    /// 1-based, renumbered by 3scale on every insert, move and delete
    pub position: u32,
    #[serde(default)]
    pub last: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingRuleParams {
    pub http_method: String,
    pub pattern: String,
    pub metric_id: i64,
    pub delta: i64,
    pub position: u32,
    pub last: bool,
}

/// Method and pattern identify a rule and are never patched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingRulePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<bool>,
}
impl_patch!(MappingRulePatch { metric_id, delta, position, last });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendUsage {
    pub id: i64,
    pub path: String,
    pub service_id: i64,
    #[serde(rename = "backend_id")]
    pub backend_api_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendUsageParams {
    pub backend_api_id: i64,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendUsagePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
impl_patch!(BackendUsagePatch { path });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPlan {
    pub id: i64,
    pub name: String,
    pub system_name: String,
    /// `published` or `hidden`
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub trial_period_days: Option<i64>,
    #[serde(default)]
    pub setup_fee: f64,
    #[serde(default)]
    pub cost_per_month: f64,
}

impl ApplicationPlan {
    pub fn is_published(&self) -> bool {
        self.state == "published"
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplicationPlanParams {
    pub name: String,
    pub system_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_period_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_month: Option<f64>,
    /// `publish` or `hide`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_event: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicationPlanPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_period_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_month: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_event: Option<String>,
}
impl_patch!(ApplicationPlanPatch {
    name,
    approval_required,
    trial_period_days,
    setup_fee,
    cost_per_month,
    state_event,
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub id: i64,
    pub metric_id: i64,
    pub period: String,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitParams {
    pub period: String,
    pub value: i64,
}

/// Period and metric identify a limit; only the value changes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LimitPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}
impl_patch!(LimitPatch { value });

/// Application of a developer account, subscribed to one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    /// `pending`, `live` or `suspended`
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    pub plan_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationParams {
    pub plan_id: i64,
    pub name: String,
    pub description: String,
}

/// Plan and state change through dedicated endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
impl_patch!(ApplicationPatch { name, description });

/// One entry of a product policy chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub configuration: serde_json::Value,
    #[serde(default)]
    pub enabled: bool,
}
