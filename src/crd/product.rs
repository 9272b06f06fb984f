//! Product custom resource.

use super::{
    apply_common_defaults, preserve_unknown_fields, ConditionType, MappingRuleSpec, MethodSpec,
    MetricSpec, ProviderAccountRef, RemoteStatus,
};
use crate::engine::Converging;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Product Custom Resource Definition
///
/// Mirrors a 3scale product (service): its methods, metrics and mapping
/// rules, the backends it routes to, its application plans and its policy
/// chain.
///
/// # Example
///
/// ```yaml
/// apiVersion: capabilities.3scale.net/v1beta1
/// kind: Product
/// metadata:
///   name: petstore
/// spec:
///   name: Pet Store
///   backendUsages:
///     echoapi:
///       path: /pets
///   applicationPlans:
///     basic:
///       name: Basic
///       limits:
///         - period: day
///           value: 1000
///           metricMethodRef:
///             systemName: hits
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Product",
    group = "capabilities.3scale.net",
    version = "v1beta1",
    namespaced,
    status = "RemoteStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Remote ID", "type":"integer", "jsonPath":".status.remoteId"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProductSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Gateway deployment mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<ProductDeploymentSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mapping_rules: Vec<MappingRuleSpec>,
    /// backend system_name -> usage. A backend can be used at most once.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub backend_usages: BTreeMap<String, BackendUsageSpec>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, MethodSpec>,
    /// plan system_name -> plan
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub application_plans: BTreeMap<String, ApplicationPlanSpec>,
    /// Policy chain in execution order. Left untouched remotely when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<PolicyConfigSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_account_ref: Option<ProviderAccountRef>,
}

impl ProductSpec {
    pub fn set_defaults(&mut self) -> bool {
        apply_common_defaults(
            "Product",
            &self.name,
            &mut self.system_name,
            &mut self.metrics,
        )
    }

    /// `deployment_option` value understood by the admin API
    pub fn deployment_option(&self) -> Option<&'static str> {
        self.deployment.as_ref().and_then(ProductDeploymentSpec::option)
    }
}

/// Exactly one of the two modes is expected
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductDeploymentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub apicast_hosted: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub apicast_self_managed: Option<serde_json::Value>,
}

impl ProductDeploymentSpec {
    pub fn option(&self) -> Option<&'static str> {
        match (&self.apicast_hosted, &self.apicast_self_managed) {
            (Some(_), None) => Some("hosted"),
            (None, Some(_)) => Some("self_managed"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct BackendUsageSpec {
    /// Public path prefix routed to the backend
    pub path: String,
}

/// Application plan
///
/// Unset optional fields are left as they are remotely.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPlanSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether new applications need approval before they are activated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps_require_approval: Option<bool>,
    /// Trial period in days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_period: Option<i64>,
    /// Setup fee (USD), e.g. "10.00"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_fee: Option<String>,
    /// Cost per month (USD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_month: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limits: Vec<LimitSpec>,
}

/// Maximum value a metric can reach within a period
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitSpec {
    /// eternity, year, month, week, day, hour or minute
    pub period: String,
    pub value: i64,
    pub metric_method_ref: MetricMethodRefSpec,
}

impl LimitSpec {
    /// Identity of a limit within its plan
    pub fn key(&self) -> String {
        format!("{}:{}", self.period, self.metric_method_ref)
    }
}

/// Reference to a metric or method of the product, or of one of its backends
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricMethodRefSpec {
    pub system_name: String,
    /// System name of a backend used by the product
    #[serde(default, rename = "backend", skip_serializing_if = "Option::is_none")]
    pub backend_system_name: Option<String>,
}

impl fmt::Display for MetricMethodRefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend_system_name {
            Some(backend) => write!(f, "{backend}.{}", self.system_name),
            None => f.write_str(&self.system_name),
        }
    }
}

/// One entry of the gateway policy chain
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfigSpec {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    #[serde(default = "empty_object")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub configuration: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Converging for Product {
    fn condition_types() -> &'static [ConditionType] {
        &[
            ConditionType::Ready,
            ConditionType::Orphan,
            ConditionType::Invalid,
            ConditionType::Waiting,
            ConditionType::Failed,
        ]
    }

    fn generation(&self) -> Option<i64> {
        self.metadata.generation
    }

    fn remote_status(&self) -> Option<&RemoteStatus> {
        self.status.as_ref()
    }

    fn set_remote_status(&mut self, status: RemoteStatus) {
        self.status = Some(status);
    }
}
