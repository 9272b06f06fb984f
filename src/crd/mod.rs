//! # Custom Resource Definitions
//!
//! CRD types for the capabilities controller.
//!
//! Every resource here mirrors one 3scale entity. The spec holds the desired
//! state; the shared [`RemoteStatus`] records the remote ID and the outcome
//! of the last pass.

mod application;
mod backend;
mod product;
mod status;

pub use application::{
    Application, ApplicationSpec, ProductRef, APPLICATION_LIVE, APPLICATION_SUSPENDED,
};
pub use backend::{Backend, BackendSpec};
pub use product::{
    ApplicationPlanSpec, BackendUsageSpec, LimitSpec, MetricMethodRefSpec, PolicyConfigSpec,
    Product, ProductDeploymentSpec, ProductSpec,
};
pub use status::{Condition, ConditionSet, ConditionStatus, ConditionType, RemoteStatus};

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// API group of every resource served by this controller
pub const GROUP: &str = "capabilities.3scale.net";

/// System name of the metric every backend and product must define
pub const HITS_METRIC: &str = "hits";

/// Secret holding the credentials of a 3scale provider account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ProviderAccountRef {
    /// Secret name in the resource namespace.
    /// The secret must hold `adminURL` and `token`.
    pub name: String,
}

/// Metric counted by 3scale
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    #[serde(rename = "friendlyName")]
    pub name: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl MetricSpec {
    /// The metric 3scale creates implicitly for every backend and product
    pub fn hits() -> Self {
        Self {
            name: "Hits".to_string(),
            unit: "hit".to_string(),
            description: "Number of API hits".to_string(),
        }
    }
}

/// Method, a metric child of `hits`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MethodSpec {
    #[serde(rename = "friendlyName")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Mapping rule. Position is given by the index in the `mappingRules` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MappingRuleSpec {
    /// GET, HEAD, POST, PUT, DELETE, OPTIONS, TRACE, PATCH or CONNECT
    pub http_method: String,
    pub pattern: String,
    /// System name of the metric or method incremented by the rule
    pub metric_method_ref: String,
    pub increment: i64,
    /// Stop evaluating further rules when this one matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<bool>,
}

impl MappingRuleSpec {
    /// Identity of a rule across passes
    pub fn key(&self) -> String {
        mapping_rule_key(&self.http_method, &self.pattern)
    }
}

pub fn mapping_rule_key(http_method: &str, pattern: &str) -> String {
    format!("{}:{}", http_method.to_uppercase(), pattern)
}

/// System name derived from a display name: alphanumerics only, lower-cased
///
/// 3scale compares system names case-insensitively.
pub fn sanitize_system_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

/// Fill in the system name and the `hits` metric. Returns true when anything changed.
pub(crate) fn apply_common_defaults(
    kind: &str,
    name: &str,
    system_name: &mut String,
    metrics: &mut BTreeMap<String, MetricSpec>,
) -> bool {
    let mut updated = false;

    if system_name.is_empty() {
        *system_name = sanitize_system_name(name);
        updated = true;
    }

    let lower = system_name.to_lowercase();
    if *system_name != lower {
        info!(kind, from = %system_name, to = %lower, "system name lower-cased");
        *system_name = lower;
        updated = true;
    }

    if !metrics.contains_key(HITS_METRIC) {
        info!(kind, "hits metric added");
        metrics.insert(HITS_METRIC.to_string(), MetricSpec::hits());
        updated = true;
    }

    updated
}

/// Structural schema for free-form JSON objects
pub(crate) fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
