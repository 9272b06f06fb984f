//! Backend custom resource.

use super::{
    apply_common_defaults, ConditionType, MappingRuleSpec, MethodSpec, MetricSpec,
    ProviderAccountRef, RemoteStatus,
};
use crate::engine::Converging;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backend Custom Resource Definition
///
/// Mirrors a 3scale backend API together with its methods, metrics and
/// mapping rules.
///
/// # Example
///
/// ```yaml
/// apiVersion: capabilities.3scale.net/v1beta1
/// kind: Backend
/// metadata:
///   name: echo-backend
/// spec:
///   name: Echo API
///   privateBaseURL: https://echo-api.3scale.net:443
///   methods:
///     ping:
///       friendlyName: Ping
///   mappingRules:
///     - httpMethod: GET
///       pattern: /ping$
///       metricMethodRef: ping
///       increment: 1
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Backend",
    group = "capabilities.3scale.net",
    version = "v1beta1",
    namespaced,
    status = "RemoteStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Remote ID", "type":"integer", "jsonPath":".status.remoteId"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    /// Human readable name
    pub name: String,
    /// Unique within the provider account. Defaults to the sanitized name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_name: String,
    /// Private endpoint, http or https
    #[serde(rename = "privateBaseURL")]
    pub private_base_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mapping_rules: Vec<MappingRuleSpec>,
    /// system_name -> metric. System names are unique across metrics and methods.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSpec>,
    /// system_name -> method
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, MethodSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_account_ref: Option<ProviderAccountRef>,
}

impl BackendSpec {
    /// Apply defaults in place. Returns true when the spec changed.
    pub fn set_defaults(&mut self) -> bool {
        apply_common_defaults(
            "Backend",
            &self.name,
            &mut self.system_name,
            &mut self.metrics,
        )
    }
}

impl Converging for Backend {
    fn condition_types() -> &'static [ConditionType] {
        &[
            ConditionType::Ready,
            ConditionType::Invalid,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_spec() {
        let yaml = r"
name: Echo API
privateBaseURL: https://echo-api.3scale.net:443
methods:
  ping:
    friendlyName: Ping
mappingRules:
  - httpMethod: GET
    pattern: /ping$
    metricMethodRef: ping
    increment: 1
";
        let spec: BackendSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.private_base_url, "https://echo-api.3scale.net:443");
        assert_eq!(spec.methods["ping"].name, "Ping");
        assert_eq!(spec.mapping_rules[0].key(), "GET:/ping$");
        assert!(spec.metrics.is_empty());
    }

    #[test]
    fn test_set_defaults_adds_hits_and_system_name() {
        let mut spec: BackendSpec =
            serde_yaml::from_str("name: Echo API\nprivateBaseURL: https://echo\n").unwrap();
        assert!(spec.set_defaults());
        assert_eq!(spec.system_name, "echoapi");
        assert!(spec.metrics.contains_key("hits"));
        assert!(!spec.set_defaults());
    }
}
