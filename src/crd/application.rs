//! Application custom resource.

use super::{ConditionType, ProviderAccountRef, RemoteStatus};
use crate::engine::Converging;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Application Custom Resource Definition
///
/// Subscribes a developer account to one application plan of a Product
/// resource in the same namespace.
///
/// # Example
///
/// ```yaml
/// apiVersion: capabilities.3scale.net/v1beta1
/// kind: Application
/// metadata:
///   name: petstore-john
/// spec:
///   accountId: 3
///   productRef:
///     name: petstore
///   applicationPlanName: basic
///   name: John's pet store app
///   description: Mobile client
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Application",
    group = "capabilities.3scale.net",
    version = "v1beta1",
    namespaced,
    status = "RemoteStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Remote ID", "type":"integer", "jsonPath":".status.remoteId"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// ID of the developer account in 3scale
    pub account_id: i64,
    pub product_ref: ProductRef,
    /// System name of a plan declared in the product's `applicationPlans`
    pub application_plan_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Suspended applications are rejected by the gateway
    #[serde(default)]
    pub suspend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_account_ref: Option<ProviderAccountRef>,
}

impl ApplicationSpec {
    /// Remote state the application should be in
    pub fn desired_state(&self) -> &'static str {
        if self.suspend {
            APPLICATION_SUSPENDED
        } else {
            APPLICATION_LIVE
        }
    }
}

/// Product resource in the namespace of the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ProductRef {
    pub name: String,
}

pub const APPLICATION_LIVE: &str = "live";
pub const APPLICATION_SUSPENDED: &str = "suspended";

impl Converging for Application {
    fn condition_types() -> &'static [ConditionType] {
        &[
            ConditionType::Ready,
            ConditionType::Invalid,
            ConditionType::Orphan,
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
