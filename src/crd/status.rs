//! # Remote Entity Status
//!
//! Status shared by every resource that mirrors a 3scale entity: the remote
//! ID, the provider account it lives in, the observed generation and a set
//! of conditions.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition vocabulary. Each resource kind uses a subset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum ConditionType {
    /// Remote entity matches the desired state
    Ready,
    /// The spec is invalid and will not be retried until it changes
    Invalid,
    /// The spec references something that does not exist
    Orphan,
    /// A dependency is not ready yet
    Waiting,
    /// Reconciliation failed for any other reason
    Failed,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::Invalid => "Invalid",
            ConditionType::Orphan => "Orphan",
            ConditionType::Waiting => "Waiting",
            ConditionType::Failed => "Failed",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Condition represents one observation about the resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: ConditionType,
    pub status: ConditionStatus,
    /// Last time the status flipped (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(r#type: ConditionType, status: impl Into<ConditionStatus>) -> Self {
        Self {
            r#type,
            status: status.into(),
            last_transition_time: None,
            reason: None,
            message: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Transition times are bookkeeping and do not make two conditions different
impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

impl Eq for Condition {}

/// Conditions keyed by type, display order preserved
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the condition of the same type or append it
    ///
    /// The transition time is kept when the status did not flip and stamped otherwise.
    pub fn set_condition(&mut self, mut condition: Condition) {
        match self.0.iter_mut().find(|c| c.r#type == condition.r#type) {
            Some(existing) => {
                condition.last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time.clone()
                } else {
                    Some(Utc::now().to_rfc3339())
                };
                *existing = condition;
            }
            None => {
                condition.last_transition_time = Some(Utc::now().to_rfc3339());
                self.0.push(condition);
            }
        }
    }

    pub fn get(&self, r#type: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.r#type == r#type)
    }

    pub fn is_true(&self, r#type: ConditionType) -> bool {
        self.get(r#type).is_some_and(Condition::is_true)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Order-insensitive: two sets are equal when they hold the same conditions by type
impl PartialEq for ConditionSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|c| other.get(c.r#type).is_some_and(|o| o == c))
    }
}

impl Eq for ConditionSet {}

/// Status of a resource mirrored in 3scale
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    /// ID assigned by 3scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
    /// Admin portal host of the provider account the entity belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_account_host: Option<String>,
    /// Lifecycle state reported by 3scale (`live`, `suspended`). Applications only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: ConditionSet,
}

impl RemoteStatus {
    pub fn is_ready(&self) -> bool {
        self.conditions.is_true(ConditionType::Ready)
    }

    /// Compare everything but the observed generation
    pub fn same_as(&self, other: &RemoteStatus) -> bool {
        self.remote_id == other.remote_id
            && self.provider_account_host == other.provider_account_host
            && self.state == other.state
            && self.conditions == other.conditions
    }
}
