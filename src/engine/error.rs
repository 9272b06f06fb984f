//! # Sync Errors
//!
//! Error taxonomy shared by every reconciliation pass.
//!
//! The status reconciler maps each error onto exactly one condition, so the
//! classification in [`SyncError::kind`] is what the user eventually sees on
//! the resource. Task wrappers are transparent to classification.

use crate::remote::ApiError;
use std::fmt;
use thiserror::Error;

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Aggregated field errors, rendered the way the Kubernetes API renders them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecErrors(Vec<FieldError>);

impl SpecErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a list holding a single error
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: SpecErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }
}

impl fmt::Display for SpecErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no errors"),
            [single] => write!(f, "{single}"),
            many => {
                let joined: Vec<String> = many.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}

/// Classification used to pick the condition an error is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The desired state is invalid. Retrying will not help until the resource changes.
    InvalidSpec,
    /// The desired state references something that does not exist
    OrphanSpec,
    /// A dependency exists but is not ready yet
    Wait,
    /// Anything else, remote failures included
    Failed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSpec => "InvalidSpec",
            ErrorKind::OrphanSpec => "OrphanSpec",
            ErrorKind::Wait => "Wait",
            ErrorKind::Failed => "Failed",
        }
    }
}

/// Error raised by a sync task or by one of its collaborators
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid spec: {0}")]
    InvalidSpec(SpecErrors),

    #[error("orphan spec: {0}")]
    OrphanSpec(SpecErrors),

    #[error("waiting: {message}")]
    Wait { message: String },

    #[error("{reference} not found")]
    ReferenceNotFound { reference: String },

    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task {task} failed: {source}")]
    Task {
        task: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn wait(message: impl Into<String>) -> Self {
        SyncError::Wait {
            message: message.into(),
        }
    }

    pub fn reference_not_found(reference: impl Into<String>) -> Self {
        SyncError::ReferenceNotFound {
            reference: reference.into(),
        }
    }

    /// Classify the error, looking through task wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidSpec(_) => ErrorKind::InvalidSpec,
            SyncError::OrphanSpec(_) => ErrorKind::OrphanSpec,
            SyncError::Wait { .. } => ErrorKind::Wait,
            SyncError::Task { source, .. } => source.kind(),
            SyncError::ReferenceNotFound { .. }
            | SyncError::Remote(_)
            | SyncError::Kube(_)
            | SyncError::Store(_) => ErrorKind::Failed,
        }
    }

    /// True when the remote system reported the target entity as absent
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_not_found(),
            SyncError::Task { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Name of the task that failed, if the error went through a task runner
    pub fn task(&self) -> Option<&str> {
        match self {
            SyncError::Task { task, .. } => Some(task),
            _ => None,
        }
    }
}

/// Errors from persisting resources back to the cluster
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource changed since it was read (optimistic concurrency)
    #[error("conflict writing {name}: resource was modified concurrently")]
    Conflict { name: String },

    #[error("resource {name} has no namespace")]
    MissingNamespace { name: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to serialize status: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_task_wrappers() {
        let inner = SyncError::OrphanSpec(SpecErrors::single("spec.backendUsages", "missing"));
        let wrapped = SyncError::Task {
            task: "SyncBackendUsages".to_string(),
            source: Box::new(SyncError::Task {
                task: "inner".to_string(),
                source: Box::new(inner),
            }),
        };
        assert_eq!(wrapped.kind(), ErrorKind::OrphanSpec);
        assert_eq!(wrapped.task(), Some("SyncBackendUsages"));
    }

    #[test]
    fn test_reference_not_found_is_a_failure() {
        let err = SyncError::reference_not_found("metric method ref for mapping rule");
        assert_eq!(err.kind(), ErrorKind::Failed);
        assert_eq!(
            err.to_string(),
            "metric method ref for mapping rule not found"
        );
    }

    #[test]
    fn test_spec_errors_display() {
        let mut errors = SpecErrors::new();
        errors.push("spec.metrics", "Required value: hits metric");
        assert_eq!(errors.to_string(), "spec.metrics: Required value: hits metric");

        errors.push("spec.methods.a", "Invalid value: duplicated");
        assert_eq!(
            errors.to_string(),
            "[spec.metrics: Required value: hits metric, spec.methods.a: Invalid value: duplicated]"
        );
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_not_found_detection() {
        let err = SyncError::Remote(ApiError::NotFound {
            path: "/admin/api/backend_apis/1.json".to_string(),
        });
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::Failed);
        assert!(!SyncError::wait("backend not ready").is_not_found());
    }
}
