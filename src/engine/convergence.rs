//! # Status Convergence
//!
//! Turns the outcome of a reconciliation pass into a status and decides
//! whether it has to be written.
//!
//! ## Conditions
//!
//! - `Ready`: the pass succeeded
//! - `Invalid`: the spec failed validation
//! - `Orphan`: the spec references something that does not exist
//! - `Waiting`: a dependency is not ready yet
//! - `Failed`: any other error
//!
//! Only the condition types of the resource kind are written. The previous
//! conditions are carried over and replaced by type, so transition times
//! survive passes where nothing flipped.
//!
//! ## Decision
//!
//! The new status is compared with the stored one, ignoring the observed
//! generation. Equal status and an observed generation matching the current
//! one is steady state: nothing is written. Otherwise the observed generation
//! is bumped and the status persisted. A write conflict asks for a requeue
//! and is not reported as a failure.

use crate::crd::{Condition, ConditionType, RemoteStatus};
use crate::engine::{ErrorKind, StoreError, SyncError};
use crate::observability::metrics;
use async_trait::async_trait;
use tracing::{debug, info};

/// A resource whose status is owned by the convergence engine
pub trait Converging: Clone + Send + Sync {
    /// Condition types written for this kind, in display order
    fn condition_types() -> &'static [ConditionType];

    fn generation(&self) -> Option<i64>;

    fn remote_status(&self) -> Option<&RemoteStatus>;

    fn set_remote_status(&mut self, status: RemoteStatus);
}

/// Persists the status subresource with optimistic concurrency
#[async_trait]
pub trait StatusWriter<K>: Send + Sync {
    /// Write `resource.status`. Must return [`StoreError::Conflict`] when the
    /// stored resource changed since `resource` was read.
    async fn write_status(&self, resource: &K) -> Result<(), StoreError>;
}

/// What the status pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Status already reflected the outcome; nothing written
    Steady,
    /// Status written
    Updated,
    /// Write hit a conflict; try the whole pass again
    Requeue,
}

impl StatusOutcome {
    pub fn requeue(&self) -> bool {
        matches!(self, StatusOutcome::Requeue)
    }
}

/// Result of the sync part of a pass
#[derive(Debug)]
pub struct SyncOutcome {
    /// Remote ID known after the pass, even when a later step failed
    pub remote_id: Option<i64>,
    /// Remote lifecycle state, for kinds that have one
    pub state: Option<String>,
    pub result: Result<(), SyncError>,
}

impl SyncOutcome {
    pub fn ok(remote_id: i64) -> Self {
        Self {
            remote_id: Some(remote_id),
            state: None,
            result: Ok(()),
        }
    }

    pub fn failed(remote_id: Option<i64>, error: SyncError) -> Self {
        Self {
            remote_id,
            state: None,
            result: Err(error),
        }
    }

    pub fn with_state(mut self, state: Option<String>) -> Self {
        self.state = state;
        self
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.result.as_ref().err()
    }
}

/// Computes and persists the status of one resource for one pass
#[derive(Debug)]
pub struct StatusReconciler<'a, K> {
    resource: &'a K,
    provider_account_host: Option<String>,
    outcome: &'a SyncOutcome,
}

impl<'a, K: Converging> StatusReconciler<'a, K> {
    pub fn new(
        resource: &'a K,
        provider_account_host: Option<String>,
        outcome: &'a SyncOutcome,
    ) -> Self {
        Self {
            resource,
            provider_account_host,
            outcome,
        }
    }

    /// New status for this pass. The observed generation is carried over unchanged.
    pub fn calculate_status(&self) -> RemoteStatus {
        let previous = self.resource.remote_status().cloned().unwrap_or_default();
        let error = self.outcome.error();

        let mut conditions = previous.conditions.clone();
        for condition_type in K::condition_types() {
            conditions.set_condition(condition_for(*condition_type, error, K::condition_types()));
        }

        RemoteStatus {
            // A failure before the remote entity was resolved keeps the last known ID
            remote_id: self.outcome.remote_id.or(previous.remote_id),
            provider_account_host: self
                .provider_account_host
                .clone()
                .or(previous.provider_account_host),
            state: self.outcome.state.clone().or(previous.state),
            observed_generation: previous.observed_generation,
            conditions,
        }
    }

    pub async fn reconcile<W>(&self, writer: &W) -> Result<StatusOutcome, StoreError>
    where
        W: StatusWriter<K> + ?Sized,
    {
        let previous = self.resource.remote_status().cloned().unwrap_or_default();
        let mut status = self.calculate_status();
        let generation = self.resource.generation();

        if status.same_as(&previous) && previous.observed_generation == generation {
            debug!("status unchanged, steady state");
            return Ok(StatusOutcome::Steady);
        }

        status.observed_generation = generation;
        let ready = status.is_ready();
        let mut updated = self.resource.clone();
        updated.set_remote_status(status);

        match writer.write_status(&updated).await {
            Ok(()) => {
                info!(ready, "status updated");
                metrics::increment_status_writes();
                Ok(StatusOutcome::Updated)
            }
            Err(e) if e.is_conflict() => {
                info!("status write conflict, requeueing");
                metrics::increment_status_conflicts();
                Ok(StatusOutcome::Requeue)
            }
            Err(e) => Err(e),
        }
    }
}

/// Error kind a condition type reports, if it reports one
fn explained_kind(condition_type: ConditionType) -> Option<ErrorKind> {
    match condition_type {
        ConditionType::Invalid => Some(ErrorKind::InvalidSpec),
        ConditionType::Orphan => Some(ErrorKind::OrphanSpec),
        ConditionType::Waiting => Some(ErrorKind::Wait),
        ConditionType::Ready | ConditionType::Failed => None,
    }
}

/// Value of one condition for a pass outcome
///
/// `Failed` catches every error that no other condition of the kind's
/// vocabulary accounts for.
fn condition_for(
    condition_type: ConditionType,
    error: Option<&SyncError>,
    vocabulary: &[ConditionType],
) -> Condition {
    let kind = error.map(SyncError::kind);
    let holds = match condition_type {
        ConditionType::Ready => error.is_none(),
        ConditionType::Failed => kind.is_some_and(|kind| {
            !vocabulary
                .iter()
                .any(|t| explained_kind(*t) == Some(kind))
        }),
        other => kind.is_some() && explained_kind(other) == kind,
    };

    let condition = Condition::new(condition_type, holds);
    match (holds, error) {
        (true, Some(e)) => condition.with_reason(reason_for(e)).with_message(e.to_string()),
        (true, None) => condition.with_reason("Synced"),
        (false, _) => condition,
    }
}

fn reason_for(error: &SyncError) -> String {
    match error.task() {
        Some(task) => format!("{task}{}", error.kind().as_str()),
        None => error.kind().as_str().to_string(),
    }
}
