//! # Keyed Set Reconciliation
//!
//! Converges an unordered collection of remote items (methods, metrics,
//! backend usages, application plans, limits) onto a desired map keyed by a
//! stable string.
//!
//! ## Algorithm
//!
//! 1. List the remote collection and index it by key
//! 2. Delete remote items whose key is not desired
//! 3. Update items present on both sides when the computed patch is non-empty
//! 4. Create desired items that have no remote counterpart
//!
//! Deletes run first so a create can never collide with an item about to be
//! removed. Keys are processed in sorted order so runs are deterministic.
//! A delete answered with "not found" counts as done.

use crate::engine::patch::Patch;
use crate::engine::SyncError;
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use tracing::{debug, info};

/// Remote collection driven by [`SetReconciler`]
#[async_trait]
pub trait SetTarget: Send + Sync {
    /// Desired state of one item
    type Spec: Send + Sync;
    /// Remote representation of one item
    type Item: Send + Sync;
    /// Field delta between the two
    type Patch: Patch + Debug + Send;

    /// Collection name used in logs and metrics
    fn kind(&self) -> &'static str;

    async fn list(&self) -> Result<Vec<Self::Item>, SyncError>;

    fn key_of(&self, item: &Self::Item) -> String;

    fn diff(&self, desired: &Self::Spec, existing: &Self::Item) -> Result<Self::Patch, SyncError>;

    async fn create(&self, key: &str, desired: &Self::Spec) -> Result<(), SyncError>;

    async fn update(&self, existing: &Self::Item, patch: Self::Patch) -> Result<(), SyncError>;

    async fn delete(&self, existing: &Self::Item) -> Result<(), SyncError>;
}

/// Keys partitioned by the action they need
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub to_delete: Vec<String>,
    pub to_keep: Vec<String>,
    pub to_create: Vec<String>,
}

/// Partition desired and existing keys, each partition sorted
pub fn diff_keys<'a>(
    desired: impl IntoIterator<Item = &'a String>,
    existing: impl IntoIterator<Item = &'a String>,
) -> SetDiff {
    let desired: BTreeSet<&String> = desired.into_iter().collect();
    let existing: BTreeSet<&String> = existing.into_iter().collect();

    SetDiff {
        to_delete: existing.difference(&desired).map(|k| (*k).clone()).collect(),
        to_keep: existing.intersection(&desired).map(|k| (*k).clone()).collect(),
        to_create: desired.difference(&existing).map(|k| (*k).clone()).collect(),
    }
}

/// Keys touched by a reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetReport {
    pub deleted: Vec<String>,
    pub updated: Vec<String>,
    pub created: Vec<String>,
}

impl SetReport {
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.updated.is_empty() && self.created.is_empty()
    }
}

/// Reconciles one keyed collection
#[derive(Debug)]
pub struct SetReconciler<'t, T> {
    target: &'t T,
}

impl<'t, T: SetTarget> SetReconciler<'t, T> {
    pub fn new(target: &'t T) -> Self {
        Self { target }
    }

    /// Bring the remote collection in line with `desired`
    ///
    /// Stops at the first failing remote call. Calls already made are not rolled back;
    /// the next pass converges from wherever the remote ended up.
    pub async fn reconcile(
        &self,
        desired: &BTreeMap<String, T::Spec>,
    ) -> Result<SetReport, SyncError> {
        let kind = self.target.kind();
        let existing: BTreeMap<String, T::Item> = self
            .target
            .list()
            .await?
            .into_iter()
            .map(|item| (self.target.key_of(&item), item))
            .collect();

        let diff = diff_keys(desired.keys(), existing.keys());
        debug!(
            kind,
            delete = diff.to_delete.len(),
            keep = diff.to_keep.len(),
            create = diff.to_create.len(),
            "computed set diff"
        );

        let mut report = SetReport::default();

        for key in diff.to_delete {
            let Some(item) = existing.get(&key) else { continue };
            match self.target.delete(item).await {
                Ok(()) => {
                    info!(kind, key = %key, "deleted remote item");
                    metrics::increment_remote_mutations(kind, "delete");
                }
                Err(e) if e.is_not_found() => {
                    debug!(kind, key = %key, "remote item already gone");
                }
                Err(e) => return Err(e),
            }
            report.deleted.push(key);
        }

        for key in diff.to_keep {
            let (Some(spec), Some(item)) = (desired.get(&key), existing.get(&key)) else {
                continue;
            };
            let patch = self.target.diff(spec, item)?;
            if patch.is_empty() {
                continue;
            }
            debug!(kind, key = %key, patch = ?patch, "updating remote item");
            self.target.update(item, patch).await?;
            metrics::increment_remote_mutations(kind, "update");
            report.updated.push(key);
        }

        for key in diff.to_create {
            let Some(spec) = desired.get(&key) else { continue };
            self.target.create(&key, spec).await?;
            info!(kind, key = %key, "created remote item");
            metrics::increment_remote_mutations(kind, "create");
            report.created.push(key);
        }

        Ok(report)
    }
}
