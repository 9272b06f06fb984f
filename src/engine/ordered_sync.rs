//! # Ordered List Reconciliation
//!
//! Converges a positioned remote list (mapping rules) onto a desired
//! sequence. Items are keyed, but unlike keyed sets the remote also tracks a
//! 1-based position which must match the desired index.
//!
//! ## Algorithm
//!
//! 1. List remote items and delete those whose key is not desired
//! 2. Re-list if anything was deleted; deletions renumber the remaining
//!    positions remotely
//! 3. Walk the desired sequence in order. At index `i` (position `i + 1`):
//!    - existing key: one update carrying all changed fields, position included
//!    - missing key: create at that position
//!
//! The snapshot from step 2 is not re-fetched during the walk. The remote
//! shifts siblings whenever an item is inserted or moved, so the snapshot
//! drifts. Alongside it the walk keeps a projected order: the snapshot with
//! our own inserts and moves applied locally. An item is repositioned when
//! either its snapshot position or its projected position differs from the
//! target. Walking in ascending desired order, positions `1..=i` are final
//! after index `i`, so one pass converges without extra round trips.

use crate::engine::error::SpecErrors;
use crate::engine::patch::Patch;
use crate::engine::SyncError;
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use tracing::{debug, info};

/// Positioned remote collection driven by [`OrderedListReconciler`]
#[async_trait]
pub trait OrderedTarget: Send + Sync {
    type Spec: Send + Sync;
    type Item: Send + Sync;
    type Patch: Patch + Debug + Send;

    fn kind(&self) -> &'static str;

    async fn list(&self) -> Result<Vec<Self::Item>, SyncError>;

    /// Key of a desired entry
    fn desired_key(&self, spec: &Self::Spec) -> String;

    fn key_of(&self, item: &Self::Item) -> String;

    /// Remote 1-based position
    fn position_of(&self, item: &Self::Item) -> u32;

    /// Field delta. `position` is set only when the item has to move.
    fn diff(
        &self,
        desired: &Self::Spec,
        existing: &Self::Item,
        position: Option<u32>,
    ) -> Result<Self::Patch, SyncError>;

    async fn create(&self, desired: &Self::Spec, position: u32) -> Result<(), SyncError>;

    async fn update(&self, existing: &Self::Item, patch: Self::Patch) -> Result<(), SyncError>;

    async fn delete(&self, existing: &Self::Item) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedReport {
    pub deleted: Vec<String>,
    /// Updated keys with the position they were placed at
    pub updated: Vec<(String, u32)>,
    pub created: Vec<(String, u32)>,
}

impl OrderedReport {
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.updated.is_empty() && self.created.is_empty()
    }
}

#[derive(Debug)]
pub struct OrderedListReconciler<'t, T> {
    target: &'t T,
}

impl<'t, T: OrderedTarget> OrderedListReconciler<'t, T> {
    pub fn new(target: &'t T) -> Self {
        Self { target }
    }

    pub async fn reconcile(&self, desired: &[T::Spec]) -> Result<OrderedReport, SyncError> {
        let kind = self.target.kind();
        let desired_keys = self.desired_keys(desired)?;
        let mut report = OrderedReport::default();

        let existing = self.target.list().await?;
        for item in &existing {
            let key = self.target.key_of(item);
            if desired_keys.contains(&key) {
                continue;
            }
            match self.target.delete(item).await {
                Ok(()) => {
                    info!(kind, key = %key, "deleted remote item");
                    metrics::increment_remote_mutations(kind, "delete");
                }
                Err(e) if e.is_not_found() => debug!(kind, key = %key, "remote item already gone"),
                Err(e) => return Err(e),
            }
            report.deleted.push(key);
        }

        let mut remaining = if report.deleted.is_empty() {
            existing
        } else {
            self.target.list().await?
        };
        remaining.sort_by_key(|item| self.target.position_of(item));
        let mut projected = ProjectedOrder::new(remaining.iter().map(|item| self.target.key_of(item)));
        let snapshot: BTreeMap<String, T::Item> = remaining
            .into_iter()
            .map(|item| (self.target.key_of(&item), item))
            .collect();

        for (index, spec) in desired.iter().enumerate() {
            let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let key = self.target.desired_key(spec);

            match snapshot.get(&key) {
                Some(item) => {
                    let misplaced = self.target.position_of(item) != position
                        || projected.position_of(&key) != Some(position);
                    let patch = self.target.diff(spec, item, misplaced.then_some(position))?;
                    if patch.is_empty() {
                        continue;
                    }
                    debug!(kind, key = %key, position, patch = ?patch, "updating remote item");
                    self.target.update(item, patch).await?;
                    if misplaced {
                        projected.place(&key, position);
                    }
                    metrics::increment_remote_mutations(kind, "update");
                    report.updated.push((key, position));
                }
                None => {
                    self.target.create(spec, position).await?;
                    projected.place(&key, position);
                    info!(kind, key = %key, position, "created remote item");
                    metrics::increment_remote_mutations(kind, "create");
                    report.created.push((key, position));
                }
            }
        }

        Ok(report)
    }

    /// Desired keys must be unique; a repeated key would be written twice per pass
    fn desired_keys(&self, desired: &[T::Spec]) -> Result<BTreeSet<String>, SyncError> {
        let mut keys = BTreeSet::new();
        let mut errors = SpecErrors::new();
        for (index, spec) in desired.iter().enumerate() {
            let key = self.target.desired_key(spec);
            if !keys.insert(key.clone()) {
                errors.push(
                    format!("spec.{}[{index}]", self.target.kind()),
                    format!("Duplicate value: {key}"),
                );
            }
        }
        if errors.is_empty() {
            Ok(keys)
        } else {
            Err(SyncError::InvalidSpec(errors))
        }
    }
}

/// Local model of the remote order, updated with our own mutations
#[derive(Debug)]
struct ProjectedOrder {
    keys: Vec<String>,
}

impl ProjectedOrder {
    fn new(keys: impl Iterator<Item = String>) -> Self {
        Self { keys: keys.collect() }
    }

    fn position_of(&self, key: &str) -> Option<u32> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|index| u32::try_from(index + 1).ok())
    }

    /// Insert or move `key` to a 1-based position, shifting siblings like the remote does
    fn place(&mut self, key: &str, position: u32) {
        self.keys.retain(|k| k != key);
        let index = usize::try_from(position)
            .unwrap_or(usize::MAX)
            .saturating_sub(1)
            .min(self.keys.len());
        self.keys.insert(index, key.to_string());
    }
}
