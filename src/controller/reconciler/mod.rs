//! # Reconciler
//!
//! Per-resource reconciliation for Backend, Product and Application resources.
//!
//! ## Pass structure
//!
//! 1. **Deletion**: a resource being deleted has its remote entity removed,
//!    then its finalizer released
//! 2. **Defaults and finalizer**: written back to the resource; the resulting
//!    watch event starts a fresh pass
//! 3. **Validation**: an invalid spec fails without touching the admin API
//! 4. **Sync**: ordered tasks against the admin API of the provider account
//! 5. **Status**: conditions written only when they changed
//! 6. **Requeue policy**: see [`next_action`]
//!
//! ## Module Structure
//!
//! - `application` - Application sync task, product reference checks and cleanup
//! - `backend` - Backend sync tasks and cleanup
//! - `product` - Product sync tasks, backend reference checks and cleanup
//! - `references` - Removal of stale backend metric references from products
//! - `targets` - Collection adapters for the generic set and list reconcilers
//! - `validation` - Spec validation

pub mod application;
pub mod backend;
pub mod product;
mod references;
pub mod targets;
pub mod validation;

pub use application::reconcile_application;
pub use backend::reconcile_backend;
pub use product::reconcile_product;

use crate::config::{ControllerConfig, SharedControllerConfig};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::provider_account::AdminApiFactory;
use crate::controller::store::ObjectStore;
use crate::crd::{Application, Backend, Product};
use crate::engine::{
    Converging, ErrorKind, StatusOutcome, StatusReconciler, StoreError, SyncError, SyncOutcome,
};
use crate::observability::metrics;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcilerError {
    /// Label used for the error metric
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcilerError::Sync(e) => e.kind().as_str(),
            ReconcilerError::Store(_) => "Store",
        }
    }
}

/// Backoff state for a single resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Shared context of every controller
pub struct Reconciler {
    pub config: SharedControllerConfig,
    pub accounts: Arc<dyn AdminApiFactory>,
    pub backends: Arc<dyn ObjectStore<Backend>>,
    pub products: Arc<dyn ObjectStore<Product>>,
    pub applications: Arc<dyn ObjectStore<Application>>,
    /// Per resource (`Kind/namespace/name`) error backoff
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        config: SharedControllerConfig,
        accounts: Arc<dyn AdminApiFactory>,
        backends: Arc<dyn ObjectStore<Backend>>,
        products: Arc<dyn ObjectStore<Product>>,
        applications: Arc<dyn ObjectStore<Application>>,
    ) -> Self {
        Self {
            config,
            accounts,
            backends,
            products,
            applications,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget the error history of a resource after a clean pass
    pub fn reset_backoff(&self, key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(key);
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }
}

/// Key identifying a resource in logs and backoff state
pub fn resource_key<K: Resource<DynamicType = ()>>(resource: &K) -> String {
    format!(
        "{}/{}/{}",
        K::kind(&()),
        resource.namespace().unwrap_or_default(),
        resource.name_any()
    )
}

/// Write the status for a pass and decide what happens next
pub(crate) async fn finish_pass<K>(
    resource: &K,
    store: &dyn ObjectStore<K>,
    provider_account_host: Option<String>,
    outcome: SyncOutcome,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError>
where
    K: Converging + Resource<DynamicType = ()>,
{
    let status = StatusReconciler::new(resource, provider_account_host, &outcome)
        .reconcile(store)
        .await?;
    let config = ctx.config.read().await.clone();
    let key = resource_key(resource);
    let action = next_action(status, outcome.result, &config)?;
    ctx.reset_backoff(&key);
    Ok(action)
}

/// Persist metadata or spec changes; the resulting watch event starts the next pass
pub(crate) async fn write_back<K>(
    store: &dyn ObjectStore<K>,
    resource: &K,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError>
where
    K: Send + Sync,
{
    match store.replace(resource).await {
        Ok(_) => Ok(Action::await_change()),
        Err(e) if e.is_conflict() => {
            debug!("write back conflict, requeueing");
            metrics::increment_requeues_total("write-conflict");
            Ok(Action::requeue(ctx.config.read().await.conflict_requeue()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Requeue policy after the status has been handled
///
/// - a status write conflict requeues quickly, whatever the outcome
/// - success resyncs periodically
/// - an invalid spec waits for the next change
/// - orphaned or waiting resources are retried after a fixed delay
/// - any other failure goes to the error policy for backoff
pub fn next_action(
    status: StatusOutcome,
    result: Result<(), SyncError>,
    config: &ControllerConfig,
) -> Result<Action, ReconcilerError> {
    if status.requeue() {
        metrics::increment_requeues_total("status-conflict");
        return Ok(Action::requeue(config.conflict_requeue()));
    }

    let Err(error) = result else {
        metrics::increment_requeues_total("resync");
        return Ok(Action::requeue(config.resync_interval()));
    };

    match error.kind() {
        ErrorKind::InvalidSpec => {
            info!("spec validation error, waiting for a spec change: {}", error);
            Ok(Action::await_change())
        }
        ErrorKind::OrphanSpec => {
            info!("orphan references, retrying in {}s: {}", config.orphan_requeue_secs, error);
            metrics::increment_requeues_total("orphan");
            Ok(Action::requeue(config.orphan_requeue()))
        }
        ErrorKind::Wait => {
            info!("waiting on dependency, retrying in {}s: {}", config.orphan_requeue_secs, error);
            metrics::increment_requeues_total("waiting");
            Ok(Action::requeue(config.orphan_requeue()))
        }
        ErrorKind::Failed => Err(ReconcilerError::Sync(error)),
    }
}
