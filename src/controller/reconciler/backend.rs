//! # Backend Reconciliation
//!
//! Syncs a Backend resource to a 3scale backend API:
//!
//! 1. `SyncBackend` - find the backend by system name, create or patch it
//! 2. `SyncMethods` - methods under the backend `hits` metric
//! 3. `SyncMetrics` - the remaining metrics
//! 4. `SyncMappingRules` - ordered mapping rules
//!
//! Deleted methods and metrics are also removed from the plan limits of the
//! products that use this backend.

use super::references::{remove_backend_metric_references, remove_backend_usage};
use super::targets::{hits_id, MappingRulesTarget, MethodsTarget, MetricIndex, MetricsTarget};
use super::validation::validate_backend;
use super::{finish_pass, write_back, Reconciler, ReconcilerError};
use crate::constants::BACKEND_FINALIZER;
use crate::controller::provider_account::Connection;
use crate::controller::store::{ensure_finalizer, has_finalizer, remove_finalizer, ObjectStore};
use crate::crd::{Backend, BackendSpec, Product};
use crate::engine::patch::changed;
use crate::engine::{
    OrderedListReconciler, Patch, SetReconciler, SyncError, SyncOutcome, TaskRunner,
};
use crate::observability::metrics;
use crate::remote::types::{BackendApi, BackendApiParams, BackendApiPatch};
use crate::remote::{AdminApi, Scope};
use futures::FutureExt;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

const KIND: &str = "Backend";

/// State shared by the tasks of one backend pass
pub struct BackendSyncContext {
    api: Arc<dyn AdminApi>,
    spec: BackendSpec,
    namespace: String,
    host: String,
    products: Arc<dyn ObjectStore<Product>>,
    /// Set by `SyncBackend`
    backend_id: Option<i64>,
    /// Set by `SyncMethods`
    hits_id: Option<i64>,
}

impl BackendSyncContext {
    pub fn new(
        connection: &Connection,
        spec: BackendSpec,
        namespace: impl Into<String>,
        products: Arc<dyn ObjectStore<Product>>,
    ) -> Self {
        Self {
            api: connection.api.clone(),
            spec,
            namespace: namespace.into(),
            host: connection.host.clone(),
            products,
            backend_id: None,
            hits_id: None,
        }
    }

    fn scope(&self) -> Result<Scope, SyncError> {
        self.backend_id
            .map(Scope::Backend)
            .ok_or_else(|| SyncError::reference_not_found("remote backend"))
    }
}

/// Entry point for the watch loop
pub async fn reconcile_backend(
    backend: Arc<Backend>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let span = info_span!(
        "controller.reconcile",
        resource.kind = KIND,
        resource.name = %backend.name_any(),
        resource.namespace = %backend.namespace().unwrap_or_default(),
    );
    let start = Instant::now();
    metrics::increment_reconciliations(KIND);

    let result = backend_pass(&backend, &ctx).instrument(span).await;

    metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());
    result
}

async fn backend_pass(backend: &Backend, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if backend.meta().deletion_timestamp.is_some() {
        return cleanup_backend(backend, ctx).await;
    }

    let mut defaulted = backend.clone();
    let spec_changed = defaulted.spec.set_defaults();
    let finalizer_added = ensure_finalizer(&mut defaulted, BACKEND_FINALIZER);
    if spec_changed || finalizer_added {
        info!(spec_changed, finalizer_added, "writing defaults back");
        return write_back(ctx.backends.as_ref(), &defaulted, ctx).await;
    }

    let namespace = backend.namespace().unwrap_or_default();
    let mut host = None;
    let outcome = match validate_backend(&backend.spec) {
        Err(errors) => {
            warn!(errors = %errors, "backend spec is invalid");
            SyncOutcome::failed(None, SyncError::InvalidSpec(errors))
        }
        Ok(()) => match ctx
            .accounts
            .connect(&namespace, backend.spec.provider_account_ref.as_ref())
            .await
        {
            Err(e) => SyncOutcome::failed(None, e),
            Ok(connection) => {
                host = Some(connection.host.clone());
                let mut sync = BackendSyncContext::new(
                    &connection,
                    backend.spec.clone(),
                    namespace,
                    ctx.products.clone(),
                );
                sync_backend(&mut sync).await
            }
        },
    };

    finish_pass(backend, ctx.backends.as_ref(), host, outcome, ctx).await
}

/// Run every backend task. The remote ID is reported even when a later task fails.
pub async fn sync_backend(ctx: &mut BackendSyncContext) -> SyncOutcome {
    let mut runner = TaskRunner::new("backend");
    runner
        .add_task("SyncBackend", |ctx| sync_backend_api(ctx).boxed())
        .add_task("SyncMethods", |ctx| sync_methods(ctx).boxed())
        .add_task("SyncMetrics", |ctx| sync_metrics(ctx).boxed())
        .add_task("SyncMappingRules", |ctx| sync_mapping_rules(ctx).boxed());

    let result = runner.run(ctx).await;
    SyncOutcome {
        remote_id: ctx.backend_id,
        state: None,
        result,
    }
}

async fn find_backend_api(
    api: &dyn AdminApi,
    system_name: &str,
) -> Result<Option<BackendApi>, SyncError> {
    Ok(api
        .list_backend_apis()
        .await?
        .into_iter()
        .find(|remote| remote.system_name == system_name))
}

async fn sync_backend_api(ctx: &mut BackendSyncContext) -> Result<(), SyncError> {
    let spec = &ctx.spec;
    let id = match find_backend_api(ctx.api.as_ref(), &spec.system_name).await? {
        Some(remote) => {
            let patch = BackendApiPatch {
                name: changed(&spec.name, &remote.name),
                description: changed(&spec.description, &remote.description),
                private_endpoint: changed(&spec.private_base_url, &remote.private_endpoint),
            };
            if !patch.is_empty() {
                debug!(patch = ?patch, "updating backend");
                ctx.api.update_backend_api(remote.id, &patch).await?;
                metrics::increment_remote_mutations("backendApis", "update");
            }
            remote.id
        }
        None => {
            let params = BackendApiParams {
                name: spec.name.clone(),
                system_name: spec.system_name.clone(),
                description: spec.description.clone(),
                private_endpoint: spec.private_base_url.clone(),
            };
            let created = ctx.api.create_backend_api(&params).await?;
            info!(backend.id = created.id, "created backend");
            metrics::increment_remote_mutations("backendApis", "create");
            created.id
        }
    };
    ctx.backend_id = Some(id);
    Ok(())
}

async fn sync_methods(ctx: &mut BackendSyncContext) -> Result<(), SyncError> {
    let scope = ctx.scope()?;
    let hits = hits_id(ctx.api.as_ref(), scope).await?;
    ctx.hits_id = Some(hits);

    let target = MethodsTarget::new(ctx.api.as_ref(), scope, hits);
    let report = SetReconciler::new(&target).reconcile(&ctx.spec.methods).await?;
    remove_backend_metric_references(
        ctx.products.as_ref(),
        &ctx.namespace,
        &ctx.spec.system_name,
        &ctx.host,
        &report.deleted,
    )
    .await?;
    Ok(())
}

async fn sync_metrics(ctx: &mut BackendSyncContext) -> Result<(), SyncError> {
    let scope = ctx.scope()?;
    let hits = match ctx.hits_id {
        Some(id) => id,
        None => hits_id(ctx.api.as_ref(), scope).await?,
    };

    let target = MetricsTarget::new(ctx.api.as_ref(), scope, hits);
    let report = SetReconciler::new(&target).reconcile(&ctx.spec.metrics).await?;
    remove_backend_metric_references(
        ctx.products.as_ref(),
        &ctx.namespace,
        &ctx.spec.system_name,
        &ctx.host,
        &report.deleted,
    )
    .await?;
    Ok(())
}

async fn sync_mapping_rules(ctx: &mut BackendSyncContext) -> Result<(), SyncError> {
    let scope = ctx.scope()?;
    let index = MetricIndex::load(ctx.api.as_ref(), scope, None).await?;
    let target = MappingRulesTarget::new(ctx.api.as_ref(), scope, &index);
    OrderedListReconciler::new(&target)
        .reconcile(&ctx.spec.mapping_rules)
        .await?;
    Ok(())
}

/// Delete the remote backend and release the finalizer
///
/// Products still using the backend have the usage removed first; 3scale
/// refuses to delete a backend that is in use, so the pass requeues until
/// those products have synced.
async fn cleanup_backend(backend: &Backend, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if !has_finalizer(backend, BACKEND_FINALIZER) {
        return Ok(Action::await_change());
    }

    let namespace = backend.namespace().unwrap_or_default();
    let system_name = backend.spec.system_name.as_str();
    let config = ctx.config.read().await.clone();

    match ctx
        .accounts
        .connect(&namespace, backend.spec.provider_account_ref.as_ref())
        .await
    {
        Ok(connection) => {
            let rewritten =
                remove_backend_usage(ctx.products.as_ref(), &namespace, system_name, &connection.host)
                    .await?;
            if rewritten > 0 {
                info!(products = rewritten, "waiting for products to drop the backend");
                metrics::increment_requeues_total("backend-in-use");
                return Ok(Action::requeue(config.orphan_requeue()));
            }

            if let Some(remote) = find_backend_api(connection.api.as_ref(), system_name).await? {
                match connection.api.delete_backend_api(remote.id).await {
                    Ok(()) => {
                        info!(backend.id = remote.id, "deleted remote backend");
                        metrics::increment_remote_mutations("backendApis", "delete");
                    }
                    Err(e) if e.is_not_found() => debug!("remote backend already gone"),
                    Err(e) if e.is_unprocessable() => {
                        info!(error = %e, "remote backend still in use, retrying");
                        metrics::increment_requeues_total("backend-in-use");
                        return Ok(Action::requeue(config.orphan_requeue()));
                    }
                    Err(e) => return Err(SyncError::from(e).into()),
                }
            }
        }
        Err(e) if matches!(e, SyncError::ReferenceNotFound { .. }) => {
            warn!(error = %e, "provider account is gone, releasing backend without remote cleanup");
        }
        Err(e) => return Err(e.into()),
    }

    let mut released = backend.clone();
    remove_finalizer(&mut released, BACKEND_FINALIZER);
    write_back(ctx.backends.as_ref(), &released, ctx).await
}
