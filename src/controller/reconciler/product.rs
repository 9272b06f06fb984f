//! # Product Reconciliation
//!
//! Syncs a Product resource to a 3scale product (service). Backend usages are
//! resolved against the Backend resources of the namespace before anything
//! remote happens:
//!
//! - a usage naming no Backend resource makes the product **orphan**
//! - a usage naming a Backend that has not synced yet makes it **wait**
//!
//! Then, in order: `SyncProduct`, `SyncBackendUsages`, `SyncMethods`,
//! `SyncMetrics`, `SyncMappingRules`, `SyncApplicationPlans` (plans, then the
//! limits of each plan) and `SyncPolicies`.

use super::targets::{
    hits_id, ApplicationPlansTarget, BackendUsagesTarget, LimitsTarget, MappingRulesTarget,
    MethodsTarget, MetricIndex, MetricsTarget,
};
use super::validation::validate_product;
use super::{finish_pass, write_back, Reconciler, ReconcilerError};
use crate::constants::PRODUCT_FINALIZER;
use crate::controller::provider_account::Connection;
use crate::controller::store::{ensure_finalizer, has_finalizer, remove_finalizer, ObjectStore};
use crate::crd::{Backend, LimitSpec, Product, ProductSpec};
use crate::engine::patch::{changed, changed_opt};
use crate::engine::{
    OrderedListReconciler, Patch, SetReconciler, SpecErrors, SyncError, SyncOutcome, TaskRunner,
};
use crate::observability::metrics;
use crate::remote::types::{PolicyConfig, Service, ServiceParams, ServicePatch};
use crate::remote::{AdminApi, Scope};
use futures::FutureExt;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

const KIND: &str = "Product";

/// State shared by the tasks of one product pass
pub struct ProductSyncContext {
    api: Arc<dyn AdminApi>,
    spec: ProductSpec,
    /// Backend system name -> remote backend ID, for every usage in the spec
    backends: BTreeMap<String, i64>,
    /// Set by `SyncProduct`
    product_id: Option<i64>,
    /// Set by `SyncMethods`
    hits_id: Option<i64>,
}

impl ProductSyncContext {
    pub fn new(connection: &Connection, spec: ProductSpec, backends: BTreeMap<String, i64>) -> Self {
        Self {
            api: connection.api.clone(),
            spec,
            backends,
            product_id: None,
            hits_id: None,
        }
    }

    fn product_id(&self) -> Result<i64, SyncError> {
        self.product_id
            .ok_or_else(|| SyncError::reference_not_found("remote product"))
    }
}

/// Entry point for the watch loop
pub async fn reconcile_product(
    product: Arc<Product>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let span = info_span!(
        "controller.reconcile",
        resource.kind = KIND,
        resource.name = %product.name_any(),
        resource.namespace = %product.namespace().unwrap_or_default(),
    );
    let start = Instant::now();
    metrics::increment_reconciliations(KIND);

    let result = product_pass(&product, &ctx).instrument(span).await;

    metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());
    result
}

async fn product_pass(product: &Product, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if product.meta().deletion_timestamp.is_some() {
        return cleanup_product(product, ctx).await;
    }

    let mut defaulted = product.clone();
    let spec_changed = defaulted.spec.set_defaults();
    let finalizer_added = ensure_finalizer(&mut defaulted, PRODUCT_FINALIZER);
    if spec_changed || finalizer_added {
        info!(spec_changed, finalizer_added, "writing defaults back");
        return write_back(ctx.products.as_ref(), &defaulted, ctx).await;
    }

    let namespace = product.namespace().unwrap_or_default();
    let mut host = None;
    let outcome = match validate_product(&product.spec) {
        Err(errors) => {
            warn!(errors = %errors, "product spec is invalid");
            SyncOutcome::failed(None, SyncError::InvalidSpec(errors))
        }
        Ok(()) => match ctx
            .accounts
            .connect(&namespace, product.spec.provider_account_ref.as_ref())
            .await
        {
            Err(e) => SyncOutcome::failed(None, e),
            Ok(connection) => {
                host = Some(connection.host.clone());
                match resolve_backend_usages(
                    &product.spec,
                    &namespace,
                    &connection.host,
                    ctx.backends.as_ref(),
                )
                .await
                {
                    Err(e) => SyncOutcome::failed(None, e),
                    Ok(backends) => {
                        let mut sync =
                            ProductSyncContext::new(&connection, product.spec.clone(), backends);
                        sync_product(&mut sync).await
                    }
                }
            }
        },
    };

    finish_pass(product, ctx.products.as_ref(), host, outcome, ctx).await
}

/// Remote IDs of the backends the product uses
///
/// Backends are matched by system name among the Backend resources of the
/// namespace synced to the same tenant. Missing backends are reported
/// before unsynced ones.
pub async fn resolve_backend_usages(
    spec: &ProductSpec,
    namespace: &str,
    host: &str,
    backends: &dyn ObjectStore<Backend>,
) -> Result<BTreeMap<String, i64>, SyncError> {
    if spec.backend_usages.is_empty() {
        return Ok(BTreeMap::new());
    }

    let available: Vec<Backend> = backends
        .list(namespace)
        .await?
        .into_iter()
        .filter(|backend| backend.meta().deletion_timestamp.is_none())
        .collect();

    let mut orphans = SpecErrors::new();
    let mut unsynced = Vec::new();
    let mut resolved = BTreeMap::new();

    for system_name in spec.backend_usages.keys() {
        let candidate = available.iter().find(|backend| {
            backend.spec.system_name == *system_name
                && backend
                    .status
                    .as_ref()
                    .and_then(|status| status.provider_account_host.as_deref())
                    .is_none_or(|backend_host| backend_host == host)
        });

        let Some(backend) = candidate else {
            orphans.push(
                format!("spec.backendUsages[{system_name}]"),
                "backend usage does not have valid backend reference",
            );
            continue;
        };

        match backend
            .status
            .as_ref()
            .filter(|status| status.is_ready())
            .and_then(|status| status.remote_id)
        {
            Some(id) => {
                resolved.insert(system_name.clone(), id);
            }
            None => unsynced.push(system_name.as_str()),
        }
    }

    if !orphans.is_empty() {
        return Err(SyncError::OrphanSpec(orphans));
    }
    if !unsynced.is_empty() {
        return Err(SyncError::wait(format!(
            "backends not synced yet: {}",
            unsynced.join(", ")
        )));
    }
    Ok(resolved)
}

/// Run every product task. The remote ID is reported even when a later task fails.
pub async fn sync_product(ctx: &mut ProductSyncContext) -> SyncOutcome {
    let mut runner = TaskRunner::new("product");
    runner
        .add_task("SyncProduct", |ctx| sync_service(ctx).boxed())
        .add_task("SyncBackendUsages", |ctx| sync_backend_usages(ctx).boxed())
        .add_task("SyncMethods", |ctx| sync_methods(ctx).boxed())
        .add_task("SyncMetrics", |ctx| sync_metrics(ctx).boxed())
        .add_task("SyncMappingRules", |ctx| sync_mapping_rules(ctx).boxed())
        .add_task("SyncApplicationPlans", |ctx| sync_application_plans(ctx).boxed())
        .add_task("SyncPolicies", |ctx| sync_policies(ctx).boxed());

    let result = runner.run(ctx).await;
    SyncOutcome {
        remote_id: ctx.product_id,
        state: None,
        result,
    }
}

async fn find_service(api: &dyn AdminApi, system_name: &str) -> Result<Option<Service>, SyncError> {
    Ok(api
        .list_services()
        .await?
        .into_iter()
        .find(|remote| remote.system_name == system_name))
}

async fn sync_service(ctx: &mut ProductSyncContext) -> Result<(), SyncError> {
    let spec = &ctx.spec;
    let deployment_option = spec.deployment_option().map(str::to_string);

    let id = match find_service(ctx.api.as_ref(), &spec.system_name).await? {
        Some(remote) => {
            let patch = ServicePatch {
                name: changed(&spec.name, &remote.name),
                description: changed(&spec.description, &remote.description),
                deployment_option: changed_opt(
                    deployment_option.as_ref(),
                    &remote.deployment_option,
                ),
            };
            if !patch.is_empty() {
                debug!(patch = ?patch, "updating product");
                ctx.api.update_service(remote.id, &patch).await?;
                metrics::increment_remote_mutations("services", "update");
            }
            remote.id
        }
        None => {
            let params = ServiceParams {
                name: spec.name.clone(),
                system_name: spec.system_name.clone(),
                description: spec.description.clone(),
                deployment_option,
            };
            let created = ctx.api.create_service(&params).await?;
            info!(product.id = created.id, "created product");
            metrics::increment_remote_mutations("services", "create");
            created.id
        }
    };
    ctx.product_id = Some(id);
    Ok(())
}

async fn sync_backend_usages(ctx: &mut ProductSyncContext) -> Result<(), SyncError> {
    let product_id = ctx.product_id()?;
    let target = BackendUsagesTarget::new(ctx.api.as_ref(), product_id, &ctx.backends);
    SetReconciler::new(&target)
        .reconcile(&ctx.spec.backend_usages)
        .await?;
    Ok(())
}

async fn sync_methods(ctx: &mut ProductSyncContext) -> Result<(), SyncError> {
    let scope = Scope::Product(ctx.product_id()?);
    let hits = hits_id(ctx.api.as_ref(), scope).await?;
    ctx.hits_id = Some(hits);

    let target = MethodsTarget::new(ctx.api.as_ref(), scope, hits);
    SetReconciler::new(&target).reconcile(&ctx.spec.methods).await?;
    Ok(())
}

async fn sync_metrics(ctx: &mut ProductSyncContext) -> Result<(), SyncError> {
    let scope = Scope::Product(ctx.product_id()?);
    let hits = match ctx.hits_id {
        Some(id) => id,
        None => hits_id(ctx.api.as_ref(), scope).await?,
    };

    let target = MetricsTarget::new(ctx.api.as_ref(), scope, hits);
    SetReconciler::new(&target).reconcile(&ctx.spec.metrics).await?;
    Ok(())
}

async fn sync_mapping_rules(ctx: &mut ProductSyncContext) -> Result<(), SyncError> {
    let scope = Scope::Product(ctx.product_id()?);
    let index = MetricIndex::load(ctx.api.as_ref(), scope, None).await?;
    let target = MappingRulesTarget::new(ctx.api.as_ref(), scope, &index);
    OrderedListReconciler::new(&target)
        .reconcile(&ctx.spec.mapping_rules)
        .await?;
    Ok(())
}

async fn sync_application_plans(ctx: &mut ProductSyncContext) -> Result<(), SyncError> {
    let product_id = ctx.product_id()?;
    let api = ctx.api.as_ref();

    let plans_target = ApplicationPlansTarget::new(api, product_id);
    SetReconciler::new(&plans_target)
        .reconcile(&ctx.spec.application_plans)
        .await?;

    if ctx.spec.application_plans.is_empty() {
        return Ok(());
    }

    let plan_ids: BTreeMap<String, i64> = api
        .list_application_plans(product_id)
        .await?
        .into_iter()
        .map(|plan| (plan.system_name, plan.id))
        .collect();

    let mut index = MetricIndex::load(api, Scope::Product(product_id), None).await?;
    for (system_name, backend_id) in &ctx.backends {
        index
            .extend(api, Scope::Backend(*backend_id), Some(system_name))
            .await?;
    }

    for (system_name, plan) in &ctx.spec.application_plans {
        let plan_id = plan_ids.get(system_name).copied().ok_or_else(|| {
            SyncError::reference_not_found(format!("application plan {system_name}"))
        })?;
        let desired: BTreeMap<String, LimitSpec> = plan
            .limits
            .iter()
            .map(|limit| (limit.key(), limit.clone()))
            .collect();

        debug!(plan = %system_name, limits = desired.len(), "syncing plan limits");
        let target = LimitsTarget::new(api, plan_id, &index);
        SetReconciler::new(&target).reconcile(&desired).await?;
    }
    Ok(())
}

async fn sync_policies(ctx: &mut ProductSyncContext) -> Result<(), SyncError> {
    let Some(policies) = &ctx.spec.policies else {
        debug!("policy chain not managed");
        return Ok(());
    };
    let product_id = ctx.product_id()?;

    let desired: Vec<PolicyConfig> = policies
        .iter()
        .map(|policy| PolicyConfig {
            name: policy.name.clone(),
            version: policy.version.clone(),
            configuration: policy.configuration.clone(),
            enabled: policy.enabled,
        })
        .collect();

    let existing = ctx.api.list_policies(product_id).await?;
    if existing == desired {
        return Ok(());
    }

    info!(policies = desired.len(), "replacing policy chain");
    ctx.api.update_policies(product_id, &desired).await?;
    metrics::increment_remote_mutations("policies", "update");
    Ok(())
}

/// Delete the remote product and release the finalizer
async fn cleanup_product(product: &Product, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if !has_finalizer(product, PRODUCT_FINALIZER) {
        return Ok(Action::await_change());
    }

    let namespace = product.namespace().unwrap_or_default();
    match ctx
        .accounts
        .connect(&namespace, product.spec.provider_account_ref.as_ref())
        .await
    {
        Ok(connection) => {
            if let Some(remote) =
                find_service(connection.api.as_ref(), &product.spec.system_name).await?
            {
                match connection.api.delete_service(remote.id).await {
                    Ok(()) => {
                        info!(product.id = remote.id, "deleted remote product");
                        metrics::increment_remote_mutations("services", "delete");
                    }
                    Err(e) if e.is_not_found() => debug!("remote product already gone"),
                    Err(e) => return Err(SyncError::from(e).into()),
                }
            }
        }
        Err(e) if matches!(e, SyncError::ReferenceNotFound { .. }) => {
            warn!(error = %e, "provider account is gone, releasing product without remote cleanup");
        }
        Err(e) => return Err(e.into()),
    }

    let mut released = product.clone();
    remove_finalizer(&mut released, PRODUCT_FINALIZER);
    write_back(ctx.products.as_ref(), &released, ctx).await
}
