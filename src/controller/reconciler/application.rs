//! # Application Reconciliation
//!
//! Syncs an Application resource to a 3scale application of a developer
//! account. The referenced Product resource is resolved first and the
//! application is **orphan** while:
//!
//! - no Product resource of that name exists in the namespace
//! - the Product is invalid, has no remote ID yet or lives in another tenant
//! - the Product does not declare the requested plan
//!
//! `SyncApplication` then finds the application by the remote ID recorded in
//! the status, creates it when missing, and brings its name, description,
//! plan and live/suspended state in line with the spec.

use super::validation::validate_application;
use super::{finish_pass, write_back, Reconciler, ReconcilerError};
use crate::constants::APPLICATION_FINALIZER;
use crate::controller::provider_account::Connection;
use crate::controller::store::{ensure_finalizer, has_finalizer, remove_finalizer, ObjectStore};
use crate::crd::{
    Application, ApplicationSpec, ConditionType, Product, APPLICATION_LIVE, APPLICATION_SUSPENDED,
};
use crate::engine::patch::changed;
use crate::engine::{Patch, SpecErrors, SyncError, SyncOutcome, TaskRunner};
use crate::observability::metrics;
use crate::remote::types::{ApplicationParams, ApplicationPatch};
use crate::remote::AdminApi;
use futures::FutureExt;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

const KIND: &str = "Application";

/// State shared by the tasks of one application pass
pub struct ApplicationSyncContext {
    api: Arc<dyn AdminApi>,
    spec: ApplicationSpec,
    product_id: i64,
    /// Remote ID recorded by an earlier pass
    known_id: Option<i64>,
    /// Set by `SyncApplication`
    application_id: Option<i64>,
    state: Option<String>,
}

impl ApplicationSyncContext {
    pub fn new(
        connection: &Connection,
        spec: ApplicationSpec,
        product_id: i64,
        known_id: Option<i64>,
    ) -> Self {
        Self {
            api: connection.api.clone(),
            spec,
            product_id,
            known_id,
            application_id: None,
            state: None,
        }
    }
}

/// Entry point for the watch loop
pub async fn reconcile_application(
    application: Arc<Application>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let span = info_span!(
        "controller.reconcile",
        resource.kind = KIND,
        resource.name = %application.name_any(),
        resource.namespace = %application.namespace().unwrap_or_default(),
    );
    let start = Instant::now();
    metrics::increment_reconciliations(KIND);

    let result = application_pass(&application, &ctx).instrument(span).await;

    metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());
    result
}

async fn application_pass(
    application: &Application,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    if application.meta().deletion_timestamp.is_some() {
        return cleanup_application(application, ctx).await;
    }

    let mut with_finalizer = application.clone();
    if ensure_finalizer(&mut with_finalizer, APPLICATION_FINALIZER) {
        info!("adding finalizer");
        return write_back(ctx.applications.as_ref(), &with_finalizer, ctx).await;
    }

    let namespace = application.namespace().unwrap_or_default();
    let known_id = application.status.as_ref().and_then(|s| s.remote_id);
    let mut host = None;
    let outcome = match validate_application(&application.spec) {
        Err(errors) => {
            warn!(errors = %errors, "application spec is invalid");
            SyncOutcome::failed(None, SyncError::InvalidSpec(errors))
        }
        Ok(()) => match ctx
            .accounts
            .connect(&namespace, application.spec.provider_account_ref.as_ref())
            .await
        {
            Err(e) => SyncOutcome::failed(None, e),
            Ok(connection) => {
                host = Some(connection.host.clone());
                match resolve_application_product(
                    &application.spec,
                    &namespace,
                    &connection.host,
                    ctx.products.as_ref(),
                )
                .await
                {
                    Err(e) => SyncOutcome::failed(None, e),
                    Ok(product_id) => {
                        let mut sync = ApplicationSyncContext::new(
                            &connection,
                            application.spec.clone(),
                            product_id,
                            known_id,
                        );
                        sync_application(&mut sync).await
                    }
                }
            }
        },
    };

    finish_pass(application, ctx.applications.as_ref(), host, outcome, ctx).await
}

/// Remote ID of the product the application subscribes to
///
/// The Product resource must be synced to the same tenant, must not be
/// invalid and must declare the requested plan.
pub async fn resolve_application_product(
    spec: &ApplicationSpec,
    namespace: &str,
    host: &str,
    products: &dyn ObjectStore<Product>,
) -> Result<i64, SyncError> {
    let product_name = &spec.product_ref.name;
    let product = products
        .list(namespace)
        .await?
        .into_iter()
        .filter(|product| product.meta().deletion_timestamp.is_none())
        .find(|product| product.name_any() == *product_name);

    let orphan = |field: &str, message: String| {
        Err(SyncError::OrphanSpec(SpecErrors::single(field, message)))
    };

    let Some(product) = product else {
        return orphan(
            "spec.productRef",
            format!("product {product_name} does not exist"),
        );
    };
    let status = product.status.clone().unwrap_or_default();

    if status.conditions.is_true(ConditionType::Invalid) {
        return orphan("spec.productRef", format!("product {product_name} is invalid"));
    }
    let Some(product_id) = status.remote_id else {
        return orphan(
            "spec.productRef",
            format!("product {product_name} is not synced yet"),
        );
    };
    if status
        .provider_account_host
        .as_deref()
        .is_some_and(|product_host| product_host != host)
    {
        return orphan(
            "spec.productRef",
            format!("product {product_name} belongs to another provider account"),
        );
    }
    if !product
        .spec
        .application_plans
        .contains_key(&spec.application_plan_name)
    {
        return orphan(
            "spec.applicationPlanName",
            format!(
                "plan {} is not declared by product {product_name}",
                spec.application_plan_name
            ),
        );
    }
    Ok(product_id)
}

/// Run the application task. The remote ID and state are reported even when it fails halfway.
pub async fn sync_application(ctx: &mut ApplicationSyncContext) -> SyncOutcome {
    let mut runner = TaskRunner::new("application");
    runner.add_task("SyncApplication", |ctx| sync_remote_application(ctx).boxed());

    let result = runner.run(ctx).await;
    SyncOutcome {
        remote_id: ctx.application_id,
        state: ctx.state.clone(),
        result,
    }
}

async fn find_plan_id(
    api: &dyn AdminApi,
    product_id: i64,
    system_name: &str,
) -> Result<i64, SyncError> {
    api.list_application_plans(product_id)
        .await?
        .into_iter()
        .find(|plan| plan.system_name == system_name)
        .map(|plan| plan.id)
        .ok_or_else(|| SyncError::reference_not_found(format!("application plan {system_name}")))
}

async fn sync_remote_application(ctx: &mut ApplicationSyncContext) -> Result<(), SyncError> {
    let api = ctx.api.as_ref();
    let spec = &ctx.spec;
    let account_id = spec.account_id;
    let plan_id = find_plan_id(api, ctx.product_id, &spec.application_plan_name).await?;

    let existing = api
        .list_applications(account_id)
        .await?
        .into_iter()
        .find(|remote| Some(remote.id) == ctx.known_id);

    let remote = match existing {
        Some(remote) => remote,
        None => {
            let params = ApplicationParams {
                plan_id,
                name: spec.name.clone(),
                description: spec.description.clone(),
            };
            let created = api.create_application(account_id, &params).await?;
            info!(application.id = created.id, account.id = account_id, "created application");
            metrics::increment_remote_mutations("applications", "create");
            created
        }
    };
    ctx.application_id = Some(remote.id);
    ctx.state = Some(remote.state.clone());

    let patch = ApplicationPatch {
        name: changed(&spec.name, &remote.name),
        description: changed(&spec.description, &remote.description),
    };
    if !patch.is_empty() {
        debug!(patch = ?patch, "updating application");
        api.update_application(account_id, remote.id, &patch).await?;
        metrics::increment_remote_mutations("applications", "update");
    }

    if remote.plan_id != plan_id {
        info!(from = remote.plan_id, to = plan_id, "changing application plan");
        api.change_application_plan(account_id, remote.id, plan_id)
            .await?;
        metrics::increment_remote_mutations("applications", "change_plan");
    }

    match (spec.suspend, remote.state.as_str()) {
        (true, APPLICATION_LIVE) => {
            api.suspend_application(account_id, remote.id).await?;
            info!(application.id = remote.id, "suspended application");
            metrics::increment_remote_mutations("applications", "suspend");
            ctx.state = Some(APPLICATION_SUSPENDED.to_string());
        }
        (false, APPLICATION_SUSPENDED) => {
            api.resume_application(account_id, remote.id).await?;
            info!(application.id = remote.id, "resumed application");
            metrics::increment_remote_mutations("applications", "resume");
            ctx.state = Some(APPLICATION_LIVE.to_string());
        }
        _ => {}
    }
    Ok(())
}

/// Delete the remote application and release the finalizer
async fn cleanup_application(
    application: &Application,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    if !has_finalizer(application, APPLICATION_FINALIZER) {
        return Ok(Action::await_change());
    }

    let remote_id = application.status.as_ref().and_then(|s| s.remote_id);
    if let Some(id) = remote_id {
        let namespace = application.namespace().unwrap_or_default();
        match ctx
            .accounts
            .connect(&namespace, application.spec.provider_account_ref.as_ref())
            .await
        {
            Ok(connection) => {
                match connection
                    .api
                    .delete_application(application.spec.account_id, id)
                    .await
                {
                    Ok(()) => {
                        info!(application.id = id, "deleted remote application");
                        metrics::increment_remote_mutations("applications", "delete");
                    }
                    Err(e) if e.is_not_found() => debug!("remote application already gone"),
                    Err(e) => return Err(SyncError::from(e).into()),
                }
            }
            Err(e) if matches!(e, SyncError::ReferenceNotFound { .. }) => {
                warn!(error = %e, "provider account is gone, releasing application without remote cleanup");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut released = application.clone();
    remove_finalizer(&mut released, APPLICATION_FINALIZER);
    write_back(ctx.applications.as_ref(), &released, ctx).await
}
