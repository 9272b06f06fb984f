//! # Watch Loop
//!
//! Runs the Backend, Product and Application controllers side by side until
//! a shutdown signal arrives.
//!
//! The Product controller also watches Backends: a Backend event triggers
//! the products of its namespace that use it, so a product waiting on a
//! backend resumes as soon as that backend is synced. The Application
//! controller watches Products the same way.

use crate::controller::reconciler::{
    reconcile_application, reconcile_backend, reconcile_product, Reconciler, ReconcilerError,
};
use crate::controller::server::ServerState;
use crate::crd::{Application, Backend, Product};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::{Action, Controller, Error as ControllerError};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const INITIAL_WATCH_BACKOFF_MS: u64 = 1_000;
const MAX_WATCH_BACKOFF_MS: u64 = 30_000;

/// Run every controller until shutdown
pub async fn run_watch_loop(
    backends: Api<Backend>,
    products: Api<Product>,
    applications: Api<Application>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let backend_backoff = Arc::new(AtomicU64::new(INITIAL_WATCH_BACKOFF_MS));
    let backend_loop = Controller::new(backends.clone(), watcher::Config::default())
        .shutdown_on_signal()
        .run(
            reconcile_backend,
            handle_reconciliation_error::<Backend>,
            reconciler.clone(),
        )
        .for_each(move |result| {
            let backoff = backend_backoff.clone();
            async move {
                handle_result(result, &backoff).await;
            }
        });

    let product_controller = Controller::new(products.clone(), watcher::Config::default());
    let product_store = product_controller.store();
    let product_backoff = Arc::new(AtomicU64::new(INITIAL_WATCH_BACKOFF_MS));
    let product_loop = product_controller
        .watches(backends, watcher::Config::default(), move |backend: Backend| {
            let namespace = backend.namespace();
            let system_name = backend.spec.system_name;
            product_store
                .state()
                .into_iter()
                .filter(|product| {
                    product.namespace() == namespace
                        && product.spec.backend_usages.contains_key(&system_name)
                })
                .map(|product| ObjectRef::from_obj(product.as_ref()))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(
            reconcile_product,
            handle_reconciliation_error::<Product>,
            reconciler.clone(),
        )
        .for_each(move |result| {
            let backoff = product_backoff.clone();
            async move {
                handle_result(result, &backoff).await;
            }
        });

    let application_controller = Controller::new(applications, watcher::Config::default());
    let application_store = application_controller.store();
    let application_backoff = Arc::new(AtomicU64::new(INITIAL_WATCH_BACKOFF_MS));
    let application_loop = application_controller
        .watches(products, watcher::Config::default(), move |product: Product| {
            let namespace = product.namespace();
            let name = product.name_any();
            application_store
                .state()
                .into_iter()
                .filter(|application| {
                    application.namespace() == namespace
                        && application.spec.product_ref.name == name
                })
                .map(|application| ObjectRef::from_obj(application.as_ref()))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(
            reconcile_application,
            handle_reconciliation_error::<Application>,
            reconciler,
        )
        .for_each(move |result| {
            let backoff = application_backoff.clone();
            async move {
                handle_result(result, &backoff).await;
            }
        });

    info!("Watch loops started");
    futures::future::join3(backend_loop, product_loop, application_loop).await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controllers shut down");
    Ok(())
}

/// Log one controller result
///
/// Reconciler failures were already handled by the error policy; only
/// stream failures need classification.
async fn handle_result<K: kube::Resource>(
    result: Result<(ObjectRef<K>, Action), ControllerError<ReconcilerError, watcher::Error>>,
    backoff: &Arc<AtomicU64>,
) {
    match result {
        Ok((object, action)) => {
            debug!(object = %object.name, action = ?action, "reconciled");
            backoff.store(INITIAL_WATCH_BACKOFF_MS, Ordering::Relaxed);
        }
        Err(ControllerError::ReconcilerFailed(error, object)) => {
            debug!(object = %object, error = %error, "reconcile failed, backing off");
        }
        Err(ControllerError::ObjectNotFound(object)) => {
            debug!(object = %object, "object no longer exists");
        }
        Err(e) => {
            let message = e.to_string();
            if handle_watch_stream_error(&message, backoff, MAX_WATCH_BACKOFF_MS)
                .await
                .is_none()
            {
                warn!("Controller stream error handled, watch continues: {}", message);
            }
        }
    }
}
