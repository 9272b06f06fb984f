//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::{create_shared_config, ServerConfig, SharedControllerConfig};
use crate::controller::provider_account::SecretProviderAccounts;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::KubeStore;
use crate::crd::{Application, Backend, Product};
use crate::observability;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for Backend resources, scoped to the watched namespace
    pub backends: Api<Backend>,
    /// API for Product resources, scoped to the watched namespace
    pub products: Api<Product>,
    /// API for Application resources, scoped to the watched namespace
    pub applications: Api<Application>,
    /// Reconciler context shared by every controller
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub config: SharedControllerConfig,
}

impl fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
/// - Startup summary of existing resources
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capabilities_controller=info".into()),
        )
        .init();

    info!("Starting 3scale Capabilities Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (controller_config, server_config) = create_shared_config();
    let server_config = server_config.read().await.clone();

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());

    // Started in the background; we wait below until it is bound
    let server_state_clone = server_state.clone();
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let watch_namespace = controller_config.read().await.watch_namespace.clone();
    match &watch_namespace {
        Some(namespace) => info!("Watching namespace {}", namespace),
        None => info!("Watching all namespaces"),
    }
    let backends: Api<Backend> = scoped_api(&client, watch_namespace.as_deref());
    let products: Api<Product> = scoped_api(&client, watch_namespace.as_deref());
    let applications: Api<Application> = scoped_api(&client, watch_namespace.as_deref());

    let reconciler = Arc::new(Reconciler::new(
        controller_config.clone(),
        Arc::new(SecretProviderAccounts::new(
            client.clone(),
            controller_config.clone(),
        )),
        Arc::new(KubeStore::<Backend>::new(client.clone())),
        Arc::new(KubeStore::<Product>::new(client.clone())),
        Arc::new(KubeStore::<Application>::new(client.clone())),
    ));

    // The controllers reconcile everything they list on start; this only
    // checks the CRDs are installed and reports what is there
    summarize_existing_resources(&backends).await;
    summarize_existing_resources(&products).await;
    summarize_existing_resources(&applications).await;

    info!("Controller initialized, starting watch loops...");

    Ok(InitializationResult {
        client,
        backends,
        products,
        applications,
        reconciler,
        server_state,
        config: controller_config,
    })
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(server_config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(server_config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Log existing resources of one kind, tabulated by namespace
async fn summarize_existing_resources<K>(api: &Api<K>)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let kind = K::kind(&());
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.existing_resources",
        resource.kind = %kind
    );
    let _guard = span.enter();

    let list = match api.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            error!("{} CRD is not queryable; {:?}. Is the CRD installed?", kind, e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
            return;
        }
    };

    if list.items.is_empty() {
        info!("No existing {} resources found, watch will pick up new resources", kind);
        return;
    }

    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in &list.items {
        by_namespace
            .entry(item.namespace().unwrap_or_default())
            .or_default()
            .push(item.name_any());
    }

    info!(
        "Found {} existing {} resources in {} namespaces",
        list.items.len(),
        kind,
        by_namespace.len()
    );
    for (namespace, mut names) in by_namespace {
        names.sort();
        let shown = if names.len() <= 3 {
            names.join(", ")
        } else {
            format!("{}, ... ({} total)", names[..3].join(", "), names.len())
        };
        info!("  {}: {}", namespace, shown);
    }
}
