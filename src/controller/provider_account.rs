//! # Provider Account Lookup
//!
//! Resolves the 3scale tenant a resource is synced to.
//!
//! A resource names a Secret through `providerAccountRef`; without one the
//! `threescale-provider-account` Secret of the resource namespace is used.
//! The Secret holds the admin portal URL (`adminURL`) and an access token
//! (`token`).

use crate::config::SharedControllerConfig;
use crate::constants::{
    DEFAULT_PROVIDER_ACCOUNT_SECRET, PROVIDER_ACCOUNT_TOKEN_FIELD, PROVIDER_ACCOUNT_URL_FIELD,
};
use crate::crd::ProviderAccountRef;
use crate::engine::SyncError;
use crate::remote::{AdminApi, ApiError, ThreescaleClient};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

/// Admin URL and token of one tenant
pub struct ProviderAccount {
    pub admin_url: String,
    pub token: Zeroizing<String>,
}

impl fmt::Debug for ProviderAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAccount")
            .field("admin_url", &self.admin_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ProviderAccount {
    pub fn from_secret(secret: &Secret) -> Result<Self, SyncError> {
        let name = secret.metadata.name.as_deref().unwrap_or("unknown");
        let field = |key: &str| -> Result<String, SyncError> {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|value| String::from_utf8_lossy(&value.0).trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    SyncError::reference_not_found(format!(
                        "field {key} of provider account secret {name}"
                    ))
                })
        };

        Ok(Self {
            admin_url: field(PROVIDER_ACCOUNT_URL_FIELD)?,
            token: Zeroizing::new(field(PROVIDER_ACCOUNT_TOKEN_FIELD)?),
        })
    }

    /// Host part of the admin URL, recorded in the resource status
    pub fn host(&self) -> Result<String, ApiError> {
        reqwest::Url::parse(&self.admin_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| ApiError::Unexpected(format!("invalid admin URL {}", self.admin_url)))
    }
}

/// A ready-to-use admin API client plus the tenant host it talks to
#[derive(Clone)]
pub struct Connection {
    pub api: Arc<dyn AdminApi>,
    pub host: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Builds admin API clients for resources
#[async_trait]
pub trait AdminApiFactory: Send + Sync {
    async fn connect(
        &self,
        namespace: &str,
        reference: Option<&ProviderAccountRef>,
    ) -> Result<Connection, SyncError>;
}

/// Reads provider accounts from Kubernetes Secrets
pub struct SecretProviderAccounts {
    client: Client,
    config: SharedControllerConfig,
}

impl fmt::Debug for SecretProviderAccounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretProviderAccounts").finish_non_exhaustive()
    }
}

impl SecretProviderAccounts {
    pub fn new(client: Client, config: SharedControllerConfig) -> Self {
        Self { client, config }
    }

    async fn lookup(
        &self,
        namespace: &str,
        reference: Option<&ProviderAccountRef>,
    ) -> Result<ProviderAccount, SyncError> {
        let secret_name = reference
            .map(|r| r.name.as_str())
            .unwrap_or(DEFAULT_PROVIDER_ACCOUNT_SECRET);
        debug!(namespace, secret = secret_name, "looking up provider account");

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match secrets.get(secret_name).await {
            Ok(secret) => ProviderAccount::from_secret(&secret),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(
                SyncError::reference_not_found(format!(
                    "provider account secret {namespace}/{secret_name}"
                )),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AdminApiFactory for SecretProviderAccounts {
    async fn connect(
        &self,
        namespace: &str,
        reference: Option<&ProviderAccountRef>,
    ) -> Result<Connection, SyncError> {
        let account = self.lookup(namespace, reference).await?;
        let host = account.host()?;
        let timeout = self.config.read().await.admin_api_timeout();
        let client = ThreescaleClient::new(&account.admin_url, account.token.clone(), timeout)?;
        Ok(Connection {
            api: Arc::new(client),
            host,
        })
    }
}
