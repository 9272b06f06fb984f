//! # Product References to Backends
//!
//! Products point at backends by system name: through `backendUsages` and
//! through limits whose metric reference names a backend. When a backend
//! drops a metric, or goes away entirely, those references are removed from
//! the Product resources so their next pass does not fail on them.
//!
//! Only products of the same namespace and provider account are touched.

use crate::controller::store::ObjectStore;
use crate::crd::Product;
use crate::engine::SyncError;
use tracing::info;

/// Products of `namespace` using `backend_system_name` on the tenant `host`
async fn products_using(
    products: &dyn ObjectStore<Product>,
    namespace: &str,
    backend_system_name: &str,
    host: &str,
) -> Result<Vec<Product>, SyncError> {
    Ok(products
        .list(namespace)
        .await?
        .into_iter()
        .filter(|product| product.spec.backend_usages.contains_key(backend_system_name))
        .filter(|product| {
            product
                .status
                .as_ref()
                .and_then(|status| status.provider_account_host.as_deref())
                .is_none_or(|product_host| product_host == host)
        })
        .collect())
}

/// Drop plan limits on backend metrics or methods that no longer exist
///
/// Returns the number of products rewritten.
pub(crate) async fn remove_backend_metric_references(
    products: &dyn ObjectStore<Product>,
    namespace: &str,
    backend_system_name: &str,
    host: &str,
    deleted: &[String],
) -> Result<usize, SyncError> {
    if deleted.is_empty() {
        return Ok(0);
    }

    let mut rewritten = 0;
    for mut product in products_using(products, namespace, backend_system_name, host).await? {
        let mut changed = false;
        for plan in product.spec.application_plans.values_mut() {
            let before = plan.limits.len();
            plan.limits.retain(|limit| {
                let reference = &limit.metric_method_ref;
                !(reference.backend_system_name.as_deref() == Some(backend_system_name)
                    && deleted.contains(&reference.system_name))
            });
            changed |= plan.limits.len() != before;
        }

        if changed {
            info!(
                product = %product.spec.system_name,
                backend = backend_system_name,
                "removing limits on deleted backend metrics"
            );
            products.replace(&product).await?;
            rewritten += 1;
        }
    }
    Ok(rewritten)
}

/// Drop the usage of a backend, and every limit on its metrics, from products
///
/// Returns the number of products rewritten.
pub(crate) async fn remove_backend_usage(
    products: &dyn ObjectStore<Product>,
    namespace: &str,
    backend_system_name: &str,
    host: &str,
) -> Result<usize, SyncError> {
    let mut rewritten = 0;
    for mut product in products_using(products, namespace, backend_system_name, host).await? {
        product.spec.backend_usages.remove(backend_system_name);
        for plan in product.spec.application_plans.values_mut() {
            plan.limits.retain(|limit| {
                limit.metric_method_ref.backend_system_name.as_deref() != Some(backend_system_name)
            });
        }
        info!(
            product = %product.spec.system_name,
            backend = backend_system_name,
            "removing usage of deleted backend"
        );
        products.replace(&product).await?;
        rewritten += 1;
    }
    Ok(rewritten)
}
