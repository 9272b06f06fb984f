//! # Sync Targets
//!
//! Adapters exposing each 3scale collection to the generic reconcilers.
//! Every target borrows the admin API and the parent IDs resolved by
//! earlier tasks of the pass.

mod application_plans;
mod backend_usages;
mod limits;
mod mapping_rules;
mod methods;
mod metrics;

pub use application_plans::ApplicationPlansTarget;
pub use backend_usages::BackendUsagesTarget;
pub use limits::LimitsTarget;
pub use mapping_rules::MappingRulesTarget;
pub use methods::MethodsTarget;
pub use metrics::MetricsTarget;

use crate::crd::HITS_METRIC;
use crate::engine::SyncError;
use crate::remote::{AdminApi, Scope};
use std::collections::BTreeMap;

/// ID of the `hits` metric methods hang off
pub async fn hits_id(api: &dyn AdminApi, scope: Scope) -> Result<i64, SyncError> {
    api.list_metrics(scope)
        .await?
        .into_iter()
        .find(|metric| metric.system_name == HITS_METRIC)
        .map(|metric| metric.id)
        .ok_or_else(|| SyncError::reference_not_found(format!("hits metric of {scope}")))
}

/// Metric and method IDs by reference and back
///
/// References are plain system names for the entity's own metrics and
/// `backend.system_name` for metrics of a backend used by a product.
#[derive(Debug, Clone, Default)]
pub struct MetricIndex {
    by_ref: BTreeMap<String, i64>,
    by_id: BTreeMap<i64, String>,
}

impl MetricIndex {
    /// Index every metric and method of `scope`, optionally prefixing references
    pub async fn load(
        api: &dyn AdminApi,
        scope: Scope,
        backend_system_name: Option<&str>,
    ) -> Result<Self, SyncError> {
        let mut index = Self::default();
        index.extend(api, scope, backend_system_name).await?;
        Ok(index)
    }

    pub async fn extend(
        &mut self,
        api: &dyn AdminApi,
        scope: Scope,
        backend_system_name: Option<&str>,
    ) -> Result<(), SyncError> {
        for metric in api.list_metrics(scope).await? {
            let reference = match backend_system_name {
                Some(backend) => format!("{backend}.{}", metric.system_name),
                None => metric.system_name,
            };
            self.insert(reference, metric.id);
        }
        Ok(())
    }

    pub fn insert(&mut self, reference: String, id: i64) {
        self.by_id.insert(id, reference.clone());
        self.by_ref.insert(reference, id);
    }

    pub fn id_of(&self, reference: &str) -> Option<i64> {
        self.by_ref.get(reference).copied()
    }

    pub fn reference_of(&self, id: i64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_index_both_ways() {
        let mut index = MetricIndex::default();
        index.insert("hits".to_string(), 1);
        index.insert("echo.hits".to_string(), 7);
        assert_eq!(index.id_of("echo.hits"), Some(7));
        assert_eq!(index.reference_of(1), Some("hits"));
        assert_eq!(index.id_of("missing"), None);
    }
}
