//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.
//! This module handles reconciliation errors and watch stream errors.

use crate::constants;
use crate::controller::reconciler::{resource_key, BackoffState, Reconciler, ReconcilerError};
use crate::observability;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource, so one failing resource never
/// slows down the others. A clean pass clears it.
pub fn handle_reconciliation_error<K>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let key = resource_key(obj.as_ref());
    let kind = K::kind(&());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.key = %key,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {}", key, error);
    observability::metrics::increment_reconciliation_errors(&kind, error.metric_label());

    let (min_secs, max_secs) = match ctx.config.try_read() {
        Ok(config) => (config.backoff_min_secs, config.backoff_max_secs),
        Err(_) => (
            constants::DEFAULT_BACKOFF_MIN_SECS,
            constants::DEFAULT_BACKOFF_MAX_SECS,
        ),
    };

    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(key.clone())
                .or_insert_with(|| BackoffState::new(min_secs, max_secs));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(
                "Failed to lock backoff_states: {}, using default backoff",
                e
            );
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: error-backoff)",
        backoff_seconds, error_count
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s, trigger source: error-backoff)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Classifies watch errors (401, 410, 429, not found) and applies the
/// matching handling strategy.
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    let is_401 = error_string.contains("401")
        || error_string.contains("Unauthorized")
        || error_string.contains("WatchFailed");
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");
    let is_not_found = error_string.contains("ObjectNotFound")
        || (error_string.contains("404") && error_string.contains("not found"));

    if is_401 {
        error!("❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
        error!("🔍 SRE Diagnostics:");
        error!("   1. Verify ClusterRole 'capabilities-controller' still exists:");
        error!("      kubectl get clusterrole capabilities-controller");
        error!("   2. Verify ClusterRoleBinding still binds ServiceAccount:");
        error!("      kubectl get clusterrolebinding capabilities-controller -o yaml");
        error!("   3. Verify RBAC permissions are still active:");
        error!("      kubectl auth can-i list products.capabilities.3scale.net --as=system:serviceaccount:threescale-system:capabilities-controller --all-namespaces");
        warn!(
            "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
            constants::DEFAULT_WATCH_RESTART_DELAY_SECS
        );
        tokio::time::sleep(Duration::from_secs(
            constants::DEFAULT_WATCH_RESTART_DELAY_SECS,
        ))
        .await;
        None
    } else if is_410 {
        warn!("Watch resource version expired (410) - this is normal during pod restarts, watch will restart");
        warn!(error_type = "410", "watch.error.resource_version_expired");
        None
    } else if is_429 {
        let current_backoff = backoff.load(Ordering::Relaxed);
        warn!(
            "API server storage reinitializing (429), backing off for {}ms before restart...",
            current_backoff
        );
        tokio::time::sleep(Duration::from_millis(current_backoff)).await;
        let new_backoff = std::cmp::min(current_backoff.saturating_mul(2), max_backoff_ms);
        backoff.store(new_backoff, Ordering::Relaxed);
        None
    } else if is_not_found {
        warn!("Resource not found (likely deleted), continuing watch...");
        Some(())
    } else {
        error!("Controller stream error: {}", error_string);
        tokio::time::sleep(Duration::from_secs(
            constants::DEFAULT_WATCH_RESTART_DELAY_SECS,
        ))
        .await;
        None
    }
}
