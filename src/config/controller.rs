//! # Reconciliation Configuration
//!
//! Requeue intervals, backoff bounds and admin API settings.

use super::env_var_or_default;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Periodic resync of synced resources (seconds)
    pub resync_interval_secs: u64,
    /// Requeue delay for orphaned or waiting resources (seconds)
    pub orphan_requeue_secs: u64,
    /// Requeue delay after a status write conflict (seconds)
    pub conflict_requeue_secs: u64,
    /// Fibonacci backoff lower bound for failed passes (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff upper bound for failed passes (seconds)
    pub backoff_max_secs: u64,
    /// Request timeout for admin API calls (seconds)
    pub admin_api_timeout_secs: u64,
    /// Restrict the watch to one namespace; all namespaces when unset
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            orphan_requeue_secs: DEFAULT_ORPHAN_REQUEUE_SECS,
            conflict_requeue_secs: DEFAULT_CONFLICT_REQUEUE_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            admin_api_timeout_secs: DEFAULT_ADMIN_API_TIMEOUT_SECS,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            orphan_requeue_secs: env_var_or_default(
                "ORPHAN_REQUEUE_SECS",
                DEFAULT_ORPHAN_REQUEUE_SECS,
            ),
            conflict_requeue_secs: env_var_or_default(
                "CONFLICT_REQUEUE_SECS",
                DEFAULT_CONFLICT_REQUEUE_SECS,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            admin_api_timeout_secs: env_var_or_default(
                "ADMIN_API_TIMEOUT_SECS",
                DEFAULT_ADMIN_API_TIMEOUT_SECS,
            ),
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|ns| !ns.is_empty()),
        }
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn orphan_requeue(&self) -> Duration {
        Duration::from_secs(self.orphan_requeue_secs)
    }

    pub fn conflict_requeue(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }

    pub fn admin_api_timeout(&self) -> Duration {
        Duration::from_secs(self.admin_api_timeout_secs)
    }
}
