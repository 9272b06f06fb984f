//! # Constants
//!
//! Default values shared by the controller, the CLI and tests.
//! Most of them can be overridden through environment variables, see [`crate::config`].

/// Default port for the metrics and health HTTP server
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind before giving up
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server to become ready
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Periodic resync of a synced resource
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Requeue delay for orphaned or waiting resources
pub const DEFAULT_ORPHAN_REQUEUE_SECS: u64 = 30;

/// Requeue delay after a status write conflict
pub const DEFAULT_CONFLICT_REQUEUE_SECS: u64 = 1;

/// Fibonacci backoff bounds for failed passes
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 600;

/// Fallback requeue when the backoff state cannot be read
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Request timeout for admin API calls
pub const DEFAULT_ADMIN_API_TIMEOUT_SECS: u64 = 30;

/// Delay before restarting a failed watch stream
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Secret consulted when a resource has no `providerAccountRef`
pub const DEFAULT_PROVIDER_ACCOUNT_SECRET: &str = "threescale-provider-account";

/// Secret fields holding the admin portal URL and the access token
pub const PROVIDER_ACCOUNT_URL_FIELD: &str = "adminURL";
pub const PROVIDER_ACCOUNT_TOKEN_FIELD: &str = "token";

pub const BACKEND_FINALIZER: &str = "backend.capabilities.3scale.net";
pub const PRODUCT_FINALIZER: &str = "product.capabilities.3scale.net";
pub const APPLICATION_FINALIZER: &str = "application.capabilities.3scale.net";

/// Field manager for server-side writes
pub const FIELD_MANAGER: &str = "capabilities-controller";

/// Annotation bumped by `capctl reconcile` to force a pass
pub const RECONCILE_ANNOTATION: &str = "capabilities.3scale.net/reconcile";
