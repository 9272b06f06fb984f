//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliations, errors, durations and requeues
//! - `sync_metrics` - Remote mutations and status writes

pub mod controller_metrics;
pub mod registry;
pub mod sync_metrics;

pub use controller_metrics::*;
pub use registry::*;
pub use sync_metrics::*;
