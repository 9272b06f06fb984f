//! # Controller
//!
//! Kubernetes-facing half of the system: reconcilers for the Backend and
//! Product resources, provider account lookup, object access, backoff and
//! the metrics/health server.

pub mod backoff;
pub mod provider_account;
pub mod reconciler;
pub mod server;
pub mod store;
