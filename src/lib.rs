//! # 3scale Capabilities Controller
//!
//! A Kubernetes controller that keeps 3scale backends and products in sync
//! with the `Backend` and `Product` custom resources describing them.
//!
//! ## Overview
//!
//! Every resource is reconciled independently:
//!
//! 1. **Validation** - the spec is checked before anything remote happens
//! 2. **Provider account** - admin URL and token come from a Secret
//! 3. **Sync tasks** - methods, metrics, mapping rules, backend usages,
//!    application plans, limits and policies are converged one collection at a time
//! 4. **Status** - conditions are written back only when they changed
//!
//! The collection-agnostic machinery lives in [`engine`]; the 3scale admin
//! API client in [`remote`].
//!
//! ## Features
//!
//! - **Ordered mapping rules**: positions converge even though 3scale renumbers on every mutation
//! - **Cross-resource cleanup**: deleted backend metrics are removed from product plan limits
//! - **Finalizers**: deleting a resource deletes its remote counterpart
//! - **Prometheus metrics**: reconciliations, remote mutations and status writes
//! - **Health checks**: HTTP endpoints for liveness and readiness checks

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod engine;
pub mod observability;
pub mod remote;
pub mod runtime;
