//! # Reconciliation Engine
//!
//! Kind-agnostic building blocks every resource controller composes:
//!
//! - [`TaskRunner`]: ordered, fail-fast sync steps over a shared context
//! - [`SetReconciler`]: keyed-set diff applied as delete, update, create
//! - [`OrderedListReconciler`]: positional diff for lists the remote renumbers
//! - [`StatusReconciler`]: conditions and generation tracking, written only on change
//!
//! The engine never retries a remote call. A failure surfaces as a
//! [`SyncError`] and retrying means running the whole pass again.

pub mod convergence;
pub mod error;
pub mod ordered_sync;
pub mod patch;
pub mod set_sync;
pub mod task_runner;

pub use convergence::{
    Converging, StatusOutcome, StatusReconciler, StatusWriter, SyncOutcome,
};
pub use error::{ErrorKind, FieldError, SpecErrors, StoreError, SyncError};
pub use ordered_sync::{OrderedListReconciler, OrderedReport, OrderedTarget};
pub use patch::Patch;
pub use set_sync::{diff_keys, SetDiff, SetReconciler, SetReport, SetTarget};
pub use task_runner::TaskRunner;
