//! # Sync Metrics
//!
//! Remote mutations issued by the reconcilers and status subresource writes.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec};
use std::sync::LazyLock;

static REMOTE_MUTATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "capabilities_remote_mutations_total",
            "Total number of create, update and delete calls issued to the admin API",
        ),
        &["collection", "operation"],
    )
    .expect("Failed to create REMOTE_MUTATIONS_TOTAL metric - this should never happen")
});

static STATUS_WRITES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "capabilities_status_writes_total",
        "Total number of status subresource writes",
    )
    .expect("Failed to create STATUS_WRITES_TOTAL metric - this should never happen")
});

static STATUS_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "capabilities_status_conflicts_total",
        "Total number of status writes rejected with a conflict",
    )
    .expect("Failed to create STATUS_CONFLICTS_TOTAL metric - this should never happen")
});

pub(crate) fn register_sync_metrics() -> Result<()> {
    REGISTRY.register(Box::new(REMOTE_MUTATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_CONFLICTS_TOTAL.clone()))?;
    Ok(())
}

/// `operation` is one of create, update, delete
pub fn increment_remote_mutations(collection: &str, operation: &str) {
    REMOTE_MUTATIONS_TOTAL
        .with_label_values(&[collection, operation])
        .inc();
}

/// Current count for one collection and operation
pub fn remote_mutations(collection: &str, operation: &str) -> u64 {
    REMOTE_MUTATIONS_TOTAL
        .with_label_values(&[collection, operation])
        .get()
}

pub fn increment_status_writes() {
    STATUS_WRITES_TOTAL.inc();
}

pub fn increment_status_conflicts() {
    STATUS_CONFLICTS_TOTAL.inc();
}
