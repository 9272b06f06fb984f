//! Field deltas between a desired item and its remote counterpart.

/// A typed set of field changes for one remote item
///
/// Every changed field is `Some`; an empty patch means the update call is skipped.
pub trait Patch {
    fn is_empty(&self) -> bool;
}

/// `Some(desired)` when the values differ
pub fn changed<T: PartialEq + Clone>(desired: &T, existing: &T) -> Option<T> {
    (desired != existing).then(|| desired.clone())
}

/// Like [`changed`], for optional desired values. An unset desired value never produces a change.
pub fn changed_opt<T: PartialEq + Clone>(desired: Option<&T>, existing: &T) -> Option<T> {
    desired.and_then(|d| changed(d, existing))
}
