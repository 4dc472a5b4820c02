//! Slice lifecycle cleanup (spec.md §4.4): "deleted when the minimum
//! watermark exceeds `sliceEnd + allowedLateness`". `deleteSlices` is a
//! batch removal keyed purely on slice end and the current watermark; this
//! crate's slices carry no origin/sequence identity of their own (that
//! bookkeeping lives in `ns_input`), so the reduced two-argument form here
//! covers the part of the operation this crate owns.

use ns_common::Timestamp;

/// Removes every slice end whose deadline (`end + allowed_lateness`) the
/// watermark has passed. Returns how many were removed, for callers that
/// want to log/trace the sweep.
pub fn delete_slices(
    triggered_slice_ends: &mut std::collections::BTreeSet<i64>,
    watermark: Timestamp,
    allowed_lateness_ms: i64,
) -> usize {
    let deadline = watermark.as_millis() - allowed_lateness_ms;
    let expired: Vec<i64> = triggered_slice_ends
        .range(..deadline)
        .copied()
        .collect();
    for end in &expired {
        triggered_slice_ends.remove(end);
    }
    expired.len()
}
