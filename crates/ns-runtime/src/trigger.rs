//! Watermark-driven triggering (spec.md §4.4): each worker reports its
//! last-seen watermark; on every scan-close the handler recomputes the
//! minimum across workers and, for every slice whose end that minimum has
//! passed, combines the per-worker partial slices into one global slice
//! and emits it for the downstream "slice-merge task".

use std::collections::HashMap;

use ns_common::{Timestamp, WorkerId};
use snafu::ensure;

use crate::aggregate::{AggregateResult, Aggregator};
use crate::error::{RuntimeError, TooLateSnafu};
use crate::slice::Slice;
use crate::slice_store::{SliceState, WorkerSliceStore};
use crate::window::WindowAssigner;

#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredSlice {
    pub slice: Slice,
    /// `(key, result)` pairs for a keyed aggregation, or a single
    /// `(None, result)` entry for non-keyed.
    pub results: Vec<(Option<u64>, AggregateResult)>,
}

#[derive(Default)]
struct WatermarkTracker {
    per_worker: HashMap<WorkerId, Timestamp>,
}

impl WatermarkTracker {
    fn record(&mut self, worker: WorkerId, watermark: Timestamp) {
        self.per_worker
            .entry(worker)
            .and_modify(|existing| *existing = (*existing).max(watermark))
            .or_insert(watermark);
    }

    /// `None` until every worker this operator has ever seen has reported
    /// at least one watermark — a slice cannot safely trigger while a
    /// worker that will still feed it hasn't been heard from yet.
    fn min_watermark(&self) -> Option<Timestamp> {
        self.per_worker.values().copied().min()
    }
}

/// Ties together the per-worker slice stores, the watermark tracker and
/// the once-only trigger bookkeeping (spec.md §8 invariant 3) for one
/// windowed operator instance.
pub struct WindowOperator<A: Aggregator> {
    aggregator: A,
    assigner: WindowAssigner,
    keyed: bool,
    per_worker: HashMap<WorkerId, WorkerSliceStore<A>>,
    watermarks: WatermarkTracker,
    triggered_slice_ends: std::collections::BTreeSet<i64>,
}

fn merge_states<A: Aggregator>(aggregator: &A, mut a: SliceState<A>, b: SliceState<A>) -> SliceState<A> {
    match (&mut a, b) {
        (SliceState::NonKeyed(state_a), SliceState::NonKeyed(state_b)) => {
            aggregator.combine(state_a, state_b);
        }
        (SliceState::Keyed(map_a), SliceState::Keyed(map_b)) => {
            map_a.merge(map_b, |state_a, state_b| aggregator.combine(state_a, state_b));
        }
        _ => unreachable!("a single operator instance never mixes keyed and non-keyed slices"),
    }
    a
}

impl<A: Aggregator> WindowOperator<A> {
    #[must_use]
    pub fn new(aggregator: A, assigner: WindowAssigner, keyed: bool) -> Self {
        Self {
            aggregator,
            assigner,
            keyed,
            per_worker: HashMap::new(),
            watermarks: WatermarkTracker::default(),
            triggered_slice_ends: std::collections::BTreeSet::new(),
        }
    }

    /// Rejects a record whose timestamp has already fallen below every
    /// worker's watermark — the glossary's "timestamp below which no
    /// further records are expected" — rather than silently opening a
    /// slice that can never trigger because its end already has.
    pub fn ingest(&mut self, worker: WorkerId, record: &crate::record::Record) -> Result<(), RuntimeError> {
        if let Some(min_watermark) = self.watermarks.min_watermark() {
            ensure!(
                record.ts >= min_watermark,
                TooLateSnafu {
                    ts: record.ts,
                    floor: min_watermark,
                }
            );
        }
        self.per_worker
            .entry(worker)
            .or_insert_with(|| WorkerSliceStore::new(self.assigner, self.keyed))
            .ingest(&self.aggregator, record);
        Ok(())
    }

    /// Spec.md §4.4: "on every scan-close, if `minWatermark` advances past
    /// a slice's `sliceEnd`, combine per-worker partial slices into one
    /// global slice". A slice whose end was already triggered is skipped
    /// even if some worker somehow still reports state for it, satisfying
    /// invariant 3 ("triggers exactly once and never again").
    pub fn on_watermark(&mut self, worker: WorkerId, watermark: Timestamp) -> Vec<TriggeredSlice> {
        self.watermarks.record(worker, watermark);
        let Some(min_watermark) = self.watermarks.min_watermark() else {
            return Vec::new();
        };

        let mut combined: std::collections::BTreeMap<i64, (Slice, SliceState<A>)> =
            std::collections::BTreeMap::new();
        for store in self.per_worker.values_mut() {
            for (slice, state) in store.drain_triggerable(min_watermark) {
                let start = slice.start.as_millis();
                if self.triggered_slice_ends.contains(&slice.end.as_millis()) {
                    continue;
                }
                match combined.remove(&start) {
                    Some((existing_slice, existing_state)) => {
                        let merged = merge_states(&self.aggregator, existing_state, state);
                        combined.insert(start, (existing_slice, merged));
                    }
                    None => {
                        combined.insert(start, (slice, state));
                    }
                }
            }
        }

        combined
            .into_values()
            .map(|(slice, state)| {
                self.triggered_slice_ends.insert(slice.end.as_millis());
                let results = self.lower_all(&state);
                debug!(
                    slice_start = slice.start.as_millis(),
                    slice_end = slice.end.as_millis(),
                    result_count = results.len(),
                    "window slice triggered"
                );
                TriggeredSlice { slice, results }
            })
            .collect()
    }

    fn lower_all(&self, state: &SliceState<A>) -> Vec<(Option<u64>, AggregateResult)> {
        match state {
            SliceState::NonKeyed(s) => vec![(None, self.aggregator.lower(s))],
            SliceState::Keyed(map) => map
                .iter()
                .map(|(key, s)| (Some(*key), self.aggregator.lower(s)))
                .collect(),
        }
    }

    #[must_use]
    pub fn has_triggered(&self, slice_end: Timestamp) -> bool {
        self.triggered_slice_ends.contains(&slice_end.as_millis())
    }

    /// `deleteSlices`: forgets triggered slices whose allowed-lateness
    /// deadline the watermark has passed, bounding how long this operator
    /// retains the "already triggered" bookkeeping for a slice.
    pub fn delete_expired_triggers(&mut self, watermark: Timestamp, allowed_lateness_ms: i64) -> usize {
        crate::lifecycle::delete_slices(&mut self.triggered_slice_ends, watermark, allowed_lateness_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateResult, Count, Sum};
    use crate::record::Record;

    const W0: WorkerId = WorkerId::new(0);

    /// Scenario S2 (tumbling keyed sum): six `(id, value, ts)` records
    /// across two 10s windows, summed per id.
    #[test]
    fn s2_tumbling_keyed_sum() {
        let mut op = WindowOperator::new(
            Sum,
            WindowAssigner::Tumbling { size_ms: 10_000 },
            true,
        );
        let records = [
            Record::keyed(1, 307, Timestamp::from_millis(1_000)),
            Record::keyed(1, 870, Timestamp::from_millis(11_000)),
            Record::keyed(4, 6, Timestamp::from_millis(2_000)),
            Record::keyed(11, 30, Timestamp::from_millis(3_000)),
            Record::keyed(12, 7, Timestamp::from_millis(4_000)),
            Record::keyed(16, 12, Timestamp::from_millis(5_000)),
        ];
        for r in &records {
            op.ingest(W0, r).unwrap();
        }

        let triggered = op.on_watermark(W0, Timestamp::from_millis(25_000));
        let mut windows: Vec<_> = triggered
            .into_iter()
            .map(|t| {
                let mut results = t.results;
                results.sort_by_key(|(k, _)| *k);
                (t.slice, results)
            })
            .collect();
        windows.sort_by_key(|(slice, _)| slice.start);

        assert_eq!(windows.len(), 2);

        let (first_slice, first_results) = &windows[0];
        assert_eq!(*first_slice, Slice::new(Timestamp::from_millis(0), Timestamp::from_millis(10_000)));
        assert_eq!(
            first_results,
            &vec![
                (Some(1), AggregateResult::Scalar(307.0)),
                (Some(4), AggregateResult::Scalar(6.0)),
                (Some(11), AggregateResult::Scalar(30.0)),
                (Some(12), AggregateResult::Scalar(7.0)),
                (Some(16), AggregateResult::Scalar(12.0)),
            ]
        );

        let (second_slice, second_results) = &windows[1];
        assert_eq!(
            *second_slice,
            Slice::new(Timestamp::from_millis(10_000), Timestamp::from_millis(20_000))
        );
        assert_eq!(second_results, &vec![(Some(1), AggregateResult::Scalar(870.0))]);
    }

    /// Scenario S3 (non-keyed count over a 10s tumbling window): 100
    /// unkeyed records with value 1 produce one slice of count 100, then
    /// silence (no further slices ever trigger for this watermark run).
    #[test]
    fn s3_tumbling_non_keyed_count() {
        let mut op = WindowOperator::new(Count, WindowAssigner::Tumbling { size_ms: 10_000 }, false);
        for i in 0..100 {
            op.ingest(W0, &Record::unkeyed(1, Timestamp::from_millis(i * 50))).unwrap();
        }
        let triggered = op.on_watermark(W0, Timestamp::from_millis(10_000));
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].results, vec![(None, AggregateResult::Scalar(100.0))]);

        let again = op.on_watermark(W0, Timestamp::from_millis(50_000));
        assert!(again.is_empty(), "no further records means no further slices to trigger");
    }

    /// Spec.md §8 invariant 3: a slice triggers exactly once even if the
    /// watermark keeps advancing and more (late, out-of-range) records
    /// arrive after the first trigger.
    #[test]
    fn slice_triggers_exactly_once_as_watermark_keeps_advancing() {
        let mut op = WindowOperator::new(Count, WindowAssigner::Tumbling { size_ms: 10_000 }, false);
        op.ingest(W0, &Record::unkeyed(1, Timestamp::from_millis(1_000))).unwrap();

        let first = op.on_watermark(W0, Timestamp::from_millis(10_000));
        assert_eq!(first.len(), 1);
        assert!(op.has_triggered(Timestamp::from_millis(10_000)));

        // A record that would have landed in the same (now-triggered)
        // slice is now behind the watermark, so it is rejected outright
        // rather than silently opening a slice that can never trigger.
        let late = op.ingest(W0, &Record::unkeyed(1, Timestamp::from_millis(2_000)));
        assert_eq!(
            late,
            Err(RuntimeError::TooLate {
                ts: Timestamp::from_millis(2_000),
                floor: Timestamp::from_millis(10_000),
            })
        );

        // An in-range record for the next slice still triggers normally,
        // and watermark advancing further never re-emits the first slice.
        op.ingest(W0, &Record::unkeyed(1, Timestamp::from_millis(15_000))).unwrap();
        let second = op.on_watermark(W0, Timestamp::from_millis(30_000));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].slice, Slice::new(Timestamp::from_millis(10_000), Timestamp::from_millis(20_000)));
    }
}
