//! Nested-loop join, slicing strategy (spec.md §4.4): each slice owns a
//! left and a right paged vector; the build phase appends matching tuples
//! into whichever side they arrived on, and triggering a slice emits the
//! filtered cartesian product of its two sides.

use std::collections::{BTreeMap, BTreeSet};

use ns_common::Timestamp;
use parking_lot::Mutex;
use snafu::ensure;

use crate::error::{RuntimeError, SliceEvictedSnafu};
use crate::paged_vector::PagedVector;
use crate::slice::Slice;
use crate::window::WindowAssigner;

struct SliceSides<L, R> {
    slice: Slice,
    left: PagedVector<L>,
    right: PagedVector<R>,
}

/// All slices' build-side storage for one join operator instance, guarded
/// by a single lock. Spec.md §4.4 calls for `getSliceByTimestampOrCreateIt`
/// to be "locked per slice to prevent duplicate allocation"; a single
/// coarse lock over the whole map gets the same duplicate-allocation
/// guarantee as a per-slice lock would (the map mutation and the
/// find-or-create check happen atomically either way), the same tradeoff
/// `ns_buffers::BufferPool` makes for its free list rather than a lock per
/// slot.
pub struct NestedLoopJoin<L, R> {
    assigner: WindowAssigner,
    slices: Mutex<BTreeMap<i64, SliceSides<L, R>>>,
    /// Starts of slices already drained by `trigger_ready`. A build-side
    /// insert that lands here would silently never be seen by a probe, so
    /// it is rejected instead (spec.md's `getSliceByTimestampOrCreateIt`
    /// never resurrects a slice once its build phase has closed).
    evicted: Mutex<BTreeSet<i64>>,
}

impl<L: Clone, R: Clone> NestedLoopJoin<L, R> {
    #[must_use]
    pub fn new(assigner: WindowAssigner) -> Self {
        Self {
            assigner,
            slices: Mutex::new(BTreeMap::new()),
            evicted: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn insert_left(&self, ts: Timestamp, value: L) -> Result<(), RuntimeError> {
        let mut slices = self.slices.lock();
        for slice in self.assigner.assign(ts) {
            self.check_not_evicted(slice)?;
            entry(&mut slices, slice).left.push(value.clone());
        }
        Ok(())
    }

    pub fn insert_right(&self, ts: Timestamp, value: R) -> Result<(), RuntimeError> {
        let mut slices = self.slices.lock();
        for slice in self.assigner.assign(ts) {
            self.check_not_evicted(slice)?;
            entry(&mut slices, slice).right.push(value.clone());
        }
        Ok(())
    }

    fn check_not_evicted(&self, slice: Slice) -> Result<(), RuntimeError> {
        let slice_start = slice.start.as_millis();
        ensure!(
            !self.evicted.lock().contains(&slice_start),
            SliceEvictedSnafu { slice_start }
        );
        Ok(())
    }

    /// Drains every slice whose end the watermark has passed and emits
    /// `left × right` filtered by `predicate`, one result per triggered
    /// slice.
    pub fn trigger_ready(
        &self,
        watermark: Timestamp,
        predicate: impl Fn(&L, &R) -> bool,
    ) -> Vec<(Slice, Vec<(L, R)>)> {
        let mut slices = self.slices.lock();
        let ready: Vec<i64> = slices
            .iter()
            .filter(|(_, sides)| sides.slice.end <= watermark)
            .map(|(start, _)| *start)
            .collect();
        let mut evicted = self.evicted.lock();
        ready
            .into_iter()
            .filter_map(|start| {
                evicted.insert(start);
                slices.remove(&start)
            })
            .map(|sides| {
                let mut pairs = Vec::new();
                for l in sides.left.iter() {
                    for r in sides.right.iter() {
                        if predicate(l, r) {
                            pairs.push((l.clone(), r.clone()));
                        }
                    }
                }
                (sides.slice, pairs)
            })
            .collect()
    }

    #[must_use]
    pub fn slice_count(&self) -> usize {
        self.slices.lock().len()
    }
}

fn entry<L, R>(slices: &mut BTreeMap<i64, SliceSides<L, R>>, slice: Slice) -> &mut SliceSides<L, R> {
    slices.entry(slice.start.as_millis()).or_insert_with(|| SliceSides {
        slice,
        left: PagedVector::new(),
        right: PagedVector::new(),
    })
}
