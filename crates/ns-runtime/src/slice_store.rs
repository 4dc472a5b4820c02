//! Per-worker slice store (spec.md §4.4): "a thread-local slice store
//! mapping slice start → hash map (key → per-key state)". This workspace
//! models "thread-local" the way SPEC_FULL.md's design notes direct for
//! the analogous indexing/parsing bridging problem: a plain struct owned
//! by the worker and threaded through its task closure, rather than an
//! actual OS thread-local, since each worker thread already owns exactly
//! one of these for the lifetime of its assigned sub-plan.

use std::collections::BTreeMap;

use crate::aggregate::Aggregator;
use crate::paged_hash_map::PagedHashMap;
use crate::record::Record;
use crate::slice::Slice;
use crate::window::WindowAssigner;

const DEFAULT_BUCKET_COUNT: usize = 64;

/// One slice's partial aggregate state: either per-key (`Keyed`) or a
/// single running value (`NonKeyed`), spec.md §4.4's "same but with a
/// single state value instead of a hash map".
pub enum SliceState<A: Aggregator> {
    Keyed(PagedHashMap<u64, A::State>),
    NonKeyed(A::State),
}

pub struct WorkerSliceStore<A: Aggregator> {
    assigner: WindowAssigner,
    keyed: bool,
    slices: BTreeMap<i64, (Slice, SliceState<A>)>,
}

impl<A: Aggregator> WorkerSliceStore<A> {
    #[must_use]
    pub fn new(assigner: WindowAssigner, keyed: bool) -> Self {
        Self {
            assigner,
            keyed,
            slices: BTreeMap::new(),
        }
    }

    /// `findSliceByTs(ts)`: creates the slice(s) `ts` maps to on demand.
    /// Returns the slice starts touched, so the caller (the ingest path)
    /// can look each one up and apply `lift`.
    pub fn find_or_create_slices(&mut self, agg: &A, ts: ns_common::Timestamp) -> Vec<i64> {
        let mut starts = Vec::new();
        for slice in self.assigner.assign(ts) {
            let start = slice.start.as_millis();
            self.slices
                .entry(start)
                .or_insert_with(|| (slice, keyed_or_nonkeyed(self.keyed, agg)));
            starts.push(start);
        }
        starts
    }

    /// Applies `lift` for `record` against every slice it falls in,
    /// hashing its key when this store is keyed (spec.md §4.4: "hash key,
    /// probe or insert entry, apply lift").
    pub fn ingest(&mut self, agg: &A, record: &Record) {
        for start in self.find_or_create_slices(agg, record.ts) {
            let (_, state) = self.slices.get_mut(&start).expect("just created above");
            match state {
                SliceState::Keyed(map) => {
                    let key = record.key.unwrap_or_default();
                    let per_key = map.get_or_insert_with(key, || agg.reset());
                    agg.lift(per_key, record);
                }
                SliceState::NonKeyed(single) => agg.lift(single, record),
            }
        }
    }

    pub fn slice(&self, start: i64) -> Option<&(Slice, SliceState<A>)> {
        self.slices.get(&start)
    }

    pub fn slice_mut(&mut self, start: i64) -> Option<&mut (Slice, SliceState<A>)> {
        self.slices.get_mut(&start)
    }

    /// Every slice with `end <= watermark`, removed from this worker's
    /// store for the caller to fold into the global store.
    pub fn drain_triggerable(&mut self, watermark: ns_common::Timestamp) -> Vec<(Slice, SliceState<A>)> {
        let ready: Vec<i64> = self
            .slices
            .iter()
            .filter(|(_, (slice, _))| slice.end <= watermark)
            .map(|(start, _)| *start)
            .collect();
        ready
            .into_iter()
            .filter_map(|start| self.slices.remove(&start))
            .collect()
    }

    #[must_use]
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }
}

fn keyed_or_nonkeyed<A: Aggregator>(keyed: bool, agg: &A) -> SliceState<A> {
    if keyed {
        SliceState::Keyed(PagedHashMap::with_bucket_count(DEFAULT_BUCKET_COUNT))
    } else {
        SliceState::NonKeyed(agg.reset())
    }
}
