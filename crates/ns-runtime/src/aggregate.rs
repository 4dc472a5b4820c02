//! The decomposable aggregation contract (spec.md §4.4): `lift`, `combine`,
//! `lower`, `reset`, plus an in-memory size for backpressure accounting the
//! way `ns_common::ByteSizeOf` does for buffers.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use snafu::ensure;

use crate::error::{EmptyReservoirSnafu, RuntimeError};
use crate::paged_vector::PagedVector;
use crate::record::Record;

/// A value an aggregation lowers to: either a single scalar or a
/// variable-sized array (the reservoir sample's output, spec.md §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    Scalar(f64),
    Array(Vec<i64>),
}

pub trait Aggregator {
    type State;

    fn lift(&self, state: &mut Self::State, record: &Record);
    fn combine(&self, state: &mut Self::State, other: Self::State);
    fn lower(&self, state: &Self::State) -> AggregateResult;
    fn reset(&self) -> Self::State;
    fn state_size_bytes(&self, state: &Self::State) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountState(pub u64);

pub struct Count;

impl Aggregator for Count {
    type State = CountState;

    fn lift(&self, state: &mut CountState, _record: &Record) {
        state.0 += 1;
    }

    fn combine(&self, state: &mut CountState, other: CountState) {
        state.0 += other.0;
    }

    fn lower(&self, state: &CountState) -> AggregateResult {
        AggregateResult::Scalar(state.0 as f64)
    }

    fn reset(&self) -> CountState {
        CountState::default()
    }

    fn state_size_bytes(&self, _state: &CountState) -> usize {
        std::mem::size_of::<CountState>()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SumState(pub i64);

pub struct Sum;

impl Aggregator for Sum {
    type State = SumState;

    fn lift(&self, state: &mut SumState, record: &Record) {
        state.0 += record.value;
    }

    fn combine(&self, state: &mut SumState, other: SumState) {
        state.0 += other.0;
    }

    fn lower(&self, state: &SumState) -> AggregateResult {
        AggregateResult::Scalar(state.0 as f64)
    }

    fn reset(&self) -> SumState {
        SumState::default()
    }

    fn state_size_bytes(&self, _state: &SumState) -> usize {
        std::mem::size_of::<SumState>()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinState(pub Option<i64>);

pub struct Min;

impl Aggregator for Min {
    type State = MinState;

    fn lift(&self, state: &mut MinState, record: &Record) {
        state.0 = Some(state.0.map_or(record.value, |cur| cur.min(record.value)));
    }

    fn combine(&self, state: &mut MinState, other: MinState) {
        state.0 = match (state.0, other.0) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        };
    }

    fn lower(&self, state: &MinState) -> AggregateResult {
        AggregateResult::Scalar(state.0.unwrap_or_default() as f64)
    }

    fn reset(&self) -> MinState {
        MinState(None)
    }

    fn state_size_bytes(&self, _state: &MinState) -> usize {
        std::mem::size_of::<MinState>()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaxState(pub Option<i64>);

pub struct Max;

impl Aggregator for Max {
    type State = MaxState;

    fn lift(&self, state: &mut MaxState, record: &Record) {
        state.0 = Some(state.0.map_or(record.value, |cur| cur.max(record.value)));
    }

    fn combine(&self, state: &mut MaxState, other: MaxState) {
        state.0 = match (state.0, other.0) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
    }

    fn lower(&self, state: &MaxState) -> AggregateResult {
        AggregateResult::Scalar(state.0.unwrap_or_default() as f64)
    }

    fn reset(&self) -> MaxState {
        MaxState(None)
    }

    fn state_size_bytes(&self, _state: &MaxState) -> usize {
        std::mem::size_of::<MaxState>()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AvgState {
    pub sum: i64,
    pub count: u64,
}

pub struct Avg;

impl Aggregator for Avg {
    type State = AvgState;

    fn lift(&self, state: &mut AvgState, record: &Record) {
        state.sum += record.value;
        state.count += 1;
    }

    fn combine(&self, state: &mut AvgState, other: AvgState) {
        state.sum += other.sum;
        state.count += other.count;
    }

    fn lower(&self, state: &AvgState) -> AggregateResult {
        let avg = if state.count == 0 {
            0.0
        } else {
            state.sum as f64 / state.count as f64
        };
        AggregateResult::Scalar(avg)
    }

    fn reset(&self) -> AvgState {
        AvgState::default()
    }

    fn state_size_bytes(&self, _state: &AvgState) -> usize {
        std::mem::size_of::<AvgState>()
    }
}

/// Classic reservoir-replacement sampling over a `PagedVector`, with a
/// fixed per-instance seed so tests are reproducible (spec.md §4.4).
#[derive(Debug)]
pub struct ReservoirSample {
    capacity: usize,
    seed: u64,
}

impl ReservoirSample {
    pub fn try_new(capacity: usize, seed: u64) -> Result<Self, RuntimeError> {
        ensure!(capacity > 0, EmptyReservoirSnafu);
        Ok(Self { capacity, seed })
    }
}

#[derive(Clone)]
pub struct ReservoirState {
    pub samples: PagedVector<i64>,
    /// Count of records observed so far (the `k` in spec.md's "k-th
    /// observed record"), kept separately from `samples.len()` because
    /// once the reservoir is full the two diverge.
    pub observed: u64,
    rng: SmallRng,
}

impl Aggregator for ReservoirSample {
    type State = ReservoirState;

    fn lift(&self, state: &mut ReservoirState, record: &Record) {
        state.observed += 1;
        let k = state.observed; // 1-based
        if (k as usize) <= self.capacity {
            state.samples.push(record.value);
        } else {
            let r = state.rng.gen_range(0..k);
            if (r as usize) < self.capacity {
                state.samples.set(r as usize, record.value);
            }
        }
    }

    /// Combining two independently-sampled reservoirs exactly is a
    /// weighted-merge problem; spec.md §4.4 states the simple rule this
    /// implementation follows: "`combine` concatenates pages" — i.e. a
    /// combined reservoir over disjoint partial streams is the
    /// concatenation, re-sampled down is out of scope for this
    /// decomposition (callers combining partial reservoirs before the
    /// slice fully fills accept the looser guarantee that implies).
    fn combine(&self, state: &mut ReservoirState, other: ReservoirState) {
        state.observed += other.observed;
        state.samples.combine(other.samples);
    }

    fn lower(&self, state: &ReservoirState) -> AggregateResult {
        AggregateResult::Array(state.samples.iter().copied().collect())
    }

    fn reset(&self) -> ReservoirState {
        ReservoirState {
            samples: PagedVector::new(),
            observed: 0,
            rng: SmallRng::seed_from_u64(self.seed),
        }
    }

    fn state_size_bytes(&self, state: &ReservoirState) -> usize {
        state.samples.len() * std::mem::size_of::<i64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_common::Timestamp;

    fn rec(value: i64) -> Record {
        Record::unkeyed(value, Timestamp::from_millis(0))
    }

    #[test]
    fn sum_lifts_and_combines() {
        let agg = Sum;
        let mut a = agg.reset();
        agg.lift(&mut a, &rec(3));
        agg.lift(&mut a, &rec(4));
        let mut b = agg.reset();
        agg.lift(&mut b, &rec(10));
        agg.combine(&mut a, b);
        assert_eq!(agg.lower(&a), AggregateResult::Scalar(17.0));
    }

    #[test]
    fn reservoir_rejects_a_zero_capacity() {
        assert_eq!(ReservoirSample::try_new(0, 1).unwrap_err(), RuntimeError::EmptyReservoir);
    }

    #[test]
    fn reservoir_equals_input_when_stream_shorter_than_capacity() {
        let agg = ReservoirSample::try_new(10, 42).unwrap();
        let mut state = agg.reset();
        for v in 0..5 {
            agg.lift(&mut state, &rec(v));
        }
        let AggregateResult::Array(sample) = agg.lower(&state) else {
            panic!("expected array result");
        };
        let mut sorted = sample;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn reservoir_never_exceeds_capacity_over_a_longer_stream() {
        let agg = ReservoirSample::try_new(10, 42).unwrap();
        let mut state = agg.reset();
        for v in 0..1000 {
            agg.lift(&mut state, &rec(v));
        }
        let AggregateResult::Array(sample) = agg.lower(&state) else {
            panic!("expected array result");
        };
        assert_eq!(sample.len(), 10);
    }

    /// spec.md §8 invariant 4: each element of a length-`L` stream is kept
    /// with probability `N/L`. Checked statistically over many independent
    /// runs (distinct seeds) rather than a single draw, since a single
    /// draw only ever says "present" or "absent".
    #[test]
    fn reservoir_keeps_each_element_with_probability_n_over_l() {
        const CAPACITY: usize = 5;
        const LENGTH: u64 = 50;
        const TRIALS: u64 = 4000;
        let mut kept_element_zero = 0u64;
        for seed in 0..TRIALS {
            let agg = ReservoirSample::try_new(CAPACITY, seed).unwrap();
            let mut state = agg.reset();
            for v in 0..LENGTH as i64 {
                agg.lift(&mut state, &rec(v));
            }
            if state.samples.iter().any(|&v| v == 0) {
                kept_element_zero += 1;
            }
        }
        let observed_p = kept_element_zero as f64 / TRIALS as f64;
        let expected_p = CAPACITY as f64 / LENGTH as f64;
        assert!(
            (observed_p - expected_p).abs() < 0.03,
            "observed {observed_p}, expected ~{expected_p}"
        );
    }
}
