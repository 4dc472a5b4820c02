//! Slice assignment (spec.md §4.4): tumbling assigns a timestamp to exactly
//! one slice, sliding assigns it to every slice it falls within.

use ns_common::Timestamp;

use crate::slice::Slice;

#[derive(Debug, Clone, Copy)]
pub enum WindowAssigner {
    /// Size `S`: `t` lands in `[⌊t/S⌋·S, ⌊t/S⌋·S + S)`.
    Tumbling { size_ms: i64 },
    /// Size `S`, step `D`: `t` lands in every `[k·D, k·D + S)` with
    /// `k·D ≤ t < k·D + S`.
    Sliding { size_ms: i64, step_ms: i64 },
}

impl WindowAssigner {
    #[must_use]
    pub fn assign(self, ts: Timestamp) -> Vec<Slice> {
        let t = ts.as_millis();
        match self {
            WindowAssigner::Tumbling { size_ms } => {
                let start = t.div_euclid(size_ms) * size_ms;
                vec![Slice::new(
                    Timestamp::from_millis(start),
                    Timestamp::from_millis(start + size_ms),
                )]
            }
            WindowAssigner::Sliding { size_ms, step_ms } => {
                // Every k with k*step <= t < k*step + size, i.e.
                // k in ((t - size) / step, t / step], k*step <= t.
                let k_max = t.div_euclid(step_ms);
                let k_min = (t - size_ms + step_ms).div_euclid(step_ms);
                (k_min..=k_max)
                    .map(|k| k * step_ms)
                    .filter(|&start| start <= t && t < start + size_ms)
                    .map(|start| {
                        Slice::new(Timestamp::from_millis(start), Timestamp::from_millis(start + size_ms))
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tumbling_assigns_exactly_one_slice() {
        let assigner = WindowAssigner::Tumbling { size_ms: 10_000 };
        let slices = assigner.assign(Timestamp::from_millis(12_345));
        assert_eq!(
            slices,
            vec![Slice::new(Timestamp::from_millis(10_000), Timestamp::from_millis(20_000))]
        );
    }

    #[test]
    fn tumbling_slice_boundary_is_inclusive_on_the_left() {
        let assigner = WindowAssigner::Tumbling { size_ms: 10_000 };
        let slices = assigner.assign(Timestamp::from_millis(10_000));
        assert_eq!(
            slices,
            vec![Slice::new(Timestamp::from_millis(10_000), Timestamp::from_millis(20_000))]
        );
    }

    #[test]
    fn sliding_assigns_every_covering_slice() {
        // size=10s, step=5s: t=12s falls in [5,15) and [10,20).
        let assigner = WindowAssigner::Sliding {
            size_ms: 10_000,
            step_ms: 5_000,
        };
        let mut slices = assigner.assign(Timestamp::from_millis(12_000));
        slices.sort();
        assert_eq!(
            slices,
            vec![
                Slice::new(Timestamp::from_millis(5_000), Timestamp::from_millis(15_000)),
                Slice::new(Timestamp::from_millis(10_000), Timestamp::from_millis(20_000)),
            ]
        );
    }
}
