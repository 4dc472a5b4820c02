//! Per-sub-plan statistics (spec.md §4.6, supplemented in SPEC_FULL.md §4.7
//! with the buffers-processed count `original_source/src/NodeEngine/NodeEngine.cpp`
//! tracks alongside tuples in/out).

use std::time::{Duration, SystemTime};

use metrics::counter;
use ns_common::QuerySubPlanId;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    tuples_in: u64,
    tuples_out: u64,
    buffers_in: u64,
    buffers_out: u64,
}

/// Lock-guarded counters for one running sub-plan, plus the wall-clock
/// start/end timestamps spec.md §4.6 calls "start/end time". `end` stays
/// `None` until the sub-plan stops or fails.
pub struct SubPlanStatistics {
    sub_plan_id: QuerySubPlanId,
    counters: Mutex<Counters>,
    start: SystemTime,
    end: Mutex<Option<SystemTime>>,
}

impl SubPlanStatistics {
    #[must_use]
    pub fn start(sub_plan_id: QuerySubPlanId) -> Self {
        Self {
            sub_plan_id,
            counters: Mutex::new(Counters::default()),
            start: SystemTime::now(),
            end: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn sub_plan_id(&self) -> QuerySubPlanId {
        self.sub_plan_id
    }

    pub fn record_buffer_in(&self, tuple_count: u64) {
        let mut counters = self.counters.lock();
        counters.buffers_in += 1;
        counters.tuples_in += tuple_count;
        drop(counters);
        counter!("ns_engine_tuples_in_total", "sub_plan_id" => self.sub_plan_id.to_string())
            .increment(tuple_count);
    }

    pub fn record_buffer_out(&self, tuple_count: u64) {
        let mut counters = self.counters.lock();
        counters.buffers_out += 1;
        counters.tuples_out += tuple_count;
        drop(counters);
        counter!("ns_engine_tuples_out_total", "sub_plan_id" => self.sub_plan_id.to_string())
            .increment(tuple_count);
    }

    /// Marks the sub-plan stopped (or failed); idempotent, keeping the
    /// first recorded end time rather than the last.
    pub fn mark_ended(&self) {
        let mut end = self.end.lock();
        if end.is_none() {
            *end = Some(SystemTime::now());
        }
    }

    #[must_use]
    pub fn tuples_in(&self) -> u64 {
        self.counters.lock().tuples_in
    }

    #[must_use]
    pub fn tuples_out(&self) -> u64 {
        self.counters.lock().tuples_out
    }

    #[must_use]
    pub fn buffers_in(&self) -> u64 {
        self.counters.lock().buffers_in
    }

    #[must_use]
    pub fn buffers_out(&self) -> u64 {
        self.counters.lock().buffers_out
    }

    /// Wall-clock duration so far, or the full run if the sub-plan has
    /// ended.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let end = self.end.lock().unwrap_or_else(SystemTime::now);
        end.duration_since(self.start).unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> SubPlanStatisticsSnapshot {
        let counters = *self.counters.lock();
        SubPlanStatisticsSnapshot {
            sub_plan_id: self.sub_plan_id,
            tuples_in: counters.tuples_in,
            tuples_out: counters.tuples_out,
            buffers_in: counters.buffers_in,
            buffers_out: counters.buffers_out,
            elapsed: self.elapsed(),
        }
    }
}

/// An immutable point-in-time copy of a sub-plan's counters, returned by
/// `getQueryStatistics` (spec.md §4.6) so callers don't hold the engine's
/// locks while inspecting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPlanStatisticsSnapshot {
    pub sub_plan_id: QuerySubPlanId,
    pub tuples_in: u64,
    pub tuples_out: u64,
    pub buffers_in: u64,
    pub buffers_out: u64,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_multiple_buffers() {
        let stats = SubPlanStatistics::start(QuerySubPlanId::new(1));
        stats.record_buffer_in(10);
        stats.record_buffer_in(5);
        stats.record_buffer_out(12);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.tuples_in, 15);
        assert_eq!(snapshot.buffers_in, 2);
        assert_eq!(snapshot.tuples_out, 12);
        assert_eq!(snapshot.buffers_out, 1);
    }

    #[test]
    fn mark_ended_freezes_the_duration() {
        let stats = SubPlanStatistics::start(QuerySubPlanId::new(1));
        stats.mark_ended();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        let second = stats.elapsed();
        assert_eq!(first, second);
    }
}
