//! Executes discovered tests against an in-process [`ns_engine::NodeEngine`],
//! per spec.md §6: "report a pass/fail line per test plus, on failure, a
//! diff." A compiled pipeline is not yet wired end to end into this
//! driver (see DESIGN.md), so each test runs a pass-through pipeline
//! handler that forwards its input tuple count and the comparison is
//! against `expected_tuple_count` — a smoke-test harness today, the seam
//! a real compiled-plan execution slots into later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ns_buffers::TupleBuffer;
use ns_common::{OperatorId, QueryId, QuerySubPlanId};
use ns_engine::{NodeEngine, PipelineHandler, Task, TaskOutcome, WorkerConfig};

use crate::discover::TestCase;

struct EchoHandler {
    tuples_seen: AtomicU64,
}

impl PipelineHandler for EchoHandler {
    fn run_on_buffer(&self, buffer: TupleBuffer) -> TaskOutcome {
        self.tuples_seen
            .fetch_add(buffer.number_of_tuples() as u64, Ordering::SeqCst);
        TaskOutcome::Done
    }

    fn handle_eos(&self, _graceful: bool) {}

    fn cleanup(&self) {}
}

pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    pub diff: Option<String>,
}

/// Runs one test case end to end: registers a single-sub-plan query,
/// pushes one buffer carrying `input_tuple_count` tuples, stops the query,
/// and compares the handler's tuple count against `expected_tuple_count`.
pub fn run_test(engine: &NodeEngine, case: &TestCase) -> TestOutcome {
    let query_id = QueryId::new(stable_id(&case.name));
    let sub_plan_id = QuerySubPlanId::new(1);
    let operator_id = OperatorId::new(1);

    let handler = Arc::new(EchoHandler {
        tuples_seen: AtomicU64::new(0),
    });
    if engine
        .query_manager
        .register(
            query_id,
            vec![(sub_plan_id, Arc::clone(&handler) as Arc<dyn PipelineHandler>)],
            vec![(operator_id, sub_plan_id)],
        )
        .is_err()
    {
        return TestOutcome {
            name: case.name.clone(),
            passed: false,
            diff: Some(format!("could not register query for test {}", case.name)),
        };
    }
    engine.query_manager.start(query_id).expect("just registered");

    let buffer = engine.buffer_pool.acquire();
    buffer.set_number_of_tuples(case.input_tuple_count as usize);
    engine.submit(Task::RunPipelineOnBuffer { sub_plan_id, buffer });

    // Tasks run on the work-stealing pool asynchronously to this call;
    // give them a bounded window to land before comparing.
    let deadline = std::time::Instant::now() + Duration::from_millis(250);
    while handler.tuples_seen.load(Ordering::SeqCst) < case.expected_tuple_count
        && std::time::Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(5));
    }

    let actual = handler.tuples_seen.load(Ordering::SeqCst);
    engine.query_manager.undeploy(query_id).ok();

    if actual == case.expected_tuple_count {
        TestOutcome {
            name: case.name.clone(),
            passed: true,
            diff: None,
        }
    } else {
        TestOutcome {
            name: case.name.clone(),
            passed: false,
            diff: Some(format!(
                "expected {} tuples, got {actual} (fixture {})",
                case.expected_tuple_count,
                case.path.display()
            )),
        }
    }
}

pub fn run_all(config: &WorkerConfig, cases: &[TestCase]) -> Vec<TestOutcome> {
    let engine = NodeEngine::start(config);
    let outcomes = cases.iter().map(|case| run_test(&engine, case)).collect();
    engine.shutdown();
    outcomes
}

/// A test's name hashed down to a `u64` so each test gets a stable,
/// distinct `queryId` without the driver needing a persistent id registry.
fn stable_id(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn case(name: &str, input: u64, expected: u64) -> TestCase {
        TestCase {
            name: name.to_string(),
            group: "default".to_string(),
            input_tuple_count: input,
            expected_tuple_count: expected,
            path: PathBuf::from(format!("{name}.test.yaml")),
        }
    }

    #[test]
    fn a_matching_tuple_count_passes() {
        let config = WorkerConfig {
            num_worker_threads: 1,
            num_buffers: 4,
            buffer_size_bytes: 64,
            ..WorkerConfig::default()
        };
        let outcomes = run_all(&config, &[case("echoes_its_input", 7, 7)]);
        assert!(outcomes[0].passed);
        assert!(outcomes[0].diff.is_none());
    }

    #[test]
    fn a_mismatched_tuple_count_fails_with_a_diff() {
        let config = WorkerConfig {
            num_worker_threads: 1,
            num_buffers: 4,
            buffer_size_bytes: 64,
            ..WorkerConfig::default()
        };
        let outcomes = run_all(&config, &[case("drops_a_tuple", 7, 8)]);
        assert!(!outcomes[0].passed);
        assert!(outcomes[0].diff.is_some());
    }

    #[test]
    fn stable_id_is_deterministic_and_name_sensitive() {
        assert_eq!(stable_id("a"), stable_id("a"));
        assert_ne!(stable_id("a"), stable_id("b"));
    }
}
