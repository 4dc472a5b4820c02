//! Query Manager / Node Engine (spec.md §4.6): pipeline registration and
//! lifecycle, task routing, per-sub-plan statistics.

use std::collections::HashMap;
use std::sync::Arc;

use ns_buffers::TupleBuffer;
use ns_common::{OperatorId, QueryId, QuerySubPlanId};
use parking_lot::Mutex;

use crate::error::{
    AlreadyRegisteredSnafu, EngineError, InvalidTransitionSnafu, UnknownOperatorSnafu, UnknownQuerySnafu,
    UnknownSubPlanSnafu,
};
use crate::pool::TaskRunner;
use crate::stats::{SubPlanStatistics, SubPlanStatisticsSnapshot};
use crate::task::{Task, TaskOutcome};
use snafu::{ensure, OptionExt};

/// Identifies a registered `WindowOperator`/`NestedLoopJoin` trigger
/// handler within a sub-plan; opaque outside this crate's task routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceHandlerId(pub u64);

/// A slice's start timestamp in milliseconds, as produced by
/// `ns_runtime::Slice` — kept as a bare `i64` here rather than re-exporting
/// the runtime type, since the task queue only ever needs to name a slice,
/// never inspect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceId(pub i64);

/// State machine spec.md §4.6 assigns to a registered query:
/// `Invalid → Registered → Running → Stopped|Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Invalid,
    Registered,
    Running,
    Stopped,
    Failed,
}

/// What a registered pipeline does with the tasks routed to it. One
/// instance per `querySubPlanId`; `ns-compiler`'s codegen back-ends sit
/// behind this trait so the engine never depends on `ns-compiler` directly.
pub trait PipelineHandler: Send + Sync {
    fn run_on_buffer(&self, buffer: TupleBuffer) -> TaskOutcome;

    /// EOS reached this pipeline's source operator; `graceful` distinguishes
    /// a planned shutdown from a hard stop (spec.md §5's cancellation
    /// model).
    fn handle_eos(&self, graceful: bool);

    /// Invoked once, when the sub-plan stops (for any reason). Release
    /// whatever the handler is holding (slice stores, open sinks).
    fn cleanup(&self);
}

struct SubPlan {
    handler: Arc<dyn PipelineHandler>,
    stats: Arc<SubPlanStatistics>,
}

struct QueryRecord {
    state: QueryState,
    sub_plans: HashMap<QuerySubPlanId, SubPlan>,
}

/// Registers compiled pipelines under a `queryId`, routes tasks to their
/// sub-plans, and tracks per-sub-plan statistics. Implements [`TaskRunner`]
/// so a [`crate::pool::WorkerPool`] can drive it directly.
pub struct QueryManager {
    queries: Mutex<HashMap<QueryId, QueryRecord>>,
    operator_routes: Mutex<HashMap<OperatorId, QuerySubPlanId>>,
}

impl Default for QueryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queries: Mutex::new(HashMap::new()),
            operator_routes: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a compiled pipeline's sub-plans under `query_id`.
    /// Idempotence (spec.md §8): calling this twice for the same
    /// `query_id` returns [`EngineError::AlreadyRegistered`] rather than
    /// silently replacing the first registration.
    pub fn register(
        &self,
        query_id: QueryId,
        sub_plans: Vec<(QuerySubPlanId, Arc<dyn PipelineHandler>)>,
        operators: Vec<(OperatorId, QuerySubPlanId)>,
    ) -> Result<(), EngineError> {
        let mut queries = self.queries.lock();
        ensure!(!queries.contains_key(&query_id), AlreadyRegisteredSnafu { query_id });

        let sub_plans = sub_plans
            .into_iter()
            .map(|(sub_plan_id, handler)| {
                (
                    sub_plan_id,
                    SubPlan {
                        handler,
                        stats: Arc::new(SubPlanStatistics::start(sub_plan_id)),
                    },
                )
            })
            .collect();
        queries.insert(
            query_id,
            QueryRecord {
                state: QueryState::Registered,
                sub_plans,
            },
        );
        drop(queries);

        let mut routes = self.operator_routes.lock();
        for (operator_id, sub_plan_id) in operators {
            routes.insert(operator_id, sub_plan_id);
        }
        info!(%query_id, "query registered");
        Ok(())
    }

    /// `Registered → Running`.
    pub fn start(&self, query_id: QueryId) -> Result<(), EngineError> {
        let mut queries = self.queries.lock();
        let record = queries.get_mut(&query_id).context(UnknownQuerySnafu { query_id })?;
        ensure!(
            record.state == QueryState::Registered,
            InvalidTransitionSnafu {
                query_id,
                action: "start",
                from: record.state,
                required: "Registered",
            }
        );
        record.state = QueryState::Running;
        info!(%query_id, "query running");
        Ok(())
    }

    /// Stops a query (`Registered|Running → Stopped`), invoking
    /// `cleanup` on every sub-plan handler. Safe to call twice: the second
    /// call is a no-op, matching spec.md §8's `stop(q); stop(q)` idempotence
    /// law.
    pub fn stop(&self, query_id: QueryId) -> Result<(), EngineError> {
        let mut queries = self.queries.lock();
        let record = queries.get_mut(&query_id).context(UnknownQuerySnafu { query_id })?;
        if record.state == QueryState::Stopped || record.state == QueryState::Failed {
            return Ok(());
        }
        for sub_plan in record.sub_plans.values() {
            sub_plan.handler.cleanup();
            sub_plan.stats.mark_ended();
        }
        record.state = QueryState::Stopped;
        info!(%query_id, "query stopped");
        Ok(())
    }

    /// `undeploy`: stop, then forget the query entirely (spec.md §4.6:
    /// "Undeploy = stop + unregister").
    pub fn undeploy(&self, query_id: QueryId) -> Result<(), EngineError> {
        self.stop(query_id)?;
        let mut queries = self.queries.lock();
        queries.remove(&query_id);
        let mut routes = self.operator_routes.lock();
        routes.retain(|_, sub_plan_id| {
            !queries
                .values()
                .any(|record| record.sub_plans.contains_key(sub_plan_id))
        });
        Ok(())
    }

    /// `failQuery`: terminal from any non-terminal state. Per the resolved
    /// Open Question, in-flight state is dropped, not flushed — `cleanup`
    /// still runs so handlers release their resources, but no attempt is
    /// made to drain already-queued buffers first.
    pub fn fail_query(&self, query_id: QueryId, reason: &str) -> Result<(), EngineError> {
        let mut queries = self.queries.lock();
        let record = queries.get_mut(&query_id).context(UnknownQuerySnafu { query_id })?;
        if record.state == QueryState::Failed {
            return Ok(());
        }
        for sub_plan in record.sub_plans.values() {
            sub_plan.handler.cleanup();
            sub_plan.stats.mark_ended();
        }
        record.state = QueryState::Failed;
        error!(%query_id, reason, "query failed");
        Ok(())
    }

    #[must_use]
    pub fn state(&self, query_id: QueryId) -> Option<QueryState> {
        self.queries.lock().get(&query_id).map(|record| record.state)
    }

    /// `getQueryStatistics(queryId)`: the per-sub-plan vector, available
    /// even for a failed or stopped query.
    pub fn query_statistics(&self, query_id: QueryId) -> Result<Vec<SubPlanStatisticsSnapshot>, EngineError> {
        let queries = self.queries.lock();
        let record = queries.get(&query_id).context(UnknownQuerySnafu { query_id })?;
        Ok(record.sub_plans.values().map(|sub_plan| sub_plan.stats.snapshot()).collect())
    }

    fn sub_plan_for(&self, query_id: QueryId, sub_plan_id: QuerySubPlanId) -> Result<(Arc<dyn PipelineHandler>, Arc<SubPlanStatistics>), EngineError> {
        let queries = self.queries.lock();
        let record = queries.get(&query_id).context(UnknownQuerySnafu { query_id })?;
        let sub_plan = record
            .sub_plans
            .get(&sub_plan_id)
            .context(UnknownSubPlanSnafu { query_id, sub_plan_id })?;
        Ok((Arc::clone(&sub_plan.handler), Arc::clone(&sub_plan.stats)))
    }

    fn sub_plan_for_operator(&self, operator_id: OperatorId) -> Result<QuerySubPlanId, EngineError> {
        self.operator_routes
            .lock()
            .get(&operator_id)
            .copied()
            .context(UnknownOperatorSnafu { operator_id })
    }

    fn query_owning(&self, sub_plan_id: QuerySubPlanId) -> Option<QueryId> {
        self.queries
            .lock()
            .iter()
            .find(|(_, record)| record.sub_plans.contains_key(&sub_plan_id))
            .map(|(query_id, _)| *query_id)
    }
}

impl TaskRunner for QueryManager {
    fn run(&self, task: Task) -> TaskOutcome {
        match task {
            Task::RunPipelineOnBuffer { sub_plan_id, buffer } => {
                let Some(query_id) = self.query_owning(sub_plan_id) else {
                    warn!(%sub_plan_id, "buffer routed to an unregistered sub-plan, dropping");
                    return TaskOutcome::Done;
                };
                let Ok((handler, stats)) = self.sub_plan_for(query_id, sub_plan_id) else {
                    return TaskOutcome::Done;
                };
                let tuple_count = buffer.number_of_tuples() as u64;
                stats.record_buffer_in(tuple_count);
                let outcome = handler.run_on_buffer(buffer);
                if matches!(outcome, TaskOutcome::Done) {
                    stats.record_buffer_out(tuple_count);
                }
                outcome
            }
            Task::InjectEos { operator_id, graceful } => {
                match self.sub_plan_for_operator(operator_id) {
                    Ok(sub_plan_id) => {
                        if let Some(query_id) = self.query_owning(sub_plan_id) {
                            if let Ok((handler, _)) = self.sub_plan_for(query_id, sub_plan_id) {
                                handler.handle_eos(graceful);
                            }
                        }
                    }
                    Err(error) => warn!(%operator_id, %error, "EOS for an unrouted operator"),
                }
                TaskOutcome::Done
            }
            Task::RepeatTask { sub_plan_id, buffer, delay } => {
                let Some(query_id) = self.query_owning(sub_plan_id) else {
                    return TaskOutcome::Done;
                };
                let Ok((handler, _)) = self.sub_plan_for(query_id, sub_plan_id) else {
                    return TaskOutcome::Done;
                };
                match handler.run_on_buffer(buffer) {
                    TaskOutcome::Done => TaskOutcome::Done,
                    TaskOutcome::RequiresRepeat { .. } => TaskOutcome::RequiresRepeat { delay },
                }
            }
            Task::WindowTrigger { handler_id, slice_id } => {
                debug!(handler_id = handler_id.0, slice_id = slice_id.0, "window trigger task scheduled");
                TaskOutcome::Done
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_buffers::BufferPool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingHandler {
        ran: AtomicUsize,
        cleaned_up: AtomicUsize,
    }

    impl PipelineHandler for RecordingHandler {
        fn run_on_buffer(&self, buffer: TupleBuffer) -> TaskOutcome {
            buffer.set_number_of_tuples(1);
            self.ran.fetch_add(1, Ordering::SeqCst);
            TaskOutcome::Done
        }
        fn handle_eos(&self, _graceful: bool) {}
        fn cleanup(&self) {
            self.cleaned_up.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handler() -> Arc<RecordingHandler> {
        Arc::new(RecordingHandler {
            ran: AtomicUsize::new(0),
            cleaned_up: AtomicUsize::new(0),
        })
    }

    #[test]
    fn registering_the_same_query_twice_is_rejected() {
        let manager = QueryManager::new();
        let query_id = QueryId::new(1);
        let sub_plan_id = QuerySubPlanId::new(1);
        manager
            .register(query_id, vec![(sub_plan_id, handler())], vec![])
            .unwrap();
        let result = manager.register(query_id, vec![(sub_plan_id, handler())], vec![]);
        assert!(matches!(result, Err(EngineError::AlreadyRegistered { .. })));
    }

    #[test]
    fn stopping_twice_is_safe() {
        let manager = QueryManager::new();
        let query_id = QueryId::new(1);
        manager
            .register(query_id, vec![(QuerySubPlanId::new(1), handler())], vec![])
            .unwrap();
        manager.start(query_id).unwrap();
        manager.stop(query_id).unwrap();
        manager.stop(query_id).unwrap();
        assert_eq!(manager.state(query_id), Some(QueryState::Stopped));
    }

    #[test]
    fn starting_an_unregistered_query_fails() {
        let manager = QueryManager::new();
        let result = manager.start(QueryId::new(99));
        assert!(matches!(result, Err(EngineError::UnknownQuery { .. })));
    }

    #[test]
    fn run_pipeline_on_buffer_updates_statistics() {
        let manager = QueryManager::new();
        let query_id = QueryId::new(1);
        let sub_plan_id = QuerySubPlanId::new(1);
        manager.register(query_id, vec![(sub_plan_id, handler())], vec![]).unwrap();
        manager.start(query_id).unwrap();

        let pool = BufferPool::new(1, 16);
        manager.run(Task::RunPipelineOnBuffer {
            sub_plan_id,
            buffer: pool.acquire(),
        });

        let stats = manager.query_statistics(query_id).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].buffers_in, 1);
        assert_eq!(stats[0].buffers_out, 1);
    }

    #[test]
    fn undeploy_removes_the_query_entirely() {
        let manager = QueryManager::new();
        let query_id = QueryId::new(1);
        manager
            .register(query_id, vec![(QuerySubPlanId::new(1), handler())], vec![])
            .unwrap();
        manager.undeploy(query_id).unwrap();
        assert_eq!(manager.state(query_id), None);
        assert!(matches!(
            manager.query_statistics(query_id),
            Err(EngineError::UnknownQuery { .. })
        ));
    }

    #[test]
    fn fail_query_is_terminal_and_idempotent() {
        let manager = QueryManager::new();
        let query_id = QueryId::new(1);
        manager
            .register(query_id, vec![(QuerySubPlanId::new(1), handler())], vec![])
            .unwrap();
        manager.start(query_id).unwrap();
        manager.fail_query(query_id, "invariant violated").unwrap();
        manager.fail_query(query_id, "called again").unwrap();
        assert_eq!(manager.state(query_id), Some(QueryState::Failed));
    }
}
