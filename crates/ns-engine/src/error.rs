use ns_common::{OperatorId, QueryId, QuerySubPlanId};
use snafu::Snafu;

/// Errors surfaced by the query manager and its task scheduler. Mirrors
/// spec.md §7's error-kind list at the engine boundary: invariant
/// violations and decode errors fail the owning query, pool exhaustion
/// escalates after a timeout, everything else either retries locally
/// (`RepeatTask`) or never reaches this enum at all.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("query {query_id} is not registered"))]
    UnknownQuery { query_id: QueryId },

    #[snafu(display("query {query_id} is already registered"))]
    AlreadyRegistered { query_id: QueryId },

    #[snafu(display("sub-plan {sub_plan_id} of query {query_id} is not registered"))]
    UnknownSubPlan {
        query_id: QueryId,
        sub_plan_id: QuerySubPlanId,
    },

    #[snafu(display(
        "cannot {action} query {query_id} from state {from:?}: {action} requires {required:?}"
    ))]
    InvalidTransition {
        query_id: QueryId,
        action: &'static str,
        from: crate::query::QueryState,
        required: &'static str,
    },

    #[snafu(display("operator {operator_id} has no registered pipeline handler"))]
    UnknownOperator { operator_id: OperatorId },

    #[snafu(display("buffer pool exhausted while running query {query_id}: {source}"))]
    PoolExhausted {
        query_id: QueryId,
        source: ns_buffers::PoolError,
    },

    #[snafu(display("invariant violated while running query {query_id}: {reason}"))]
    InvariantViolation { query_id: QueryId, reason: String },

    #[snafu(display("network channel error while running query {query_id}: {source}"))]
    Network {
        query_id: QueryId,
        source: ns_network::NetworkError,
    },
}
