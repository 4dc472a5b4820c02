//! The task model the work-stealing pool schedules (spec.md §5): one of
//! four independent task kinds, each carrying exactly the arguments spec.md
//! names for it.

use std::time::Duration;

use ns_buffers::TupleBuffer;
use ns_common::{OperatorId, QuerySubPlanId};

use crate::query::{SliceHandlerId, SliceId};

/// A unit of work on the scheduler's queue. `RunPipelineOnBuffer` is the
/// hot path; the other three exist to drive EOS propagation, the shredder's
/// self-repeat protocol, and window triggering without giving any of them
/// their own dedicated queue.
#[derive(Clone)]
pub enum Task {
    RunPipelineOnBuffer {
        sub_plan_id: QuerySubPlanId,
        buffer: TupleBuffer,
    },
    InjectEos {
        operator_id: OperatorId,
        graceful: bool,
    },
    RepeatTask {
        sub_plan_id: QuerySubPlanId,
        buffer: TupleBuffer,
        delay: Duration,
    },
    WindowTrigger {
        handler_id: SliceHandlerId,
        slice_id: SliceId,
    },
}

impl Task {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Task::RunPipelineOnBuffer { .. } => "run_pipeline_on_buffer",
            Task::InjectEos { .. } => "inject_eos",
            Task::RepeatTask { .. } => "repeat_task",
            Task::WindowTrigger { .. } => "window_trigger",
        }
    }
}

/// What running a task produced. `RequiresRepeat` is spec.md §5's
/// voluntary self-re-enqueue: "used when the shredder is ahead of the
/// submitted sequence number." It is not an error — the caller schedules a
/// `RepeatTask` carrying the same buffer and returns control to the pool
/// rather than retrying inline.
pub enum TaskOutcome {
    Done,
    RequiresRepeat { delay: Duration },
}
