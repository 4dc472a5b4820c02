//! Query Manager / Node Engine (spec.md §4.6) and the concurrency
//! substrate it runs on (spec.md §5): a fixed, work-stealing thread pool
//! scheduling `RunPipelineOnBuffer`/`InjectEOS`/`RepeatTask`/`WindowTrigger`
//! tasks, plus the ambient configuration and statistics surface
//! SPEC_FULL.md §2/§4.7 add around it.

#![deny(clippy::all)]

#[macro_use]
extern crate tracing;

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod query;
pub mod stats;
pub mod task;

pub use cache::{CacheError, SerializableDecomposedQueryPlan, SerializableSubPlan};
pub use config::{ConfigError, QueryCompilerConfig, WorkerConfig};
pub use engine::NodeEngine;
pub use error::EngineError;
pub use pool::{TaskRunner, WorkerPool};
pub use query::{PipelineHandler, QueryManager, QueryState, SliceHandlerId, SliceId};
pub use stats::{SubPlanStatistics, SubPlanStatisticsSnapshot};
pub use task::{Task, TaskOutcome};
