//! Ties the buffer pool, work-stealing thread pool and query manager
//! together into one running node, and installs the fatal-error handler
//! SPEC_FULL.md §9 describes: "a per-process singleton registered at
//! engine construction, removed at engine teardown."

use std::backtrace::Backtrace;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ns_buffers::BufferPool;

use crate::config::WorkerConfig;
use crate::pool::WorkerPool;
use crate::query::QueryManager;

static ENGINE_POISONED: AtomicBool = AtomicBool::new(false);

/// True once the fatal-error handler has fired for any `NodeEngine` in
/// this process. spec.md §4.6: "the engine becomes non-functional; no
/// recovery is attempted" — this flag is the only way that non-functional
/// state is observed, deliberately global since a fatal signal is a
/// process-wide event.
#[must_use]
pub fn is_poisoned() -> bool {
    ENGINE_POISONED.load(Ordering::SeqCst)
}

/// A running node: its buffer pool, its task scheduler, and the query
/// manager that routes tasks into registered pipelines.
pub struct NodeEngine {
    pub buffer_pool: Arc<BufferPool>,
    pub query_manager: Arc<QueryManager>,
    pool: Option<WorkerPool>,
    previous_hook: Option<Box<dyn Fn(&panic::PanicHookInfo<'_>) + Sync + Send + 'static>>,
}

impl NodeEngine {
    /// Starts the worker thread pool and installs the fatal-error hook.
    /// There is deliberately no async runtime here (spec.md §5): the
    /// compute path is plain threads end to end.
    #[must_use]
    pub fn start(config: &WorkerConfig) -> Self {
        let buffer_pool = Arc::new(BufferPool::new(config.num_buffers, config.buffer_size_bytes));
        let query_manager = Arc::new(QueryManager::new());
        let pool = WorkerPool::start(config.num_worker_threads, Arc::clone(&query_manager) as Arc<_>);

        let previous_hook = Some(panic::take_hook());
        panic::set_hook(Box::new(fatal_error_handler));

        Self {
            buffer_pool,
            query_manager,
            pool: Some(pool),
            previous_hook,
        }
    }

    pub fn submit(&self, task: crate::task::Task) {
        if let Some(pool) = &self.pool {
            pool.submit(task);
        }
    }

    /// Graceful shutdown: drains the thread pool, then restores whatever
    /// panic hook was installed before this engine started (so a second
    /// `NodeEngine` in the same process, e.g. in tests, doesn't pile up
    /// hooks).
    pub fn shutdown(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.stop();
        }
        if let Some(hook) = self.previous_hook.take() {
            panic::set_hook(hook);
        }
    }
}

fn fatal_error_handler(info: &panic::PanicHookInfo<'_>) {
    ENGINE_POISONED.store(true, Ordering::SeqCst);
    let backtrace = Backtrace::force_capture();
    error!(%info, %backtrace, "fatal error in node engine, no recovery will be attempted");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_shutdown_round_trips_cleanly() {
        let config = WorkerConfig {
            num_worker_threads: 2,
            num_buffers: 4,
            buffer_size_bytes: 64,
            ..WorkerConfig::default()
        };
        let engine = NodeEngine::start(&config);
        assert_eq!(engine.buffer_pool.total_buffers(), 4);
        engine.shutdown();
    }
}
