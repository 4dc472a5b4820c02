//! The fixed-size, work-stealing thread pool spec.md §5 calls for: "parallel
//! threads, fixed pool, work-stealing task queue." Plain `std::thread`, not
//! `tokio` — the compute path is deliberately synchronous (spec.md §5: "no
//! async/await"); `tokio` is reserved for `ns-network`'s I/O edge.
//!
//! Built directly on `crossbeam_deque`'s `Injector`/`Worker`/`Stealer`
//! trio: each pool thread owns a local FIFO `Worker`, submissions land in a
//! shared `Injector`, and an idle thread steals a batch from the injector
//! or, failing that, from a sibling's local queue. The find-a-task loop
//! below is the standard shape `crossbeam_deque`'s own docs show for this
//! pattern.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use metrics::gauge;

use crate::task::{Task, TaskOutcome};

/// Runs one task to completion. Implemented by the query manager, which
/// knows how to route a task to the pipeline/operator it names.
pub trait TaskRunner: Send + Sync + 'static {
    fn run(&self, task: Task) -> TaskOutcome;
}

fn find_task(local: &Worker<Task>, global: &Injector<Task>, stealers: &[Stealer<Task>]) -> Option<Task> {
    local.pop().or_else(|| {
        std::iter::repeat_with(|| {
            global
                .steal_batch_and_pop(local)
                .or_else(|| stealers.iter().map(Stealer::steal).collect())
        })
        .find(|s| !s.is_retry())
        .and_then(Steal::success)
    })
}

/// A fixed pool of worker threads sharing one `Injector<Task>`. Dropping
/// the last handle does not join the threads; call [`WorkerPool::stop`]
/// for a bounded, graceful shutdown (spec.md §5's cancellation model).
pub struct WorkerPool {
    injector: Arc<Injector<Task>>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `num_threads` workers, each running `runner.run(task)` for
    /// every task it pops or steals. `RequiresRepeat` outcomes are
    /// re-enqueued onto the shared injector after sleeping `delay` on the
    /// same worker thread, matching spec.md §5's "voluntarily re-enqueue
    /// itself... used when the shredder is ahead of the submitted sequence
    /// number" — a short, bounded local sleep, not a dedicated timer task.
    pub fn start(num_threads: usize, runner: Arc<dyn TaskRunner>) -> Self {
        let num_threads = num_threads.max(1);
        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers: Vec<Worker<Task>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Task>> = workers.iter().map(Worker::stealer).collect();

        let handles = workers
            .into_iter()
            .enumerate()
            .map(|(idx, local)| {
                let injector = Arc::clone(&injector);
                let shutdown = Arc::clone(&shutdown);
                let runner = Arc::clone(&runner);
                let siblings: Vec<Stealer<Task>> = stealers
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != idx)
                    .map(|(_, s)| s.clone())
                    .collect();
                std::thread::Builder::new()
                    .name(format!("ns-engine-worker-{idx}"))
                    .spawn(move || worker_loop(&local, &injector, &siblings, &shutdown, runner.as_ref()))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            injector,
            shutdown,
            handles,
        }
    }

    /// Hands a task to the shared injector queue.
    pub fn submit(&self, task: Task) {
        self.injector.push(task);
        gauge!("ns_engine_task_queue_depth").set(self.injector.len() as f64);
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }

    /// Signals every worker to exit once its current task (if any)
    /// finishes and its queues are empty, then joins all of them. This is
    /// the graceful path of spec.md §5's cancellation model; tasks already
    /// queued are allowed to drain rather than being dropped.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    local: &Worker<Task>,
    injector: &Injector<Task>,
    siblings: &[Stealer<Task>],
    shutdown: &AtomicBool,
    runner: &dyn TaskRunner,
) {
    loop {
        match find_task(local, injector, siblings) {
            Some(task) => {
                gauge!("ns_engine_task_queue_depth").set(injector.len() as f64);
                match runner.run(task.clone()) {
                    TaskOutcome::Done => {}
                    TaskOutcome::RequiresRepeat { delay } => {
                        if delay > Duration::ZERO {
                            std::thread::sleep(delay);
                        }
                        injector.push(task);
                    }
                }
            }
            None => {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}
