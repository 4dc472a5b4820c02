use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use snafu::Snafu;

use crate::buffer::TupleBuffer;

#[derive(Debug, Snafu)]
pub enum PoolError {
    #[snafu(display(
        "timed out after {timeout:?} waiting for a free buffer (pool exhausted)"
    ))]
    Exhausted { timeout: Duration },
}

struct State {
    free: Vec<Box<[u8]>>,
    outstanding: usize,
}

struct PoolInner {
    state: Mutex<State>,
    available: Condvar,
    buffer_size: usize,
    total_buffers: usize,
}

/// Handle a `TupleBuffer` holds on its owning pool so it can return its
/// storage when the last reference is dropped, without the buffer itself
/// needing to know about `BufferPool`'s public API.
#[derive(Clone)]
pub(crate) struct PoolHandle(Arc<PoolInner>);

impl PoolHandle {
    pub(crate) fn release_raw(&self, storage: Box<[u8]>) {
        if storage.is_empty() {
            // Buffer was moved-out of already (shouldn't happen in practice,
            // `Drop` only runs once per `Inner`), nothing to release.
            return;
        }
        let mut state = self.0.state.lock();
        state.free.push(storage);
        state.outstanding -= 1;
        drop(state);
        self.0.available.notify_one();
    }
}

/// A fixed-size, fixed-count pool of pooled byte regions (spec.md §4.1).
///
/// `acquire` blocks the calling thread until a buffer becomes free, matching
/// spec.md §5's "a task may block on `BufferPool.acquire()` when pool is
/// exhausted". There is no async variant: the hot compute path spec.md §5
/// describes is plain worker threads, not `tokio` tasks.
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    #[must_use]
    pub fn new(total_buffers: usize, buffer_size: usize) -> Self {
        let free = (0..total_buffers)
            .map(|_| vec![0u8; buffer_size].into_boxed_slice())
            .collect();
        let inner = Arc::new(PoolInner {
            state: Mutex::new(State {
                free,
                outstanding: 0,
            }),
            available: Condvar::new(),
            buffer_size,
            total_buffers,
        });
        Self { inner }
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    #[must_use]
    pub fn total_buffers(&self) -> usize {
        self.inner.total_buffers
    }

    #[must_use]
    pub fn available_buffers(&self) -> usize {
        self.inner.state.lock().free.len()
    }

    /// Blocks until a buffer is free, then returns it. This is the
    /// unconditional variant used by production call sites; tests and
    /// timeout-sensitive callers should use [`BufferPool::try_acquire_timeout`].
    #[must_use]
    pub fn acquire(&self) -> TupleBuffer {
        let mut state = self.inner.state.lock();
        while state.free.is_empty() {
            self.inner.available.wait(&mut state);
        }
        let storage = state.free.pop().expect("checked non-empty above");
        state.outstanding += 1;
        drop(state);
        TupleBuffer::new(storage, PoolHandle(Arc::clone(&self.inner)))
    }

    /// As `acquire`, but gives up after `timeout` and surfaces
    /// [`PoolError::Exhausted`], matching spec.md §7's "pool exhaustion ...
    /// timeout escalates to engine failure".
    pub fn try_acquire_timeout(&self, timeout: Duration) -> Result<TupleBuffer, PoolError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.free.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PoolError::Exhausted { timeout });
            }
            let timed_out = self.inner.available.wait_for(&mut state, remaining);
            if timed_out.timed_out() && state.free.is_empty() {
                return Err(PoolError::Exhausted { timeout });
            }
        }
        let storage = state.free.pop().expect("checked non-empty above");
        state.outstanding += 1;
        drop(state);
        Ok(TupleBuffer::new(storage, PoolHandle(Arc::clone(&self.inner))))
    }

    /// Explicit release, provided for parity with spec.md §4.1's
    /// `release(buffer)` operation. In practice this is a no-op over what
    /// dropping the last `TupleBuffer` clone already does; it exists so
    /// callers can express "I am done with this" without relying on scope
    /// exit, the way `vector_buffers::Acker` lets a sink mark completion
    /// explicitly rather than through `Drop`.
    pub fn release(&self, buffer: TupleBuffer) {
        drop(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn acquire_and_release_recycles_storage() {
        let pool = BufferPool::new(2, 64);
        assert_eq!(pool.available_buffers(), 2);

        let a = pool.acquire();
        assert_eq!(pool.available_buffers(), 1);
        let b = pool.acquire();
        assert_eq!(pool.available_buffers(), 0);

        drop(a);
        assert_eq!(pool.available_buffers(), 1);
        drop(b);
        assert_eq!(pool.available_buffers(), 2);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let pool = Arc::new(BufferPool::new(1, 16));
        let first = pool.acquire();

        let pool2 = Arc::clone(&pool);
        let handle = thread::spawn(move || {
            let _second = pool2.acquire();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        drop(first);
        handle.join().unwrap();
    }

    #[test]
    fn try_acquire_timeout_reports_exhaustion() {
        let pool = BufferPool::new(1, 16);
        let _held = pool.acquire();
        let err = pool
            .try_acquire_timeout(Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { .. }));
    }

    #[test]
    fn never_hands_out_more_than_total_buffers() {
        let pool = BufferPool::new(3, 16);
        let bufs: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        assert_eq!(pool.available_buffers(), 0);
        assert!(pool
            .try_acquire_timeout(Duration::from_millis(5))
            .is_err());
        drop(bufs);
        assert_eq!(pool.available_buffers(), 3);
    }
}
