use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ns_common::{ChunkNumber, OriginId, SequenceNumber, Timestamp};
use parking_lot::Mutex;

use crate::pool::PoolHandle;

/// Mutable header fields carried alongside a buffer's bytes. Grouped behind
/// one lock since they are always read/written together at chunk/sequence
/// assignment time, never on the per-record hot path.
#[derive(Debug, Clone, Default)]
pub(crate) struct BufferMeta {
    pub tuple_count: usize,
    pub tuple_width: usize,
    pub origin: OriginId,
    pub sequence_number: SequenceNumber,
    pub chunk_number: ChunkNumber,
    pub last_chunk: bool,
    pub watermark: Timestamp,
}

struct Inner {
    storage: Mutex<Box<[u8]>>,
    meta: Mutex<BufferMeta>,
    creation_ts: Timestamp,
    pool: PoolHandle,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut *self.storage.lock());
        self.pool.release_raw(storage);
    }
}

/// A reference-counted, fixed-capacity slab of bytes plus the metadata
/// spec.md §3 assigns to `TupleBuffer`.
///
/// Cloning a `TupleBuffer` shares the underlying slab (reference counting
/// governs lifetime, per spec.md §3): the storage is only returned to its
/// pool once the last clone is dropped, which also means it can never be
/// released twice — there is nothing to double-release, the pool only ever
/// sees the bytes once, when the strong count hits zero.
#[derive(Clone)]
pub struct TupleBuffer {
    inner: Arc<Inner>,
}

impl TupleBuffer {
    pub(crate) fn new(storage: Box<[u8]>, pool: PoolHandle) -> Self {
        let creation_ts = now_millis();
        Self {
            inner: Arc::new(Inner {
                storage: Mutex::new(storage),
                meta: Mutex::new(BufferMeta::default()),
                creation_ts,
                pool,
            }),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.storage.lock().len()
    }

    #[must_use]
    pub fn creation_timestamp(&self) -> Timestamp {
        self.inner.creation_ts
    }

    /// Run `f` against the buffer's raw bytes. Callers holding a `Layout`
    /// binding go through `calc_offset` before touching this directly.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.inner.storage.lock())
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.inner.storage.lock())
    }

    #[must_use]
    pub fn number_of_tuples(&self) -> usize {
        self.inner.meta.lock().tuple_count
    }

    /// Sets the logical tuple count. Invariant (spec.md §3):
    /// `tupleCount * tupleWidth <= size`.
    pub fn set_number_of_tuples(&self, n: usize) {
        let mut meta = self.inner.meta.lock();
        debug_assert!(
            meta.tuple_width == 0 || n * meta.tuple_width <= self.size(),
            "tuple_count * tuple_width must not exceed buffer capacity"
        );
        meta.tuple_count = n;
    }

    #[must_use]
    pub fn tuple_width(&self) -> usize {
        self.inner.meta.lock().tuple_width
    }

    pub fn set_tuple_width(&self, width: usize) {
        self.inner.meta.lock().tuple_width = width;
    }

    #[must_use]
    pub fn origin(&self) -> OriginId {
        self.inner.meta.lock().origin
    }

    pub fn set_origin(&self, origin: OriginId) {
        self.inner.meta.lock().origin = origin;
    }

    #[must_use]
    pub fn sequence_number(&self) -> SequenceNumber {
        self.inner.meta.lock().sequence_number
    }

    pub fn set_sequence_number(&self, seq: SequenceNumber) {
        self.inner.meta.lock().sequence_number = seq;
    }

    #[must_use]
    pub fn chunk_number(&self) -> ChunkNumber {
        self.inner.meta.lock().chunk_number
    }

    pub fn set_chunk_number(&self, chunk: ChunkNumber) {
        self.inner.meta.lock().chunk_number = chunk;
    }

    #[must_use]
    pub fn is_last_chunk(&self) -> bool {
        self.inner.meta.lock().last_chunk
    }

    pub fn set_last_chunk(&self, last: bool) {
        self.inner.meta.lock().last_chunk = last;
    }

    #[must_use]
    pub fn watermark(&self) -> Timestamp {
        self.inner.meta.lock().watermark
    }

    pub fn set_watermark(&self, watermark: Timestamp) {
        self.inner.meta.lock().watermark = watermark;
    }

    /// Number of `TupleBuffer` clones (including this one) currently alive.
    /// Used by the sequence shredder's `validateState` to confirm every
    /// staged buffer it released is otherwise unreferenced.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for TupleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.inner.meta.lock();
        f.debug_struct("TupleBuffer")
            .field("size", &self.size())
            .field("tuple_count", &meta.tuple_count)
            .field("tuple_width", &meta.tuple_width)
            .field("origin", &meta.origin)
            .field("sequence_number", &meta.sequence_number)
            .field("chunk_number", &meta.chunk_number)
            .field("last_chunk", &meta.last_chunk)
            .field("watermark", &meta.watermark)
            .finish()
    }
}

fn now_millis() -> Timestamp {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    Timestamp::from_millis(ms as i64)
}
