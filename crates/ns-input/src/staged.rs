use ns_buffers::TupleBuffer;
use ns_common::SequenceNumber;

use crate::indexer::DelimiterIndex;

/// A raw buffer held by the shredder until its boundary tuples (if any)
/// are resolved. Mirrors spec.md §3's `StagedBuffer`: the buffer itself
/// plus the delimiter offsets computed once at staging time.
#[derive(Clone)]
pub struct StagedBuffer {
    pub buffer: TupleBuffer,
    pub sequence_number: SequenceNumber,
    pub index: DelimiterIndex,
    /// Number of valid leading bytes in `buffer` (a source's final read
    /// before EOS may fill less than the buffer's full capacity).
    pub content_len: usize,
}

impl StagedBuffer {
    #[must_use]
    pub fn new(buffer: TupleBuffer, index: DelimiterIndex, content_len: usize) -> Self {
        let sequence_number = buffer.sequence_number();
        Self {
            buffer,
            sequence_number,
            index,
            content_len,
        }
    }

    #[must_use]
    pub fn has_delimiter(&self) -> bool {
        self.index.has_delimiter()
    }

    /// Bytes after this buffer's last delimiter: the start of whatever
    /// tuple continues into the next buffer. Empty if the buffer ends
    /// exactly on a delimiter or has no delimiter at all (in which case
    /// the whole buffer is the tail).
    pub fn tail<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.buffer.with_bytes(|bytes| {
            let start = self.index.last_offset().map_or(0, |o| o + 1);
            f(&bytes[start..self.content_len])
        })
    }

    /// Bytes before this buffer's first delimiter: the end of whatever
    /// tuple started in a previous buffer. Empty if the buffer starts
    /// exactly on a delimiter or has no delimiter at all (in which case
    /// the whole buffer is the head).
    pub fn head<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.buffer.with_bytes(|bytes| {
            let end = self.index.first_offset().unwrap_or(self.content_len);
            f(&bytes[..end])
        })
    }

    /// The buffer's valid content, for middle members of a chain that
    /// carry no delimiter at all.
    pub fn whole<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.buffer.with_bytes(|bytes| f(&bytes[..self.content_len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::index_delimiters;
    use ns_buffers::BufferPool;

    fn make_staged(pool: &BufferPool, bytes: &[u8], seq: u64) -> StagedBuffer {
        let buf = pool.acquire();
        buf.with_bytes_mut(|b| b[..bytes.len()].copy_from_slice(bytes));
        buf.set_sequence_number(SequenceNumber::new(seq));
        let index = index_delimiters(bytes, b'\n');
        StagedBuffer::new(buf, index, bytes.len())
    }

    #[test]
    fn tail_and_head_carve_around_the_boundary_delimiters() {
        let pool = BufferPool::new(4, 64);
        let staged = make_staged(&pool, b"x,y\nz,w\ntrailing", 1);
        assert_eq!(staged.tail(|b| b.to_vec()), b"trailing".to_vec());
        assert_eq!(staged.head(|b| b.to_vec()), b"x,y".to_vec());
    }

    #[test]
    fn buffer_without_delimiter_is_entirely_tail_and_head() {
        let pool = BufferPool::new(4, 64);
        let staged = make_staged(&pool, b"mid-span-bytes", 2);
        assert!(!staged.has_delimiter());
        assert_eq!(staged.tail(|b| b.to_vec()), staged.head(|b| b.to_vec()));
    }
}
