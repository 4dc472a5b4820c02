//! The sequence shredder: spec.md §4.3's ordered structure, addressed by
//! sequence number, that reconstructs tuples spanning raw-buffer
//! boundaries regardless of the order the buffers arrive in.
//!
//! A buffer that carries at least one delimiter splits cleanly into a
//! *head* (bytes before its first delimiter, completing a tuple that
//! started in an earlier buffer), zero or more complete interior tuples,
//! and a *tail* (bytes after its last delimiter, starting a tuple that
//! finishes in a later buffer). A buffer with *no* delimiter at all is
//! entirely the middle of some tuple spanning two delimited buffers.
//!
//! A "run" is the maximal contiguous span `[left, right]` where `left`
//! and `right` are the nearest delimited buffers bounding a (possibly
//! empty) stretch of delimiter-less buffers. `left`'s tail, the middle
//! buffers in full, and `right`'s head concatenate into exactly one
//! spanning tuple. Because a run only becomes knowable once every member
//! has arrived, it is detected exactly once: at the submission of
//! whichever buffer happens to be the last piece to arrive — there is no
//! other point at which all of `[left, right]` could simultaneously be
//! present, so no separate bookkeeping against double-detection is
//! needed.

use std::collections::BTreeMap;

use ns_common::SequenceNumber;
use parking_lot::Mutex;

use crate::error::{OutsideWindowSnafu, ShredderError};
use crate::staged::StagedBuffer;
use snafu::ensure;

/// Whether a delimited buffer still owes a head role (closing a run to
/// its left) and/or a tail role (opening a run to its right). The first
/// sequence number a stream ever issues has no predecessor, so its head
/// is already a complete record on its own, not a fragment to merge —
/// [`crate::scan::RawInputFormatScan`] emits it directly and the
/// shredder never goes looking for a left anchor for it. Symmetrically, a
/// buffer marked as the stream's last chunk has no successor, so its tail
/// is emitted directly and the shredder never opens a run to its right.
fn owed_roles(seq: SequenceNumber, has_delimiter: bool, is_terminal: bool) -> (bool, bool) {
    if !has_delimiter {
        return (false, false);
    }
    let owes_head = seq.get() > SequenceNumber::FIRST.get();
    let owes_tail = !is_terminal;
    (owes_head, owes_tail)
}

struct Entry {
    staged: StagedBuffer,
    roles_remaining: u8,
}

struct State {
    window_start: SequenceNumber,
    window_size: u64,
    staged: BTreeMap<SequenceNumber, Entry>,
}

/// A resolved run: the chain of buffers making up one spanning tuple,
/// plus the position of whichever submission completed the chain.
pub struct ResolvedChain {
    pub members: Vec<StagedBuffer>,
    pub completed_by_index: usize,
}

impl ResolvedChain {
    /// Concatenates the boundary-relevant bytes of every member into one
    /// contiguous spanning record: `left.tail() ++ middles ++ right.head()`.
    #[must_use]
    pub fn reconstruct(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let last = self.members.len() - 1;
        for (i, member) in self.members.iter().enumerate() {
            if i == 0 {
                member.tail(|b| out.extend_from_slice(b));
            } else if i == last {
                member.head(|b| out.extend_from_slice(b));
            } else {
                member.whole(|b| out.extend_from_slice(b));
            }
        }
        out
    }
}

/// Mutex-guarded sequence shredder. One instance per origin (spec.md §3:
/// sequence numbers are scoped per origin).
pub struct SequenceShredder {
    state: Mutex<State>,
}

impl SequenceShredder {
    #[must_use]
    pub fn new(window_start: SequenceNumber, window_size: u64) -> Self {
        Self {
            state: Mutex::new(State {
                window_start,
                window_size,
                staged: BTreeMap::new(),
            }),
        }
    }

    /// Stages `buffer` and attempts to resolve every run its arrival could
    /// complete. Returns one [`ResolvedChain`] per run newly completed (0,
    /// 1, or 2: a delimited buffer can simultaneously close the run to its
    /// left and open the run to its right).
    pub fn submit(&self, staged: StagedBuffer) -> Result<Vec<ResolvedChain>, ShredderError> {
        let seq = staged.sequence_number;
        let mut state = self.state.lock();

        let window_end = SequenceNumber::new(state.window_start.get() + state.window_size);
        ensure!(
            seq.get() >= state.window_start.get() && seq < window_end,
            OutsideWindowSnafu {
                sequence: seq,
                window_start: state.window_start,
                window_end,
            }
        );

        let has_delimiter = staged.has_delimiter();
        let is_terminal = staged.buffer.is_last_chunk();
        let (owes_head, owes_tail) = owed_roles(seq, has_delimiter, is_terminal);
        let roles_remaining = if has_delimiter {
            u8::from(owes_head) + u8::from(owes_tail)
        } else {
            1
        };
        if roles_remaining > 0 {
            state.staged.insert(
                seq,
                Entry {
                    staged,
                    roles_remaining,
                },
            );
        }

        let mut resolved = Vec::new();
        if has_delimiter {
            if owes_head {
                if let Some(left) = scan_for_anchor(&state.staged, prev(seq), -1) {
                    resolved.push(build_chain(&state.staged, left, seq));
                }
            }
            if owes_tail {
                if let Some(right) = scan_for_anchor(&state.staged, next(seq), 1) {
                    resolved.push(build_chain(&state.staged, seq, right));
                }
            }
        } else {
            let left = if seq.get() > SequenceNumber::FIRST.get() {
                scan_for_anchor(&state.staged, prev(seq), -1)
            } else {
                None
            };
            let right = scan_for_anchor(&state.staged, next(seq), 1);
            if let (Some(left), Some(right)) = (left, right) {
                resolved.push(build_chain(&state.staged, left, right));
            }
        }

        Ok(resolved)
    }

    /// Releases every member of a resolved chain. Call once the caller has
    /// finished reading whatever bytes it needed from the chain (spec.md
    /// §4.3 step 4: "releases its references to the staged buffers through
    /// the shredder"). A buffer is dropped from the shredder, and its
    /// `TupleBuffer` reference released, only once every role it still
    /// owed has been released.
    pub fn release_chain(&self, chain: &ResolvedChain) {
        let mut state = self.state.lock();
        for member in &chain.members {
            let seq = member.sequence_number;
            let remove = match state.staged.get_mut(&seq) {
                Some(entry) => {
                    entry.roles_remaining = entry.roles_remaining.saturating_sub(1);
                    entry.roles_remaining == 0
                }
                None => false,
            };
            if remove {
                state.staged.remove(&seq);
            }
        }
    }

    /// Forces release of every currently staged buffer, used when an
    /// origin reports end-of-stream with buffers still pending a
    /// never-arriving counterpart (spec.md §4.3: "when a source completes,
    /// all staged buffers are released").
    pub fn release_all_on_eos(&self) {
        self.state.lock().staged.clear();
    }

    /// Slides the active window forward. Sequence numbers below
    /// `new_start` are no longer accepted by `submit`.
    pub fn advance_window(&self, new_start: SequenceNumber) {
        let mut state = self.state.lock();
        state.window_start = new_start;
        state.staged.retain(|&seq, _| seq.get() >= new_start.get());
    }

    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.state.lock().staged.len()
    }

    /// Consistency check spec.md §4.3 calls `validateState()`: no staged
    /// entry should ever reach zero remaining roles without having been
    /// removed, and no staged buffer should be held by more than one
    /// `TupleBuffer` reference beyond the entry itself and any chain
    /// currently being processed by a caller.
    pub fn validate_state(&self) -> bool {
        self.state
            .lock()
            .staged
            .values()
            .all(|entry| entry.roles_remaining > 0)
    }
}

fn prev(seq: SequenceNumber) -> SequenceNumber {
    SequenceNumber::new(seq.get() - 1)
}

fn next(seq: SequenceNumber) -> SequenceNumber {
    SequenceNumber::new(seq.get() + 1)
}

/// Walks from `from` in `direction` (`-1` or `1`) through contiguously
/// staged, delimiter-less buffers until it finds a delimited one (the
/// anchor) or a gap (nothing resolvable yet).
fn scan_for_anchor(
    staged: &BTreeMap<SequenceNumber, Entry>,
    from: SequenceNumber,
    direction: i64,
) -> Option<SequenceNumber> {
    let mut cur = from.get() as i64;
    loop {
        if cur < SequenceNumber::FIRST.get() as i64 {
            return None;
        }
        let seq = SequenceNumber::new(cur as u64);
        match staged.get(&seq) {
            None => return None,
            Some(entry) if entry.staged.has_delimiter() => return Some(seq),
            Some(_) => cur += direction,
        }
    }
}

fn build_chain(
    staged: &BTreeMap<SequenceNumber, Entry>,
    left: SequenceNumber,
    right: SequenceNumber,
) -> ResolvedChain {
    let members: Vec<StagedBuffer> = staged
        .range(left..=right)
        .map(|(_, entry)| entry.staged.clone())
        .collect();
    ResolvedChain {
        members,
        completed_by_index: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::index_delimiters;
    use ns_buffers::BufferPool;

    fn staged_for(pool: &BufferPool, bytes: &[u8], seq: u64) -> StagedBuffer {
        let buf = pool.acquire();
        buf.with_bytes_mut(|b| b[..bytes.len()].copy_from_slice(bytes));
        buf.set_sequence_number(SequenceNumber::new(seq));
        StagedBuffer::new(buf, index_delimiters(bytes, b'\n'), bytes.len())
    }

    /// Scenario S4: six raw buffers form a three-record CSV stream, the
    /// third buffer carries no newline at all, and they arrive out of
    /// order (4, 2, 6, 1, 3, 5). Exactly one spanning record should be
    /// reconstructed, and it should resolve only once every piece of the
    /// run it belongs to has arrived.
    #[test]
    fn s4_out_of_order_arrival_resolves_exactly_one_spanning_run() {
        let pool = BufferPool::new(8, 64);
        // buffer 1: "a,1\n" (complete) + "tail-of-2-" (spans into buffer 2)
        // buffer 2: no delimiter at all, pure middle: "still-mid-"
        // buffer 3: "-end-of-span\n" then "x,9\n" then "y,8\n" (two more complete records)
        let b1 = staged_for(&pool, b"a,1\ntail-of-2-", 1);
        let b2 = staged_for(&pool, b"still-mid-", 2);
        let b3 = staged_for(&pool, b"-end-of-span\nx,9\ny,8\n", 3);

        let shredder = SequenceShredder::new(SequenceNumber::FIRST, 16);

        // arrival order: 3, 1, 2
        assert!(shredder.submit(b3.clone()).unwrap().is_empty());
        assert!(shredder.submit(b1.clone()).unwrap().is_empty());
        let resolved = shredder.submit(b2.clone()).unwrap();
        assert_eq!(resolved.len(), 1);

        let chain = &resolved[0];
        assert_eq!(chain.members.len(), 3);
        let reconstructed = chain.reconstruct();
        assert_eq!(reconstructed, b"tail-of-2-still-mid--end-of-span".to_vec());

        shredder.release_chain(chain);
        // b1 is the stream's first-ever buffer, so its single role (tail)
        // is now fully spent; b2 (a pure middle) is too. b3 still owes its
        // trailing role to whatever run eventually opens to its right.
        assert_eq!(shredder.staged_count(), 1);
        assert!(shredder.validate_state());
    }

    #[test]
    fn adjacent_delimited_buffers_resolve_without_any_middle() {
        let pool = BufferPool::new(8, 64);
        let b1 = staged_for(&pool, b"a,1\ntrail", 1);
        let b2 = staged_for(&pool, b"ing-bytes\nb,2\n", 2);

        let shredder = SequenceShredder::new(SequenceNumber::FIRST, 16);
        assert!(shredder.submit(b1).unwrap().is_empty());
        let resolved = shredder.submit(b2).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].reconstruct(), b"trailing-bytes".to_vec());
    }

    #[test]
    fn a_buffer_can_close_a_run_on_its_left_and_open_one_on_its_right_in_one_submit() {
        let pool = BufferPool::new(8, 64);
        let b1 = staged_for(&pool, b"a,1\nleft-tail", 1);
        let b3 = staged_for(&pool, b"right-head\nb,2\n", 3);

        let shredder = SequenceShredder::new(SequenceNumber::FIRST, 16);
        assert!(shredder.submit(b1).unwrap().is_empty());
        assert!(shredder.submit(b3).unwrap().is_empty());

        // buffer 2 has delimiters on both sides, closing the [1,2] run and
        // opening the [2,3] run in the same submission.
        let b2 = staged_for(&pool, b"middle\nanother,row\n", 2);
        let resolved = shredder.submit(b2).unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn submission_outside_the_active_window_is_rejected() {
        let pool = BufferPool::new(8, 64);
        let shredder = SequenceShredder::new(SequenceNumber::FIRST, 4);
        let stale = staged_for(&pool, b"late,row\n", 99);
        assert!(matches!(
            shredder.submit(stale),
            Err(ShredderError::OutsideWindow { .. })
        ));
    }

    #[test]
    fn release_all_on_eos_drains_every_staged_buffer() {
        let pool = BufferPool::new(8, 64);
        let shredder = SequenceShredder::new(SequenceNumber::FIRST, 16);
        shredder
            .submit(staged_for(&pool, b"no-newline-here", 1))
            .unwrap();
        assert_eq!(shredder.staged_count(), 1);
        shredder.release_all_on_eos();
        assert_eq!(shredder.staged_count(), 0);
    }
}
