//! Lock-free ring-buffer variant of the sequence shredder, for the
//! high-throughput path where a `Mutex`-guarded `BTreeMap`
//! ([`crate::shredder::SequenceShredder`]) would serialize every
//! submitting thread against one lock.
//!
//! Each slot's control word packs a 32-bit generation ("lap") tag with
//! four flag bits into one `AtomicU64`, the same bit-packing idiom the
//! teacher pack doesn't itself need but the pack's buffer-pool sibling
//! crates reach for whenever a single word has to carry both an ABA
//! guard and small enum-like state atomically: claiming a slot is a
//! single `compare_exchange`, so two threads racing to stage the same
//! sequence number can never both believe they won.
//!
//! The claim itself is genuinely lock-free; the staged `TupleBuffer` a
//! winning claim then stores is handed off through a per-slot `Mutex`
//! rather than a raw pointer, since `TupleBuffer` is not `Copy` and this
//! workspace has no way to validate hand-rolled unsafe aliasing against
//! a tool like miri. The mutex is only ever contended by the single
//! thread that already won the CAS, so it never actually blocks.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use ns_common::SequenceNumber;
use parking_lot::Mutex;

use crate::error::{DuplicateSubmissionSnafu, ShredderError, SlotContendedSnafu};
use crate::shredder::ResolvedChain;
use crate::staged::StagedBuffer;
use snafu::ensure;

const FLAG_HAS_DELIMITER: u64 = 1 << 0;
const FLAG_NO_DELIMITER: u64 = 1 << 1;
const FLAG_COMPLETED_LEADING: u64 = 1 << 2;
const FLAG_COMPLETED_TRAILING: u64 = 1 << 3;
const FLAG_MASK: u64 = 0b1111;

fn pack(generation: u32, flags: u64) -> u64 {
    (u64::from(generation) << 32) | (flags & FLAG_MASK)
}

fn unpack(state: u64) -> (u32, u64) {
    ((state >> 32) as u32, state & FLAG_MASK)
}

struct Slot {
    state: CachePadded<AtomicU64>,
    payload: Mutex<Option<StagedBuffer>>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: CachePadded::new(AtomicU64::new(0)),
            payload: Mutex::new(None),
        }
    }
}

/// A fixed-capacity ring of claimable slots, addressed by
/// `sequence % capacity` with `sequence / capacity` as the generation
/// tag distinguishing one lap of the ring from the next.
pub struct RingShredder {
    slots: Vec<Slot>,
    capacity: u64,
}

impl RingShredder {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be nonzero");
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Self {
            slots,
            capacity: capacity as u64,
        }
    }

    fn index_and_lap(&self, seq: SequenceNumber) -> (usize, u32) {
        let zero_based = seq.get() - SequenceNumber::FIRST.get();
        (
            (zero_based % self.capacity) as usize,
            (zero_based / self.capacity) as u32,
        )
    }

    /// Claims the slot for `staged`'s sequence number, recording whether
    /// it carries a delimiter, then attempts to resolve every run this
    /// claim could complete. Mirrors
    /// [`crate::shredder::SequenceShredder::submit`]'s run-detection
    /// rules, reading neighboring slots through the atomic tag instead of
    /// a `BTreeMap`.
    pub fn submit(&self, staged: StagedBuffer) -> Result<Vec<ResolvedChain>, ShredderError> {
        let seq = staged.sequence_number;
        let (idx, lap) = self.index_and_lap(seq);
        let slot = &self.slots[idx];
        let has_delimiter = staged.has_delimiter();

        loop {
            let cur = slot.state.load(Ordering::Acquire);
            let (gen, flags) = unpack(cur);
            if flags != 0 {
                ensure!(gen != lap, DuplicateSubmissionSnafu { sequence: seq });
                return SlotContendedSnafu {
                    sequence: seq,
                    held_generation: gen,
                }
                .fail();
            }
            let new_flags = if has_delimiter {
                FLAG_HAS_DELIMITER
            } else {
                FLAG_NO_DELIMITER
            };
            let new_state = pack(lap, new_flags);
            if slot
                .state
                .compare_exchange(cur, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let is_terminal = staged.buffer.is_last_chunk();
        *slot.payload.lock() = Some(staged);

        let owes_head = has_delimiter && seq.get() > SequenceNumber::FIRST.get();
        let owes_tail = has_delimiter && !is_terminal;

        let mut resolved = Vec::new();
        if has_delimiter {
            if owes_head {
                if let Some(left) = self.scan(seq, -1) {
                    if let Some(chain) = self.build_chain(left, seq) {
                        resolved.push(chain);
                    }
                }
            }
            if owes_tail {
                if let Some(right) = self.scan(seq, 1) {
                    if let Some(chain) = self.build_chain(seq, right) {
                        resolved.push(chain);
                    }
                }
            }
        } else {
            let left = if seq.get() > SequenceNumber::FIRST.get() {
                self.scan(seq, -1)
            } else {
                None
            };
            let right = self.scan(seq, 1);
            if let (Some(left), Some(right)) = (left, right) {
                if let Some(chain) = self.build_chain(left, right) {
                    resolved.push(chain);
                }
            }
        }
        Ok(resolved)
    }

    fn slot_has_delimiter(&self, seq: SequenceNumber) -> Option<bool> {
        let (idx, lap) = self.index_and_lap(seq);
        let (gen, flags) = unpack(self.slots[idx].state.load(Ordering::Acquire));
        if flags == 0 || gen != lap {
            return None;
        }
        Some(flags & FLAG_HAS_DELIMITER != 0)
    }

    fn scan(&self, from: SequenceNumber, direction: i64) -> Option<SequenceNumber> {
        let mut cur = from.get() as i64 + direction;
        loop {
            if cur < SequenceNumber::FIRST.get() as i64 {
                return None;
            }
            let seq = SequenceNumber::new(cur as u64);
            match self.slot_has_delimiter(seq) {
                None => return None,
                Some(true) => return Some(seq),
                Some(false) => cur += direction,
            }
        }
    }

    fn build_chain(&self, left: SequenceNumber, right: SequenceNumber) -> Option<ResolvedChain> {
        let mut members = Vec::with_capacity((right.get() - left.get() + 1) as usize);
        let mut cur = left.get();
        while cur <= right.get() {
            let seq = SequenceNumber::new(cur);
            let (idx, lap) = self.index_and_lap(seq);
            let slot = &self.slots[idx];
            let (gen, flags) = unpack(slot.state.load(Ordering::Acquire));
            if flags == 0 || gen != lap {
                return None; // raced with a release; caller will re-resolve on the next arrival
            }
            members.push(slot.payload.lock().clone()?);
            cur += 1;
        }
        Some(ResolvedChain {
            members,
            completed_by_index: 0,
        })
    }

    /// Marks every member of a resolved chain as having delivered its
    /// boundary-relevant role, freeing slots whose roles are now fully
    /// spent. Delimited anchor slots free only once both the leading
    /// (head) and trailing (tail) roles have each been claimed by a
    /// separate chain; delimiter-less middle slots free immediately.
    pub fn release_chain(&self, chain: &ResolvedChain) {
        let last = chain.members.len() - 1;
        for (i, member) in chain.members.iter().enumerate() {
            let seq = member.sequence_number;
            let (idx, lap) = self.index_and_lap(seq);
            let slot = &self.slots[idx];
            loop {
                let cur = slot.state.load(Ordering::Acquire);
                let (gen, flags) = unpack(cur);
                if gen != lap || flags == 0 {
                    break; // already freed by a racing release
                }
                let fully_delimited = flags & FLAG_HAS_DELIMITER != 0;
                let role = if !fully_delimited {
                    FLAG_COMPLETED_LEADING // the sole role a middle slot owes
                } else if i == 0 {
                    FLAG_COMPLETED_TRAILING
                } else if i == last {
                    FLAG_COMPLETED_LEADING
                } else {
                    FLAG_COMPLETED_LEADING | FLAG_COMPLETED_TRAILING
                };
                let new_flags = flags | role;
                let is_first = seq.get() == SequenceNumber::FIRST.get();
                let is_terminal = slot
                    .payload
                    .lock()
                    .as_ref()
                    .is_some_and(|s| s.buffer.is_last_chunk());
                let fully_spent = if !fully_delimited {
                    true
                } else if is_first {
                    // the very first buffer in a stream never has a
                    // predecessor, so its leading (head) role never
                    // arises; the trailing role alone is sufficient.
                    new_flags & FLAG_COMPLETED_TRAILING != 0
                } else if is_terminal {
                    // symmetrically, the stream's last chunk never has a
                    // successor, so its trailing role never arises.
                    new_flags & FLAG_COMPLETED_LEADING != 0
                } else {
                    new_flags & (FLAG_COMPLETED_LEADING | FLAG_COMPLETED_TRAILING)
                        == (FLAG_COMPLETED_LEADING | FLAG_COMPLETED_TRAILING)
                };
                let new_state = if fully_spent { 0 } else { pack(lap, new_flags) };
                if slot
                    .state
                    .compare_exchange(cur, new_state, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    if fully_spent {
                        *slot.payload.lock() = None;
                    }
                    break;
                }
            }
        }
    }

    /// Every slot's flags are either empty or a valid, non-contradictory
    /// combination (never both `HAS_DELIMITER` and `NO_DELIMITER`).
    #[must_use]
    pub fn validate_state(&self) -> bool {
        self.slots.iter().all(|slot| {
            let (_, flags) = unpack(slot.state.load(Ordering::Acquire));
            flags & (FLAG_HAS_DELIMITER | FLAG_NO_DELIMITER)
                != (FLAG_HAS_DELIMITER | FLAG_NO_DELIMITER)
        })
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

    #[test]
    fn resolves_a_spanning_run_across_claimed_slots() {
        let pool = BufferPool::new(8, 64);
        let ring = RingShredder::new(16);

        let b1 = staged_for(&pool, b"a,1\ntail-of-2-", 1);
        let b2 = staged_for(&pool, b"still-mid-", 2);
        let b3 = staged_for(&pool, b"-end\nx,9\n", 3);

        assert!(ring.submit(b3).unwrap().is_empty());
        assert!(ring.submit(b1).unwrap().is_empty());
        let resolved = ring.submit(b2).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].reconstruct(), b"tail-of-2-still-mid--end".to_vec());
    }

    #[test]
    fn duplicate_submission_in_the_same_lap_is_rejected() {
        let pool = BufferPool::new(8, 64);
        let ring = RingShredder::new(16);
        let b1 = staged_for(&pool, b"a,1\n", 1);
        let b1_again = staged_for(&pool, b"a,1\n", 1);
        ring.submit(b1).unwrap();
        assert!(matches!(
            ring.submit(b1_again),
            Err(ShredderError::DuplicateSubmission { .. })
        ));
    }

    #[test]
    fn a_stale_unreleased_slot_reports_contention_not_corruption() {
        let pool = BufferPool::new(8, 64);
        let ring = RingShredder::new(4);
        let b1 = staged_for(&pool, b"a,1\n", 1);
        ring.submit(b1).unwrap();
        // sequence 5 maps to the same slot as 1 (capacity 4) but a later lap.
        let b5 = staged_for(&pool, b"b,2\n", 5);
        assert!(matches!(
            ring.submit(b5),
            Err(ShredderError::SlotContended { .. })
        ));
    }

    #[test]
    fn fully_released_anchor_slot_can_be_reclaimed_by_the_next_lap() {
        let pool = BufferPool::new(8, 64);
        let ring = RingShredder::new(4);
        let b1 = staged_for(&pool, b"a,1\ntail", 1);
        let b2 = staged_for(&pool, b"-of-1\nb,2\n", 2);
        ring.submit(b1).unwrap();
        let resolved = ring.submit(b2).unwrap();
        assert_eq!(resolved.len(), 1);
        ring.release_chain(&resolved[0]);

        // seq 1 and seq 5 share slot index 0 (capacity 4, zero-based), one
        // lap apart; seq 1's slot is now free for seq 5 to claim.
        let b5 = staged_for(&pool, b"c,3\n", 5);
        assert!(ring.submit(b5).is_ok());
    }
}
