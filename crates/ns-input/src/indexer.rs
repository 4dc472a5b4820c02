//! Delimiter indexing: the "Field Index Function" spec.md §4.3 step 1
//! names. Scans a raw buffer once with [`memchr::memchr_iter`] and records
//! every tuple-delimiter offset, mirroring
//! `CharacterDelimitedDecoder` in the teacher pack's codec layer, which
//! also indexes a byte buffer with `memchr` ahead of slicing frames out of
//! it rather than scanning byte-by-byte in a hand-rolled loop.

/// Offsets of every tuple delimiter found in a raw buffer, plus the two
/// facts the shredder needs: whether the buffer contains at least one
/// delimiter at all, and where its first and last delimiter fall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelimiterIndex {
    /// Byte offset, within the buffer, of every delimiter found.
    pub offsets: Vec<usize>,
}

impl DelimiterIndex {
    #[must_use]
    pub fn has_delimiter(&self) -> bool {
        !self.offsets.is_empty()
    }

    #[must_use]
    pub fn first_offset(&self) -> Option<usize> {
        self.offsets.first().copied()
    }

    #[must_use]
    pub fn last_offset(&self) -> Option<usize> {
        self.offsets.last().copied()
    }

    /// Number of complete, self-contained tuples this buffer holds: the
    /// delimiter-separated spans strictly between two offsets. A buffer
    /// with delimiters at `[10, 25, 40]` holds two complete tuples (10..25
    /// and 25..40); the bytes before offset 0 and after the last delimiter
    /// belong to tuples that span into neighboring buffers.
    #[must_use]
    pub fn interior_tuple_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// The `(start, end)` byte range, exclusive of the delimiter itself, of
    /// the `n`th complete interior tuple.
    #[must_use]
    pub fn interior_tuple(&self, n: usize) -> Option<(usize, usize)> {
        if n + 1 >= self.offsets.len() {
            return None;
        }
        Some((self.offsets[n] + 1, self.offsets[n + 1]))
    }
}

/// Scans `bytes` for `delimiter`, returning every offset at which it
/// occurs. This is the Field Index Function for a single-byte delimiter
/// (the common case: newline-delimited CSV, NDJSON).
#[must_use]
pub fn index_delimiters(bytes: &[u8], delimiter: u8) -> DelimiterIndex {
    DelimiterIndex {
        offsets: memchr::memchr_iter(delimiter, bytes).collect(),
    }
}
