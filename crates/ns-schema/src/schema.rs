use crate::field::Field;

/// An ordered sequence of named, typed fields (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    offsets: Vec<usize>,
    tuple_width_bytes: usize,
}

impl Schema {
    /// Tuple width alignment (spec.md §8 S1: `tupleWidth` for `(u8,u16,u32)`
    /// is 8, not the unpadded sum 7), matching the teacher's word-aligned
    /// record layouts.
    const ALIGNMENT_BYTES: usize = 8;

    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut running = 0usize;
        for field in &fields {
            offsets.push(running);
            running += field.width_bytes();
        }
        let tuple_width_bytes = running.div_ceil(Self::ALIGNMENT_BYTES) * Self::ALIGNMENT_BYTES;
        Self {
            fields,
            offsets,
            tuple_width_bytes,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn tuple_width_bytes(&self) -> usize {
        self.tuple_width_bytes
    }

    /// Byte offset of `field_index` *within one tuple*, i.e.
    /// `Σ₀…field_index-1 fieldWidth` from spec.md §4.1's row-offset formula.
    #[must_use]
    pub fn field_offset_within_tuple(&self, field_index: usize) -> usize {
        self.offsets[field_index]
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    #[must_use]
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::DataType;

    #[test]
    fn tuple_width_pads_up_to_the_alignment() {
        // S1 from spec.md §8: f1: u8, f2: u16, f3: u32 sum to 7 bytes,
        // padded up to the documented tupleWidth of 8.
        let schema = Schema::new(vec![
            Field::new("f1", DataType::UInt8),
            Field::new("f2", DataType::UInt16),
            Field::new("f3", DataType::UInt32),
        ]);
        assert_eq!(schema.tuple_width_bytes(), 8);
        assert_eq!(schema.field_offset_within_tuple(0), 0);
        assert_eq!(schema.field_offset_within_tuple(1), 1);
        assert_eq!(schema.field_offset_within_tuple(2), 3);
    }

    #[test]
    fn tuple_width_already_aligned_is_unchanged() {
        let schema = Schema::new(vec![Field::new("v", DataType::UInt64)]);
        assert_eq!(schema.tuple_width_bytes(), 8);
    }
}
