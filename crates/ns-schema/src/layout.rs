use ns_buffers::TupleBuffer;
use snafu::Snafu;

use crate::field::DataType;
use crate::schema::Schema;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum LayoutError {
    #[snafu(display(
        "row {row_index} field {field_index} offset {offset} exceeds buffer capacity {capacity}"
    ))]
    OutOfBounds {
        row_index: usize,
        field_index: usize,
        offset: usize,
        capacity: usize,
    },
    #[snafu(display("layout is full: capacity {capacity} rows already used"))]
    Full { capacity: usize },
    #[snafu(display("field type mismatch: expected {expected:?}, got {actual:?}"))]
    TypeMismatch { expected: DataType, actual: DataType },
}

/// Row vs. column physical layout, as named by spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Row,
    Column,
}

/// Offset math shared by row and column layouts. Kept as free functions
/// (rather than a trait with dynamic dispatch) since the compiler emits
/// these as inline arithmetic into the fused operator loop (spec.md §4.2) —
/// there is no call site that needs to select the kind at runtime once a
/// pipeline is compiled.
#[derive(Debug, Clone, Copy)]
pub struct RowLayout;

impl RowLayout {
    /// `rowIndex * tupleWidth + Σ₀…fieldIndex-1 fieldWidth` (spec.md §4.1).
    #[must_use]
    pub fn calc_offset(schema: &Schema, row_index: usize, field_index: usize) -> usize {
        row_index * schema.tuple_width_bytes() + schema.field_offset_within_tuple(field_index)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnLayout;

impl ColumnLayout {
    /// `capacity = floor(bufferSize / tupleWidth)` (spec.md §4.1).
    #[must_use]
    pub fn capacity(schema: &Schema, buffer_size: usize) -> usize {
        if schema.tuple_width_bytes() == 0 {
            0
        } else {
            buffer_size / schema.tuple_width_bytes()
        }
    }

    /// `Σ₀…fieldIndex-1 capacity * fieldWidth + rowIndex * fieldWidth`
    /// (spec.md §4.1).
    #[must_use]
    pub fn calc_offset(
        schema: &Schema,
        buffer_size: usize,
        row_index: usize,
        field_index: usize,
    ) -> usize {
        let capacity = Self::capacity(schema, buffer_size);
        let preceding_columns: usize = (0..field_index)
            .map(|i| capacity * schema.field(i).width_bytes())
            .sum();
        preceding_columns + row_index * schema.field(field_index).width_bytes()
    }
}

/// A `Schema` bound to a concrete `TupleBuffer` and layout kind — the
/// "binding vector" spec.md §4.1 describes `calcOffset`/push/read as methods
/// of. This is also where `DynamicMemoryLayoutTest.cpp`'s bound
/// read/write-by-field-name behavior (SPEC_FULL.md §3) lives.
pub struct BoundLayout<'a> {
    schema: &'a Schema,
    buffer: TupleBuffer,
    kind: LayoutKind,
    bounds_checked: bool,
    capacity_rows: usize,
}

impl<'a> BoundLayout<'a> {
    #[must_use]
    pub fn new(schema: &'a Schema, buffer: TupleBuffer, kind: LayoutKind, bounds_checked: bool) -> Self {
        let capacity_rows = match kind {
            LayoutKind::Row => {
                if schema.tuple_width_bytes() == 0 {
                    0
                } else {
                    buffer.size() / schema.tuple_width_bytes()
                }
            }
            LayoutKind::Column => ColumnLayout::capacity(schema, buffer.size()),
        };
        buffer.set_tuple_width(schema.tuple_width_bytes());
        Self {
            schema,
            buffer,
            kind,
            bounds_checked,
            capacity_rows,
        }
    }

    #[must_use]
    pub fn capacity_rows(&self) -> usize {
        self.capacity_rows
    }

    pub fn calc_offset(&self, row_index: usize, field_index: usize) -> Result<usize, LayoutError> {
        let offset = match self.kind {
            LayoutKind::Row => RowLayout::calc_offset(self.schema, row_index, field_index),
            LayoutKind::Column => {
                ColumnLayout::calc_offset(self.schema, self.buffer.size(), row_index, field_index)
            }
        };
        if self.bounds_checked {
            let field_width = self.schema.field(field_index).width_bytes();
            if offset + field_width > self.buffer.size() {
                return Err(LayoutError::OutOfBounds {
                    row_index,
                    field_index,
                    offset,
                    capacity: self.buffer.size(),
                });
            }
        }
        Ok(offset)
    }

    /// Appends a record at the next free row, spec.md §4.1's "pushing a
    /// record into a bound layout appends at the next free row (if any)".
    pub fn push_u32_row(&self, values: &[u32]) -> Result<usize, LayoutError> {
        let row_index = self.buffer.number_of_tuples();
        if row_index >= self.capacity_rows {
            return Err(LayoutError::Full {
                capacity: self.capacity_rows,
            });
        }
        for (field_index, value) in values.iter().enumerate() {
            self.write_u32(row_index, field_index, *value)?;
        }
        self.buffer.set_number_of_tuples(row_index + 1);
        Ok(row_index)
    }

    pub fn write_u32(&self, row_index: usize, field_index: usize, value: u32) -> Result<(), LayoutError> {
        let field = self.schema.field(field_index);
        if field.width_bytes() != 4 {
            return Err(LayoutError::TypeMismatch {
                expected: DataType::UInt32,
                actual: field.data_type,
            });
        }
        let offset = self.calc_offset(row_index, field_index)?;
        self.buffer
            .with_bytes_mut(|bytes| bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes()));
        Ok(())
    }

    pub fn read_u32(&self, row_index: usize, field_index: usize) -> Result<u32, LayoutError> {
        let field = self.schema.field(field_index);
        if field.width_bytes() != 4 {
            return Err(LayoutError::TypeMismatch {
                expected: DataType::UInt32,
                actual: field.data_type,
            });
        }
        let offset = self.calc_offset(row_index, field_index)?;
        Ok(self
            .buffer
            .with_bytes(|bytes| u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())))
    }

    pub fn write_u64(&self, row_index: usize, field_index: usize, value: u64) -> Result<(), LayoutError> {
        let offset = self.calc_offset(row_index, field_index)?;
        self.buffer
            .with_bytes_mut(|bytes| bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes()));
        Ok(())
    }

    pub fn read_u64(&self, row_index: usize, field_index: usize) -> Result<u64, LayoutError> {
        let offset = self.calc_offset(row_index, field_index)?;
        Ok(self
            .buffer
            .with_bytes(|bytes| u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())))
    }

    /// Reads by field name, the binding behavior SPEC_FULL.md §3 folds into
    /// this type rather than a separate "dynamic tuple buffer" wrapper.
    pub fn read_u32_by_name(&self, row_index: usize, name: &str) -> Result<u32, LayoutError> {
        let field_index = self
            .schema
            .field_index(name)
            .expect("caller passed a field name not present in the bound schema");
        self.read_u32(row_index, field_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DataType, Field};
    use crate::schema::Schema;
    use ns_buffers::BufferPool;

    fn s1_schema() -> Schema {
        Schema::new(vec![
            Field::new("f1", DataType::UInt8),
            Field::new("f2", DataType::UInt16),
            Field::new("f3", DataType::UInt32),
        ])
    }

    #[test]
    fn s1_row_offset_matches_spec() {
        let schema = s1_schema();
        // Row offset (1, 2) = 1*8 + (1+2) = 11
        assert_eq!(RowLayout::calc_offset(&schema, 1, 2), 11);
    }

    #[test]
    fn s1_column_offset_matches_spec() {
        let schema = s1_schema();
        let buffer_size = 4096;
        // capacity = 4096 / 8 = 512
        assert_eq!(ColumnLayout::capacity(&schema, buffer_size), 512);
        // Column offset (1, 2) = 512*1 + 512*2 + 1*4 = 1540
        assert_eq!(
            ColumnLayout::calc_offset(&schema, buffer_size, 1, 2),
            1540
        );
    }

    #[test]
    fn bound_layout_round_trips_u32() {
        let schema = Schema::new(vec![Field::new("v", DataType::UInt32)]);
        let pool = BufferPool::new(1, 64);
        let buffer = pool.acquire();
        let layout = BoundLayout::new(&schema, buffer, LayoutKind::Row, true);
        let row = layout.push_u32_row(&[42]).unwrap();
        assert_eq!(layout.read_u32(row, 0).unwrap(), 42);
    }

    #[test]
    fn bound_layout_rejects_push_past_capacity() {
        let schema = Schema::new(vec![Field::new("v", DataType::UInt32)]);
        let pool = BufferPool::new(1, 4); // exactly one row of capacity
        let buffer = pool.acquire();
        let layout = BoundLayout::new(&schema, buffer, LayoutKind::Row, true);
        layout.push_u32_row(&[1]).unwrap();
        assert!(matches!(
            layout.push_u32_row(&[2]),
            Err(LayoutError::Full { capacity: 1 })
        ));
    }

    #[test]
    fn bounds_checked_offset_rejects_out_of_range() {
        let schema = s1_schema();
        let pool = BufferPool::new(1, 8);
        let buffer = pool.acquire();
        let layout = BoundLayout::new(&schema, buffer, LayoutKind::Row, true);
        assert!(layout.calc_offset(5, 2).is_err());
    }

    #[test]
    fn unchecked_offset_skips_bounds_check() {
        let schema = s1_schema();
        let pool = BufferPool::new(1, 8);
        let buffer = pool.acquire();
        let layout = BoundLayout::new(&schema, buffer, LayoutKind::Row, false);
        assert!(layout.calc_offset(5, 2).is_ok());
    }
}
