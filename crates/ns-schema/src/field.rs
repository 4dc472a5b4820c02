use serde::{Deserialize, Serialize};

/// Concrete field types spec.md §3 names: signed/unsigned ints of 8-64 bits,
/// float/double, a fixed-size char array, and a variable-size data handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Fixed-size inline char array, stored in place.
    FixedChar(usize),
    /// Variable-size payload: the in-row storage is a handle (an offset +
    /// length pair into the buffer's variable-size region / arena), matching
    /// the "variable-size data handle" of spec.md §3.
    VarSized,
}

impl DataType {
    /// Width in bytes this field occupies *in the fixed-size row or column
    /// region* — for `VarSized` this is the width of the handle, not of the
    /// referenced payload.
    #[must_use]
    pub const fn width_bytes(self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 8,
            DataType::FixedChar(n) => n,
            // (offset: u32, length: u32)
            DataType::VarSized => 8,
        }
    }

    #[must_use]
    pub const fn is_variable_sized(self) -> bool {
        matches!(self, DataType::VarSized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    #[must_use]
    pub fn width_bytes(&self) -> usize {
        self.data_type.width_bytes()
    }
}
