//! Approximate in-memory sizing, used by slice stores and paged vectors to
//! report the state-size figures spec.md §4.4 requires aggregation functions
//! to expose.

pub trait ByteSizeOf {
    /// Size of `self` on the heap, not counting `size_of::<Self>()` itself.
    fn allocated_bytes(&self) -> usize;

    /// Total size, stack + heap.
    fn size_of(&self) -> usize {
        std::mem::size_of_val(self) + self.allocated_bytes()
    }
}

impl<T: ByteSizeOf> ByteSizeOf for Vec<T> {
    fn allocated_bytes(&self) -> usize {
        self.capacity() * std::mem::size_of::<T>()
            + self.iter().map(ByteSizeOf::allocated_bytes).sum::<usize>()
    }
}

impl ByteSizeOf for String {
    fn allocated_bytes(&self) -> usize {
        self.capacity()
    }
}

macro_rules! primitive_byte_size {
    ($($t:ty),*) => {
        $(
            impl ByteSizeOf for $t {
                fn allocated_bytes(&self) -> usize {
                    0
                }
            }
        )*
    };
}

primitive_byte_size!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, bool);
