//! Low-level byte cursor for instruction-stream navigation.
//!
//! The cursor provides forward-only iteration over a fixed byte buffer with
//! position tracking, lookahead, and bounds-checked fixed-width reads. All
//! multi-byte reads are little-endian.
//!
//! Reads past the end return `None` rather than panicking; the decoder turns
//! that into a truncation error, since a stream that ends mid-instruction is
//! always corruption.

/// A forward-only cursor over a byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'buf> {
    /// The buffer being read.
    bytes: &'buf [u8],
    /// Current position.
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $peek:ident, $ty:ty) => {
        /// Read a little-endian value, advancing the cursor.
        #[inline]
        pub fn $name(&mut self) -> Option<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            let slice = self.bytes.get(self.pos..self.pos + N)?;
            self.pos += N;
            Some(<$ty>::from_le_bytes(slice.try_into().expect("slice length")))
        }

        /// Peek a little-endian value without advancing.
        #[inline]
        #[must_use]
        pub fn $peek(&self) -> Option<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            let slice = self.bytes.get(self.pos..self.pos + N)?;
            Some(<$ty>::from_le_bytes(slice.try_into().expect("slice length")))
        }
    };
}

impl<'buf> ByteCursor<'buf> {
    /// Create a cursor at the start of `bytes`.
    #[inline]
    #[must_use]
    pub fn new(bytes: &'buf [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Whether the cursor is exhausted.
    #[inline]
    #[must_use]
    pub const fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    read_le!(read_u8, peek_u8, u8);
    read_le!(read_i8, peek_i8, i8);
    read_le!(read_u16, peek_u16, u16);
    read_le!(read_i16, peek_i16, i16);
    read_le!(read_u32, peek_u32, u32);
    read_le!(read_i32, peek_i32, i32);
    read_le!(read_u64, peek_u64, u64);
    read_le!(read_i64, peek_i64, i64);

    /// Read a little-endian `f32`, advancing the cursor.
    #[inline]
    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read a little-endian `f64`, advancing the cursor.
    #[inline]
    pub fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Read a raw span of `n` bytes, advancing the cursor.
    #[inline]
    pub fn read_bytes(&mut self, n: usize) -> Option<&'buf [u8]> {
        let slice = self.bytes.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(slice)
    }

    /// Peek a raw span of `n` bytes without advancing.
    #[inline]
    #[must_use]
    pub fn peek_bytes(&self, n: usize) -> Option<&'buf [u8]> {
        self.bytes.get(self.pos..self.pos.checked_add(n)?)
    }
}
