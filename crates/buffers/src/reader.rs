//! Binary buffer reader with cursor tracking.

use std::str;

use crate::BufferError;

/// Reads big-endian primitives from a byte slice.
///
/// Every read is bounds-checked and returns [`BufferError::EndOfBuffer`]
/// instead of panicking.
///
/// # Example
///
/// ```
/// use datatree_buffers::Reader;
///
/// let data = [0x01, 0x02, 0x03];
/// let mut reader = Reader::new(&data);
/// assert_eq!(reader.u8(), Ok(0x01));
/// assert_eq!(reader.u16(), Ok(0x0203));
/// assert!(reader.u8().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    /// The underlying byte slice.
    pub uint8: &'a [u8],
    /// Current cursor position.
    pub x: usize,
}

impl<'a> Reader<'a> {
    pub fn new(uint8: &'a [u8]) -> Self {
        Self { uint8, x: 0 }
    }

    /// Number of unread bytes.
    pub fn size(&self) -> usize {
        self.uint8.len().saturating_sub(self.x)
    }

    pub fn has_data(&self) -> bool {
        self.x < self.uint8.len()
    }

    #[inline]
    fn check(&self, n: usize) -> Result<(), BufferError> {
        if self.x + n > self.uint8.len() {
            Err(BufferError::EndOfBuffer)
        } else {
            Ok(())
        }
    }

    /// Peeks at the current byte without advancing.
    pub fn peek(&self) -> Result<u8, BufferError> {
        self.check(1)?;
        Ok(self.uint8[self.x])
    }

    pub fn skip(&mut self, length: usize) -> Result<(), BufferError> {
        self.check(length)?;
        self.x += length;
        Ok(())
    }

    /// Returns the next `size` bytes and advances past them.
    pub fn buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        self.check(size)?;
        let start = self.x;
        self.x += size;
        Ok(&self.uint8[start..self.x])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        self.check(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.uint8[self.x..self.x + N]);
        self.x += N;
        Ok(out)
    }

    #[inline]
    pub fn u8(&mut self) -> Result<u8, BufferError> {
        self.check(1)?;
        let val = self.uint8[self.x];
        self.x += 1;
        Ok(val)
    }

    #[inline]
    pub fn u16(&mut self) -> Result<u16, BufferError> {
        self.array().map(u16::from_be_bytes)
    }

    #[inline]
    pub fn u32(&mut self) -> Result<u32, BufferError> {
        self.array().map(u32::from_be_bytes)
    }

    #[inline]
    pub fn i32(&mut self) -> Result<i32, BufferError> {
        self.array().map(i32::from_be_bytes)
    }

    #[inline]
    pub fn u64(&mut self) -> Result<u64, BufferError> {
        self.array().map(u64::from_be_bytes)
    }

    #[inline]
    pub fn i64(&mut self) -> Result<i64, BufferError> {
        self.array().map(i64::from_be_bytes)
    }

    #[inline]
    pub fn f32(&mut self) -> Result<f32, BufferError> {
        self.array().map(f32::from_be_bytes)
    }

    /// Reads bytes written by [`crate::Writer::bytes32`].
    pub fn bytes32(&mut self) -> Result<&'a [u8], BufferError> {
        let len = self.u32()? as usize;
        self.buf(len)
    }

    /// Reads a string written by [`crate::Writer::str32`].
    ///
    /// The cursor is restored when the payload is truncated or not UTF-8.
    pub fn str32(&mut self) -> Result<&'a str, BufferError> {
        let start = self.x;
        let result = self
            .bytes32()
            .and_then(|bytes| str::from_utf8(bytes).map_err(|_| BufferError::InvalidUtf8));
        if result.is_err() {
            self.x = start;
        }
        result
    }
}
