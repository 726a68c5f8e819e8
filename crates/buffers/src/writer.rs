//! Binary buffer writer with auto-growing capacity.

/// A byte writer that grows automatically as needed.
///
/// All multi-byte integers and floats are written big-endian.
///
/// # Example
///
/// ```
/// use datatree_buffers::Writer;
///
/// let mut writer = Writer::new();
/// writer.u8(0x01);
/// writer.u16(0x0203);
/// assert_eq!(writer.flush(), [0x01, 0x02, 0x03]);
/// ```
pub struct Writer {
    /// The underlying byte buffer.
    pub uint8: Vec<u8>,
    /// Position where last flush happened.
    pub x0: usize,
    /// Current cursor position.
    pub x: usize,
    alloc_size: usize,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// Creates a writer with a 4KB initial allocation.
    pub fn new() -> Self {
        Self::with_alloc_size(4 * 1024)
    }

    pub fn with_alloc_size(alloc_size: usize) -> Self {
        Self {
            uint8: vec![0u8; alloc_size.max(1)],
            x0: 0,
            x: 0,
            alloc_size: alloc_size.max(1),
        }
    }

    /// Ensures the buffer has at least `capacity` bytes available past the cursor.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        let remaining = self.uint8.len() - self.x;
        if remaining < capacity {
            let total = self.uint8.len() - self.x0;
            let required = total + capacity - remaining;
            let new_size = if required <= self.alloc_size {
                self.alloc_size
            } else {
                required * 2
            };
            self.grow(new_size);
        }
    }

    fn grow(&mut self, new_size: usize) {
        let mut new_buf = vec![0u8; new_size];
        let len = self.x - self.x0;
        new_buf[..len].copy_from_slice(&self.uint8[self.x0..self.x]);
        self.uint8 = new_buf;
        self.x = len;
        self.x0 = 0;
    }

    /// Number of bytes written since the last flush.
    pub fn len(&self) -> usize {
        self.x - self.x0
    }

    pub fn is_empty(&self) -> bool {
        self.x == self.x0
    }

    /// Bytes written since the last flush, without consuming them.
    pub fn as_slice(&self) -> &[u8] {
        &self.uint8[self.x0..self.x]
    }

    /// Discards everything written since the last flush.
    pub fn reset(&mut self) {
        self.x = self.x0;
    }

    /// Returns the written data and advances the flush position.
    pub fn flush(&mut self) -> Vec<u8> {
        let result = self.uint8[self.x0..self.x].to_vec();
        self.x0 = self.x;
        result
    }

    #[inline]
    pub fn u8(&mut self, val: u8) {
        self.ensure_capacity(1);
        self.uint8[self.x] = val;
        self.x += 1;
    }

    #[inline]
    pub fn u16(&mut self, val: u16) {
        self.put(&val.to_be_bytes());
    }

    #[inline]
    pub fn u32(&mut self, val: u32) {
        self.put(&val.to_be_bytes());
    }

    #[inline]
    pub fn i32(&mut self, val: i32) {
        self.put(&val.to_be_bytes());
    }

    #[inline]
    pub fn u64(&mut self, val: u64) {
        self.put(&val.to_be_bytes());
    }

    #[inline]
    pub fn i64(&mut self, val: i64) {
        self.put(&val.to_be_bytes());
    }

    #[inline]
    pub fn f32(&mut self, val: f32) {
        self.put(&val.to_be_bytes());
    }

    /// Writes a tag byte followed by a u32.
    pub fn u8u32(&mut self, tag: u8, val: u32) {
        self.ensure_capacity(5);
        self.uint8[self.x] = tag;
        self.uint8[self.x + 1..self.x + 5].copy_from_slice(&val.to_be_bytes());
        self.x += 5;
    }

    /// Writes a raw byte slice.
    pub fn buf(&mut self, buf: &[u8]) {
        self.put(buf);
    }

    /// Writes a u32 length followed by the bytes. Lengths are clamped to
    /// `u32::MAX`; longer inputs are truncated.
    pub fn bytes32(&mut self, buf: &[u8]) {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        self.u32(len);
        self.put(&buf[..len as usize]);
    }

    /// Writes a u32 byte length followed by the UTF-8 bytes of `s`.
    pub fn str32(&mut self, s: &str) {
        self.bytes32(s.as_bytes());
    }

    fn put(&mut self, bytes: &[u8]) {
        let length = bytes.len();
        self.ensure_capacity(length);
        self.uint8[self.x..self.x + length].copy_from_slice(bytes);
        self.x += length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_big_endian() {
        let mut writer = Writer::new();
        writer.u32(0x01020304);
        writer.i32(-2);
        assert_eq!(writer.flush(), [1, 2, 3, 4, 0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn grows_past_initial_allocation() {
        let mut writer = Writer::with_alloc_size(2);
        for i in 0..100u8 {
            writer.u8(i);
        }
        let data = writer.flush();
        assert_eq!(data.len(), 100);
        assert_eq!(data[99], 99);
    }

    #[test]
    fn flush_only_returns_new_bytes() {
        let mut writer = Writer::new();
        writer.u8(1);
        assert_eq!(writer.flush(), [1]);
        writer.u8(2);
        assert_eq!(writer.flush(), [2]);
    }

    #[test]
    fn str32_prefixes_byte_length() {
        let mut writer = Writer::new();
        writer.str32("café");
        let data = writer.flush();
        assert_eq!(&data[..4], &[0, 0, 0, 5]);
        assert_eq!(std::str::from_utf8(&data[4..]).unwrap(), "café");
    }

    #[test]
    fn reset_discards_unflushed() {
        let mut writer = Writer::new();
        writer.u8(7);
        writer.flush();
        writer.u8(8);
        writer.reset();
        assert!(writer.is_empty());
        writer.u8(9);
        assert_eq!(writer.flush(), [9]);
    }
}
