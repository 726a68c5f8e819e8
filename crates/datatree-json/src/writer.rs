//! `JsonSerializer`, appends JSON text straight into a [`Writer`] buffer.
//!
//! Separators are tracked per nesting depth: the first value written at a
//! depth arms the slot, every later one is preceded by a comma. Closing a
//! level clears its slot. Strings are escaped only for `\\ \n \r \t \"`;
//! everything else, non-ASCII included, is copied through.

use std::string::FromUtf8Error;

use datatree_buffers::Writer;
use datatree_core::{JsonConfig, Serializer};

/// Byte to escape and the letter written after the backslash.
pub(crate) const ESCAPES: [(u8, u8); 5] = [
    (b'\\', b'\\'),
    (b'\n', b'n'),
    (b'\r', b'r'),
    (b'\t', b't'),
    (b'"', b'"'),
];

pub struct JsonSerializer {
    pub writer: Writer,
    pretty: bool,
    depth: usize,
    separators: Vec<bool>,
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(),
            pretty: false,
            depth: 0,
            separators: Vec::new(),
        }
    }

    pub fn with_config(config: &JsonConfig) -> Self {
        let mut serializer = Self::new();
        serializer.pretty = config.pretty;
        serializer
    }

    /// Newline and one tab per depth before keys and elements, a space after `:`.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Takes the text written so far.
    pub fn finish(&mut self) -> Result<String, FromUtf8Error> {
        self.depth = 0;
        self.separators.clear();
        String::from_utf8(self.writer.flush())
    }

    fn separate(&mut self) {
        if self.separators.len() <= self.depth {
            self.separators.resize(self.depth + 1, false);
        }
        if std::mem::replace(&mut self.separators[self.depth], true) {
            self.writer.u8(b',');
        }
    }

    fn indent(&mut self) {
        if self.pretty {
            self.writer.u8(b'\n');
            for _ in 0..self.depth {
                self.writer.u8(b'\t');
            }
        }
    }

    fn begin_value(&mut self) {
        if self.writer.as_slice().last() == Some(&b':') {
            if self.pretty {
                self.writer.u8(b' ');
            }
            return;
        }
        self.separate();
        if self.depth > 0 {
            self.indent();
        }
    }

    fn open(&mut self, bracket: u8) {
        self.begin_value();
        self.depth += 1;
        self.writer.u8(bracket);
    }

    fn close(&mut self, bracket: u8) {
        let had_content = self.separators.get(self.depth).copied().unwrap_or(false);
        self.separators.truncate(self.depth);
        self.depth = self.depth.saturating_sub(1);
        if had_content {
            self.indent();
        }
        self.writer.u8(bracket);
    }

    fn write_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.writer.ensure_capacity(bytes.len() + 2);
        self.writer.u8(b'"');
        let mut run = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            if let Some(&(_, letter)) = ESCAPES.iter().find(|(raw, _)| *raw == byte) {
                self.writer.buf(&bytes[run..i]);
                self.writer.u8(b'\\');
                self.writer.u8(letter);
                run = i + 1;
            }
        }
        self.writer.buf(&bytes[run..]);
        self.writer.u8(b'"');
    }

    fn write_ascii(&mut self, text: &str) {
        self.begin_value();
        self.writer.buf(text.as_bytes());
    }
}

impl Serializer for JsonSerializer {
    fn write_key(&mut self, key: &str) {
        self.separate();
        self.indent();
        self.write_str(key);
        self.writer.u8(b':');
    }

    fn write_array(&mut self, _len: usize) {
        self.open(b'[');
    }

    fn write_object(&mut self) {
        self.open(b'{');
    }

    fn write_i32(&mut self, value: i32) {
        self.write_ascii(&value.to_string());
    }

    fn write_i64(&mut self, value: i64) {
        self.write_ascii(&value.to_string());
    }

    fn write_u8(&mut self, value: u8) {
        self.write_ascii(&value.to_string());
    }

    /// Shortest text that parses back to the same `f32`. Non-finite values
    /// have no JSON form and are written as `null`.
    fn write_f32(&mut self, value: f32) {
        if value.is_finite() {
            self.write_ascii(&value.to_string());
        } else {
            self.write_null();
        }
    }

    fn write_bool(&mut self, value: bool) {
        self.begin_value();
        if value {
            self.writer.u32(0x74727565); // "true"
        } else {
            self.writer.u8(0x66);
            self.writer.u32(0x616c7365); // "false"
        }
    }

    fn write_string(&mut self, value: &str) {
        self.begin_value();
        self.write_str(value);
    }

    fn write_null(&mut self) {
        self.begin_value();
        self.writer.u32(0x6e756c6c); // "null"
    }

    fn pop_key(&mut self) {}

    fn pop_array(&mut self) {
        self.close(b']');
    }

    fn pop_object(&mut self) {
        self.close(b'}');
    }
}
