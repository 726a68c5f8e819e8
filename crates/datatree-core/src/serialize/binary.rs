//! Token-tagged binary codec.
//!
//! | token | payload |
//! |---|---|
//! | `{` ... `}` | object; mappings carry `n` + u32 entry count after `{` |
//! | `[` ... `]` | sequence, u32 length after `[` |
//! | `#` | u32 field hash |
//! | `$` | string map key |
//! | `A` `F` `H` `I` | u8, i32, i64, f32 |
//! | `b` | bool as u8 |
//! | `c` `d` | string, name |
//! | `a` | null |
//!
//! Strings are a u32 byte length followed by UTF-8. Everything is
//! big-endian. Field keys are hashes, so field order in the input does not
//! matter and fields may be renamed without breaking stored data.

use datatree_buffers::{Reader, Writer};
use tracing::warn;

use crate::config::BinaryConfig;
use crate::error::DataError;
use crate::schema::Field;
use crate::serialize::{Deserializer, FieldKey, Serializer};
use crate::tree::{DataTree, NodeId};

pub(crate) const OBJECT_BEGIN: u8 = b'{';
pub(crate) const OBJECT_END: u8 = b'}';
pub(crate) const ARRAY_BEGIN: u8 = b'[';
pub(crate) const ARRAY_END: u8 = b']';
pub(crate) const FIELD_KEY: u8 = b'#';
pub(crate) const MAP_KEY: u8 = b'$';
pub(crate) const MAP_COUNT: u8 = b'n';
pub(crate) const UINT8: u8 = b'A';
pub(crate) const INT32: u8 = b'F';
pub(crate) const INT64: u8 = b'H';
pub(crate) const FLOAT: u8 = b'I';
pub(crate) const BOOL: u8 = b'b';
pub(crate) const STRING: u8 = b'c';
pub(crate) const NAME: u8 = b'd';
pub(crate) const NULL: u8 = b'a';

#[derive(Default)]
pub struct BinarySerializer {
    writer: Writer,
    write_defaults: bool,
}

impl BinarySerializer {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(),
            write_defaults: true,
        }
    }

    pub fn with_config(config: &BinaryConfig) -> Self {
        Self {
            writer: Writer::new(),
            write_defaults: config.write_defaults,
        }
    }

    /// Omits fields holding their type default.
    pub fn skip_defaults(mut self) -> Self {
        self.write_defaults = false;
        self
    }

    /// Bytes written since the last call.
    pub fn finish(&mut self) -> Vec<u8> {
        self.writer.flush()
    }
}

impl Serializer for BinarySerializer {
    fn write_key(&mut self, key: &str) {
        self.writer.u8(MAP_KEY);
        self.writer.str32(key);
    }

    fn write_field_key(&mut self, field: &Field) {
        self.writer.u8u32(FIELD_KEY, field.hash());
    }

    fn write_array(&mut self, len: usize) {
        self.writer.u8u32(ARRAY_BEGIN, u32::try_from(len).unwrap_or(u32::MAX));
    }

    fn write_object(&mut self) {
        self.writer.u8(OBJECT_BEGIN);
    }

    fn write_map(&mut self, len: usize) {
        self.writer.u8(OBJECT_BEGIN);
        self.writer.u8u32(MAP_COUNT, u32::try_from(len).unwrap_or(u32::MAX));
    }

    fn write_i32(&mut self, value: i32) {
        self.writer.u8(INT32);
        self.writer.i32(value);
    }

    fn write_i64(&mut self, value: i64) {
        self.writer.u8(INT64);
        self.writer.i64(value);
    }

    fn write_u8(&mut self, value: u8) {
        self.writer.u8(UINT8);
        self.writer.u8(value);
    }

    fn write_f32(&mut self, value: f32) {
        self.writer.u8(FLOAT);
        self.writer.f32(value);
    }

    fn write_bool(&mut self, value: bool) {
        self.writer.u8(BOOL);
        self.writer.u8(u8::from(value));
    }

    fn write_string(&mut self, value: &str) {
        self.writer.u8(STRING);
        self.writer.str32(value);
    }

    fn write_name(&mut self, value: &str) {
        self.writer.u8(NAME);
        self.writer.str32(value);
    }

    fn write_null(&mut self) {
        self.writer.u8(NULL);
    }

    fn pop_key(&mut self) {}

    fn pop_array(&mut self) {
        self.writer.u8(ARRAY_END);
    }

    fn pop_object(&mut self) {
        self.writer.u8(OBJECT_END);
    }

    fn writes_defaults(&self) -> bool {
        self.write_defaults
    }
}

/// Best-effort reader: a value that fails to read is skipped when its key
/// or index is popped, so the rest of the object still deserializes.
pub struct BinaryDeserializer<'a> {
    reader: Reader<'a>,
    /// Cursor positions right after each open key or index.
    marks: Vec<usize>,
}

impl<'a> BinaryDeserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(data),
            marks: Vec::new(),
        }
    }

    /// Unread bytes.
    pub fn remaining(&self) -> usize {
        self.reader.size()
    }

    fn peek(&self) -> Option<u8> {
        self.reader.peek().ok()
    }

    fn take(&mut self, token: u8) -> bool {
        if self.peek() == Some(token) {
            self.reader.x += 1;
            true
        } else {
            false
        }
    }

    /// Abandons the rest of the input.
    fn corrupt(&mut self, token: Option<u8>) {
        warn!(position = self.reader.x, ?token, "corrupt binary data, skipping remaining input");
        self.reader.x = self.reader.uint8.len();
    }

    fn skip_value(&mut self) {
        let token = match self.reader.u8() {
            Ok(token) => token,
            Err(_) => return,
        };
        let ok = match token {
            NULL => Ok(()),
            UINT8 | BOOL => self.reader.skip(1),
            INT32 | FLOAT => self.reader.skip(4),
            INT64 => self.reader.skip(8),
            STRING | NAME => self.reader.bytes32().map(|_| ()),
            ARRAY_BEGIN => self.reader.skip(4).map(|_| self.skip_until(ARRAY_END)),
            OBJECT_BEGIN => {
                if self.take(MAP_COUNT) {
                    self.reader.skip(4).map(|_| self.skip_until(OBJECT_END))
                } else {
                    Ok(self.skip_until(OBJECT_END))
                }
            }
            _ => {
                self.corrupt(Some(token));
                return;
            }
        };
        if ok.is_err() {
            self.corrupt(Some(token));
        }
    }

    /// Skips entries up to and including `end`.
    fn skip_until(&mut self, end: u8) {
        while let Some(token) = self.peek() {
            if token == end {
                self.reader.x += 1;
                return;
            }
            match token {
                FIELD_KEY => {
                    if self.reader.skip(5).is_err() {
                        self.corrupt(Some(token));
                    }
                }
                MAP_KEY => {
                    self.reader.x += 1;
                    if self.reader.str32().is_err() {
                        self.corrupt(Some(token));
                    }
                }
                _ => self.skip_value(),
            }
        }
    }

    fn pop_mark(&mut self) {
        if let Some(mark) = self.marks.pop() {
            if self.reader.x == mark && self.reader.has_data() {
                self.skip_value();
            }
        }
    }

    fn read_int(&mut self) -> Option<i64> {
        let start = self.reader.x;
        let value = match self.peek()? {
            UINT8 => {
                self.reader.x += 1;
                self.reader.u8().map(i64::from)
            }
            INT32 => {
                self.reader.x += 1;
                self.reader.i32().map(i64::from)
            }
            INT64 => {
                self.reader.x += 1;
                self.reader.i64()
            }
            _ => return None,
        };
        match value {
            Ok(value) => Some(value),
            Err(_) => {
                self.reader.x = start;
                None
            }
        }
    }

    fn read_text(&mut self, tokens: [u8; 2]) -> Option<String> {
        let token = self.peek()?;
        if !tokens.contains(&token) {
            return None;
        }
        let start = self.reader.x;
        self.reader.x += 1;
        match self.reader.str32() {
            Ok(text) => Some(text.to_string()),
            Err(_) => {
                self.reader.x = start;
                None
            }
        }
    }
}

impl Deserializer for BinaryDeserializer<'_> {
    fn read_key(&mut self) -> Option<String> {
        if self.peek()? != MAP_KEY {
            return None;
        }
        let start = self.reader.x;
        self.reader.x += 1;
        match self.reader.str32() {
            Ok(key) => {
                let key = key.to_string();
                self.marks.push(self.reader.x);
                Some(key)
            }
            Err(_) => {
                self.reader.x = start;
                self.corrupt(Some(MAP_KEY));
                None
            }
        }
    }

    fn read_field_key(&mut self) -> Option<FieldKey> {
        match self.peek()? {
            FIELD_KEY => {
                let start = self.reader.x;
                self.reader.x += 1;
                match self.reader.u32() {
                    Ok(hash) => {
                        self.marks.push(self.reader.x);
                        Some(FieldKey::Hash(hash))
                    }
                    Err(_) => {
                        self.reader.x = start;
                        self.corrupt(Some(FIELD_KEY));
                        None
                    }
                }
            }
            MAP_KEY => self.read_key().map(FieldKey::Name),
            _ => None,
        }
    }

    fn read_index(&mut self) -> bool {
        match self.peek() {
            Some(ARRAY_END) | None => false,
            Some(_) => {
                self.marks.push(self.reader.x);
                true
            }
        }
    }

    fn read_array(&mut self) -> bool {
        if self.peek() != Some(ARRAY_BEGIN) {
            return false;
        }
        if self.reader.skip(5).is_err() {
            self.corrupt(Some(ARRAY_BEGIN));
            return false;
        }
        true
    }

    fn read_object(&mut self) -> bool {
        if !self.take(OBJECT_BEGIN) {
            return false;
        }
        if self.take(MAP_COUNT) && self.reader.skip(4).is_err() {
            self.corrupt(Some(MAP_COUNT));
        }
        true
    }

    fn read_i32(&mut self) -> Option<i32> {
        let start = self.reader.x;
        let value = self.read_int()?;
        match i32::try_from(value) {
            Ok(value) => Some(value),
            Err(_) => {
                self.reader.x = start;
                None
            }
        }
    }

    fn read_i64(&mut self) -> Option<i64> {
        self.read_int()
    }

    fn read_u8(&mut self) -> Option<u8> {
        let start = self.reader.x;
        let value = self.read_int()?;
        match u8::try_from(value) {
            Ok(value) => Some(value),
            Err(_) => {
                self.reader.x = start;
                None
            }
        }
    }

    fn read_f32(&mut self) -> Option<f32> {
        if self.peek()? == FLOAT {
            let start = self.reader.x;
            self.reader.x += 1;
            match self.reader.f32() {
                Ok(value) => Some(value),
                Err(_) => {
                    self.reader.x = start;
                    None
                }
            }
        } else {
            self.read_int().map(|value| value as f32)
        }
    }

    fn read_bool(&mut self) -> Option<bool> {
        if self.peek()? != BOOL {
            return None;
        }
        let start = self.reader.x;
        self.reader.x += 1;
        match self.reader.u8() {
            Ok(value) => Some(value != 0),
            Err(_) => {
                self.reader.x = start;
                None
            }
        }
    }

    fn read_string(&mut self) -> Option<String> {
        self.read_text([STRING, NAME])
    }

    fn read_name(&mut self) -> Option<String> {
        self.read_text([NAME, STRING])
    }

    fn read_null(&mut self) -> bool {
        self.take(NULL)
    }

    fn pop_key(&mut self) {
        self.pop_mark();
    }

    fn pop_index(&mut self) {
        self.pop_mark();
    }

    fn pop_array(&mut self) {
        self.skip_until(ARRAY_END);
    }

    fn pop_object(&mut self) {
        self.skip_until(OBJECT_END);
    }
}

impl DataTree {
    /// Binary form of `node` per the tree's [`BinaryConfig`].
    pub fn to_binary(&self, node: NodeId) -> Result<Vec<u8>, DataError> {
        let mut serializer = BinarySerializer::with_config(&self.config().binary);
        self.serialize(node, &mut serializer)?;
        Ok(serializer.finish())
    }

    pub fn from_binary(&mut self, node: NodeId, data: &[u8], patch: bool) -> Result<(), DataError> {
        let mut deserializer = BinaryDeserializer::new(data);
        self.deserialize(node, &mut deserializer, patch)
    }
}
