//! `JsonDeserializer`, a two-pass reader over JSON text.
//!
//! The first pass scans the text once for structural characters
//! (`{ } [ ] , :`), skipping over quoted runs and escapes, and records a flat
//! list of pointers. Each pointer carries its byte span and the nesting depth
//! it was found at. A `Value` pointer covers the non-blank span between two
//! structural characters and sits one level deeper than the key or array it
//! belongs to.
//!
//! The second pass walks a cursor over the pointers. Value text is
//! materialized on first use and cached on the pointer. `read_key`,
//! `read_object` and `read_array` push the depth they opened; the matching
//! `pop_*` scans forward for the next pointer at that depth, which skips
//! anything the caller did not read.
//!
//! Bracket balance is not validated: malformed text yields odd pointers,
//! never a panic.

use datatree_core::Deserializer;
use tracing::trace;

use crate::writer::ESCAPES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Key,
    Value,
    OpenObject,
    CloseObject,
    OpenArray,
    CloseArray,
    Comma,
}

#[derive(Debug, Clone)]
struct Pointer {
    token: Token,
    start: usize,
    end: usize,
    depth: usize,
    text: Option<String>,
}

impl Pointer {
    fn new(token: Token, start: usize, end: usize, depth: usize) -> Self {
        Self {
            token,
            start,
            end,
            depth,
            text: None,
        }
    }
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_quote(byte: u8) -> bool {
    byte == b'"' || byte == b'\''
}

fn is_structural(byte: u8) -> bool {
    matches!(byte, b'{' | b'}' | b'[' | b']' | b',' | b':')
}

/// Position of the next structural byte outside quotes, starting at `from`.
fn find_structural(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for (i, &byte) in bytes.iter().enumerate().skip(from) {
        if escaped {
            escaped = false;
            continue;
        }
        if byte == b'\\' {
            escaped = true;
            continue;
        }
        match quote {
            Some(open) if open == byte => quote = None,
            Some(_) => {}
            None if is_quote(byte) => quote = Some(byte),
            None if is_structural(byte) => return Some(i),
            None => {}
        }
    }
    None
}

fn tokenize(source: &str) -> Vec<Pointer> {
    let bytes = source.as_bytes();
    let mut pointers = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    while let Some(index) = find_structural(bytes, start) {
        let byte = bytes[index];
        if matches!(byte, b'}' | b']' | b',') && !bytes[start..index].iter().all(|&b| is_space(b)) {
            pointers.push(Pointer::new(Token::Value, start, index, depth + 1));
        }
        match byte {
            b'{' => {
                depth += 1;
                pointers.push(Pointer::new(Token::OpenObject, index, index + 1, depth));
            }
            b'}' => {
                pointers.push(Pointer::new(Token::CloseObject, index, index + 1, depth));
                depth = depth.saturating_sub(1);
            }
            b'[' => {
                depth += 1;
                pointers.push(Pointer::new(Token::OpenArray, index, index + 1, depth));
            }
            b']' => {
                pointers.push(Pointer::new(Token::CloseArray, index, index + 1, depth));
                depth = depth.saturating_sub(1);
            }
            b':' => pointers.push(Pointer::new(Token::Key, start, index, depth)),
            _ => pointers.push(Pointer::new(Token::Comma, index, index + 1, depth)),
        }
        start = index + 1;
    }
    pointers
}

/// Trims blanks and one matching pair of quotes, then unescapes.
fn materialize(source: &str, start: usize, end: usize) -> String {
    let raw = source.get(start..end).unwrap_or_default();
    let mut text = raw.trim_matches(|c: char| c.is_ascii() && is_space(c as u8));
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] && is_quote(bytes[0]) {
        text = &text[1..text.len() - 1];
    }
    unescape(text)
}

fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            match ESCAPES.iter().find(|(_, letter)| char::from(*letter) == c) {
                Some(&(raw, _)) => result.push(char::from(raw)),
                None => {
                    result.push('\\');
                    result.push(c);
                }
            }
        } else if c == '\\' {
            escaped = true;
        } else {
            result.push(c);
        }
    }
    if escaped {
        result.push('\\');
    }
    result
}

/// Digits with an optional sign, fraction and exponent.
fn is_numeric(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(at) => (&body[..at], Some(&body[at + 1..])),
        None => (body, None),
    };
    let mut parts = mantissa.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits(whole) || !digits(fraction) {
        return false;
    }
    match exponent {
        Some(exp) => {
            let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            !exp.is_empty() && digits(exp)
        }
        None => true,
    }
}

/// Integer text, or numeric text truncated toward zero when it fits.
fn parse_integer(text: &str) -> Option<i64> {
    if !is_numeric(text) {
        return None;
    }
    text.parse::<i64>().ok().or_else(|| {
        let value = text.parse::<f64>().ok()?.trunc();
        (value >= i64::MIN as f64 && value < i64::MAX as f64).then_some(value as i64)
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else if is_numeric(text) {
        text.parse::<f64>().ok().map(|value| value != 0.0)
    } else {
        None
    }
}

pub struct JsonDeserializer<'a> {
    source: &'a str,
    pointers: Vec<Pointer>,
    cursor: usize,
    depths: Vec<usize>,
}

impl<'a> JsonDeserializer<'a> {
    pub fn new(source: &'a str) -> Self {
        let pointers = tokenize(source);
        trace!(bytes = source.len(), pointers = pointers.len(), "tokenized json");
        Self {
            source,
            pointers,
            cursor: 0,
            depths: Vec::new(),
        }
    }

    /// Token under the cursor.
    pub fn peek(&self) -> Option<Token> {
        self.pointers.get(self.cursor).map(|pointer| pointer.token)
    }

    /// Every pointer's token, in text order.
    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.pointers.iter().map(|pointer| pointer.token)
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    fn skip_comma(&mut self) {
        if self.peek() == Some(Token::Comma) {
            self.cursor += 1;
        }
    }

    fn text_at(&mut self, index: usize) -> Option<&str> {
        let source = self.source;
        let pointer = self.pointers.get_mut(index)?;
        if pointer.text.is_none() {
            pointer.text = Some(materialize(source, pointer.start, pointer.end));
        }
        pointer.text.as_deref()
    }

    /// Steps past the pointer under the cursor. Its text stays cached.
    fn consume(&mut self) -> Option<String> {
        let text = self.pointers.get(self.cursor).and_then(|pointer| pointer.text.clone());
        self.cursor += 1;
        text
    }

    /// Parses the value under the cursor, consuming it only on success.
    fn read_scalar<T>(&mut self, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        self.skip_comma();
        if self.peek() != Some(Token::Value) {
            return None;
        }
        let index = self.cursor;
        let value = parse(self.text_at(index)?)?;
        self.consume();
        Some(value)
    }

    fn open(&mut self, token: Token) -> bool {
        self.skip_comma();
        match self.pointers.get(self.cursor) {
            Some(pointer) if pointer.token == token => {
                self.depths.push(pointer.depth);
                self.cursor += 1;
                true
            }
            _ => false,
        }
    }

    /// Moves the cursor to the first pointer at or after it matching `hit`,
    /// plus `offset`. Runs off the end when nothing matches.
    fn seek(&mut self, offset: usize, hit: impl Fn(&Pointer) -> bool) {
        self.cursor = match self.pointers.iter().skip(self.cursor).position(hit) {
            Some(found) => self.cursor + found + offset,
            None => self.pointers.len(),
        };
    }

    fn close(&mut self, token: Token) {
        if let Some(depth) = self.depths.pop() {
            self.seek(1, |pointer| pointer.token == token && pointer.depth == depth);
        }
    }
}

impl Deserializer for JsonDeserializer<'_> {
    fn read_key(&mut self) -> Option<String> {
        self.skip_comma();
        let pointer = self.pointers.get(self.cursor)?;
        if pointer.token != Token::Key {
            return None;
        }
        let depth = pointer.depth;
        let index = self.cursor;
        self.text_at(index)?;
        self.depths.push(depth);
        self.consume()
    }

    fn read_index(&mut self) -> bool {
        self.skip_comma();
        !matches!(self.peek(), None | Some(Token::CloseArray) | Some(Token::CloseObject))
    }

    fn read_array(&mut self) -> bool {
        self.open(Token::OpenArray)
    }

    fn read_object(&mut self) -> bool {
        self.open(Token::OpenObject)
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.read_scalar(|text| parse_integer(text).and_then(|value| i32::try_from(value).ok()))
    }

    fn read_i64(&mut self) -> Option<i64> {
        self.read_scalar(parse_integer)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_scalar(|text| parse_integer(text).and_then(|value| u8::try_from(value).ok()))
    }

    fn read_f32(&mut self) -> Option<f32> {
        self.read_scalar(|text| if is_numeric(text) { text.parse::<f32>().ok() } else { None })
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_scalar(parse_bool)
    }

    fn read_string(&mut self) -> Option<String> {
        self.skip_comma();
        if self.peek() != Some(Token::Value) {
            return None;
        }
        let index = self.cursor;
        self.text_at(index)?;
        self.consume()
    }

    fn read_null(&mut self) -> bool {
        self.read_scalar(|text| text.eq_ignore_ascii_case("null").then_some(())).is_some()
    }

    fn pop_key(&mut self) {
        if let Some(depth) = self.depths.pop() {
            self.seek(0, |pointer| pointer.depth == depth);
        }
    }

    /// Skips an element the caller failed to read. A key at element level
    /// is malformed and stepped over so the array loop always advances.
    fn pop_index(&mut self) {
        if let Some(&depth) = self.depths.last() {
            self.seek(0, |pointer| pointer.depth == depth);
            if self.peek() == Some(Token::Key) {
                self.cursor += 1;
            }
        }
    }

    fn pop_array(&mut self) {
        self.close(Token::CloseArray);
    }

    fn pop_object(&mut self) {
        self.close(Token::CloseObject);
    }
}
