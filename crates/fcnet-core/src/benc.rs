//! Bencode codec for configuration and admin messages.
//!
//! Every document exchanged with the supervisor is a bencoded value:
//!
//! | Kind | Encoding | Example |
//! |------|----------|---------|
//! | Byte string | `<len>:<bytes>` | `4:spam` |
//! | Integer | `i<decimal>e` | `i-42e` |
//! | List | `l<values>e` | `l4:spami7ee` |
//! | Dictionary | `d<key><value>...e` | `d1:q4:pinge` |
//!
//! Dictionaries are stored in a [`BTreeMap`], so encoding always emits keys
//! in ascending byte order and two peers agree on the exact wire bytes.
//! Decoding tolerates unsorted keys but rejects duplicates.
//!
//! Decoding never panics: all malformed input is reported as a
//! [`DecodeError`]. Stream framing is separate from decoding: [`frame`] and
//! [`Scanner`] only follow the structure to find where a document ends, so
//! one bad document does not take the rest of the stream with it.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Maximum nesting of lists and dictionaries accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

/// Longest accepted length prefix, in digits.
const MAX_LENGTH_DIGITS: usize = 10;

/// Decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before the value was complete
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    /// Malformed byte-string length prefix
    #[error("invalid length prefix at offset {0}")]
    InvalidLength(usize),

    /// Malformed integer
    #[error("invalid integer at offset {0}")]
    InvalidInteger(usize),

    /// Byte that cannot start a value
    #[error("unexpected byte 0x{byte:02x} at offset {offset}")]
    UnexpectedByte {
        /// Offending byte
        byte: u8,
        /// Position in the input
        offset: usize,
    },

    /// Dictionary key is not a byte string
    #[error("dictionary key at offset {0} is not a string")]
    NonStringKey(usize),

    /// Dictionary key appears twice
    #[error("duplicate dictionary key at offset {0}")]
    DuplicateKey(usize),

    /// Nesting exceeds [`MAX_DEPTH`]
    #[error("nesting deeper than {MAX_DEPTH} at offset {0}")]
    TooDeep(usize),

    /// Bytes left over after a complete value
    #[error("trailing data at offset {0}")]
    TrailingData(usize),

    /// Top-level value is not a dictionary
    #[error("top-level value is not a dictionary")]
    NotADictionary,
}

impl DecodeError {
    /// Returns true if more input could turn this into a successful decode.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::UnexpectedEof(_))
    }
}

/// A decoded bencode value.
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    /// Byte string (not necessarily UTF-8)
    Bytes(Vec<u8>),
    /// Signed integer
    Int(i64),
    /// List of values
    List(Vec<Value>),
    /// Dictionary with byte-string keys
    Dict(Dict),
}

impl Value {
    /// Byte-string contents, if this is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte-string contents as UTF-8, if this is a valid UTF-8 byte string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Integer value, if this is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// List contents, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Dictionary, if this is a dictionary.
    #[must_use]
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "{s:?}"),
                Err(_) => write!(f, "0x{}", hex::encode(b)),
            },
            Value::Int(i) => write!(f, "{i}"),
            Value::List(l) => f.debug_list().entries(l).finish(),
            Value::Dict(d) => d.fmt(f),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(i64::from(b))
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Self {
        Value::Dict(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

/// Ordered dictionary with byte-string keys.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Dict(BTreeMap<Vec<u8>, Value>);

impl Dict {
    /// Create an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<Vec<u8>>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove a key.
    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.0.remove(key)
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a byte-string value.
    #[must_use]
    pub fn get_bytes(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_bytes)
    }

    /// Look up a UTF-8 string value.
    #[must_use]
    pub fn get_str(&self, key: &[u8]) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Look up an integer value.
    #[must_use]
    pub fn get_int(&self, key: &[u8]) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    /// Look up a list value.
    #[must_use]
    pub fn get_list(&self, key: &[u8]) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_list)
    }

    /// Look up a nested dictionary.
    #[must_use]
    pub fn get_dict(&self, key: &[u8]) -> Option<&Dict> {
        self.get(key).and_then(Value::as_dict)
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the dictionary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Value)> {
        self.0.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// Encode this dictionary.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_dict_into(self, &mut out);
        out
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.0 {
            map.entry(&String::from_utf8_lossy(k), v);
        }
        map.finish()
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a value.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Encode a value, appending to `out`.
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bytes(b) => encode_bytes(b, out),
        Value::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::List(l) => {
            out.push(b'l');
            for v in l {
                encode_into(v, out);
            }
            out.push(b'e');
        }
        Value::Dict(d) => encode_dict_into(d, out),
    }
}

fn encode_bytes(b: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(b.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(b);
}

fn encode_dict_into(d: &Dict, out: &mut Vec<u8>) {
    out.push(b'd');
    for (k, v) in &d.0 {
        encode_bytes(k, out);
        encode_into(v, out);
    }
    out.push(b'e');
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode exactly one value; trailing bytes are an error.
///
/// # Errors
///
/// Returns a [`DecodeError`] for malformed, truncated or over-long input.
pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    let (value, used) = decode_prefix(input)?;
    if used != input.len() {
        return Err(DecodeError::TrailingData(used));
    }
    Ok(value)
}

/// Decode exactly one dictionary.
///
/// # Errors
///
/// As [`decode`], plus [`DecodeError::NotADictionary`] if the value is not a
/// dictionary.
pub fn decode_dict(input: &[u8]) -> Result<Dict, DecodeError> {
    match decode(input)? {
        Value::Dict(d) => Ok(d),
        _ => Err(DecodeError::NotADictionary),
    }
}

/// Decode the first value in `input`, returning it and the number of bytes used.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the leading value is malformed or truncated.
pub fn decode_prefix(input: &[u8]) -> Result<(Value, usize), DecodeError> {
    let mut decoder = Decoder { input, pos: 0 };
    let value = decoder.value(0)?;
    Ok((value, decoder.pos))
}

/// Result of checking whether a buffer holds a complete document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// More bytes are needed
    Incomplete,
    /// A document occupies the first `n` bytes
    Complete(usize),
    /// The buffer can never become a valid document
    Invalid,
}

/// Classify a stream buffer for framing.
///
/// Only the document's structure is checked. A document with well-formed
/// structure but bad content (duplicate keys, `i01e`) is still reported as
/// [`FrameStatus::Complete`] so it can be rejected on its own without losing
/// what follows it.
#[must_use]
pub fn frame(buf: &[u8]) -> FrameStatus {
    let mut scanner = Scanner::new();
    match scanner.feed(buf) {
        Scan::Complete(used) => FrameStatus::Complete(used),
        Scan::Partial => FrameStatus::Incomplete,
        Scan::Invalid => FrameStatus::Invalid,
    }
}

/// Progress reported by [`Scanner::feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// The document ended after this many bytes of the last chunk
    Complete(usize),
    /// Every byte was consumed and the document is still open
    Partial,
    /// The structure is broken; the end of the document cannot be found
    Invalid,
}

#[derive(Debug, Clone, Copy)]
enum Container {
    List,
    Dict { expect_key: bool },
}

#[derive(Debug, Clone, Copy, Default)]
enum Token {
    #[default]
    Value,
    Int { first: bool },
    Length { digits: usize, len: usize },
    Body(usize),
}

/// Incremental structural scanner.
///
/// Tracks where one document ends across any number of chunks without
/// keeping the chunks, so an over-long document can be skipped as it
/// streams past.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    open: Vec<Container>,
    token: Token,
}

impl Scanner {
    /// Scanner positioned at the start of a document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next chunk of the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Scan {
        let mut pos = 0;
        while pos < chunk.len() {
            if let Token::Body(remaining) = self.token {
                let take = remaining.min(chunk.len() - pos);
                pos += take;
                if take < remaining {
                    self.token = Token::Body(remaining - take);
                    continue;
                }
                self.token = Token::Value;
                if self.value_done() {
                    return Scan::Complete(pos);
                }
                continue;
            }

            let byte = chunk[pos];
            pos += 1;
            match self.step(byte) {
                Some(true) => return Scan::Complete(pos),
                Some(false) => {}
                None => return Scan::Invalid,
            }
        }
        Scan::Partial
    }

    /// Returns `Some(true)` when the top-level value ended on `byte`.
    fn step(&mut self, byte: u8) -> Option<bool> {
        match self.token {
            Token::Value => self.start(byte),
            Token::Int { first } => match byte {
                b'-' if first => {
                    self.token = Token::Int { first: false };
                    Some(false)
                }
                b'0'..=b'9' => {
                    self.token = Token::Int { first: false };
                    Some(false)
                }
                b'e' => {
                    self.token = Token::Value;
                    Some(self.value_done())
                }
                _ => None,
            },
            Token::Length { digits, len } => match byte {
                b'0'..=b'9' => {
                    if digits >= MAX_LENGTH_DIGITS {
                        return None;
                    }
                    let len = len.checked_mul(10)?.checked_add(usize::from(byte - b'0'))?;
                    self.token = Token::Length {
                        digits: digits + 1,
                        len,
                    };
                    Some(false)
                }
                b':' if len == 0 => {
                    self.token = Token::Value;
                    Some(self.value_done())
                }
                b':' => {
                    self.token = Token::Body(len);
                    Some(false)
                }
                _ => None,
            },
            // Body bytes are consumed in bulk by `feed`.
            Token::Body(_) => Some(false),
        }
    }

    fn start(&mut self, byte: u8) -> Option<bool> {
        let expect_key = match self.open.last() {
            Some(Container::Dict { expect_key }) => Some(*expect_key),
            _ => None,
        };
        match byte {
            b'0'..=b'9' => {
                self.token = Token::Length {
                    digits: 1,
                    len: usize::from(byte - b'0'),
                };
                Some(false)
            }
            b'e' if !self.open.is_empty() && expect_key != Some(false) => {
                self.open.pop();
                Some(self.value_done())
            }
            _ if expect_key == Some(true) => None,
            b'i' => {
                self.token = Token::Int { first: true };
                Some(false)
            }
            b'l' | b'd' if self.open.len() < MAX_DEPTH => {
                self.open.push(if byte == b'l' {
                    Container::List
                } else {
                    Container::Dict { expect_key: true }
                });
                Some(false)
            }
            _ => None,
        }
    }

    /// Record that a value finished; true if it was the top-level one.
    fn value_done(&mut self) -> bool {
        match self.open.last_mut() {
            None => true,
            Some(Container::List) => false,
            Some(Container::Dict { expect_key }) => {
                *expect_key = !*expect_key;
                false
            }
        }
    }
}

/// Best-effort lookup of a top-level byte-string field.
///
/// Walks the leading dictionary entry by entry and stops at the first
/// entry that fails to decode, so a field can still be recovered from a
/// document that [`decode_dict`] rejects.
#[must_use]
pub fn find_bytes(input: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = Decoder { input, pos: 0 };
    if decoder.peek().ok()? != b'd' {
        return None;
    }
    decoder.pos += 1;

    loop {
        match decoder.peek().ok()? {
            b'0'..=b'9' => {}
            _ => return None,
        }
        let name = decoder.bytes().ok()?;
        let value = decoder.value(1).ok()?;
        if name == key {
            return match value {
                Value::Bytes(bytes) => Some(bytes),
                _ => None,
            };
        }
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn peek(&self) -> Result<u8, DecodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof(self.pos))
    }

    fn value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        match self.peek()? {
            b'i' => self.int().map(Value::Int),
            b'0'..=b'9' => self.bytes().map(Value::Bytes),
            b'l' => {
                self.enter(depth)?;
                let mut list = Vec::new();
                while self.peek()? != b'e' {
                    list.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(list))
            }
            b'd' => {
                self.enter(depth)?;
                let mut dict = BTreeMap::new();
                loop {
                    let key_at = self.pos;
                    match self.peek()? {
                        b'e' => break,
                        b'0'..=b'9' => {}
                        _ => return Err(DecodeError::NonStringKey(key_at)),
                    }
                    let key = self.bytes()?;
                    let value = self.value(depth + 1)?;
                    if dict.insert(key, value).is_some() {
                        return Err(DecodeError::DuplicateKey(key_at));
                    }
                }
                self.pos += 1;
                Ok(Value::Dict(Dict(dict)))
            }
            byte => Err(DecodeError::UnexpectedByte {
                byte,
                offset: self.pos,
            }),
        }
    }

    fn enter(&mut self, depth: usize) -> Result<(), DecodeError> {
        if depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep(self.pos));
        }
        self.pos += 1;
        Ok(())
    }

    fn int(&mut self) -> Result<i64, DecodeError> {
        let start = self.pos;
        self.pos += 1;

        let digits_at = self.pos;
        let negative = self.peek()? == b'-';
        if negative {
            self.pos += 1;
        }

        let first_digit = self.pos;
        loop {
            match self.peek()? {
                b'0'..=b'9' => self.pos += 1,
                b'e' => break,
                _ => return Err(DecodeError::InvalidInteger(start)),
            }
        }

        let digits = &self.input[first_digit..self.pos];
        let leading_zero = digits.len() > 1 && digits[0] == b'0';
        let negative_zero = negative && digits == b"0";
        if digits.is_empty() || leading_zero || negative_zero {
            return Err(DecodeError::InvalidInteger(start));
        }

        // Digits and sign are ASCII, so this is valid UTF-8.
        let text = std::str::from_utf8(&self.input[digits_at..self.pos])
            .map_err(|_| DecodeError::InvalidInteger(start))?;
        let value = text
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidInteger(start))?;

        self.pos += 1;
        Ok(value)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        let mut len: usize = 0;
        loop {
            match self.peek()? {
                c @ b'0'..=b'9' => {
                    if self.pos - start >= MAX_LENGTH_DIGITS {
                        return Err(DecodeError::InvalidLength(start));
                    }
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(usize::from(c - b'0')))
                        .ok_or(DecodeError::InvalidLength(start))?;
                    self.pos += 1;
                }
                b':' => break,
                _ => return Err(DecodeError::InvalidLength(start)),
            }
        }

        let digits = self.pos - start;
        if digits > 1 && self.input[start] == b'0' {
            return Err(DecodeError::InvalidLength(start));
        }
        self.pos += 1;

        let end = self
            .pos
            .checked_add(len)
            .ok_or(DecodeError::InvalidLength(start))?;
        if end > self.input.len() {
            return Err(DecodeError::UnexpectedEof(self.input.len()));
        }

        let bytes = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }
}
