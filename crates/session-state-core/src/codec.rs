//! Flat session wire format.
//!
//! A payload is a concatenation of `name|<value>` records, one per key, in
//! insertion order. Values use the conventional length-prefixed tagged
//! serialization:
//!
//! | value            | encoding                         |
//! |------------------|----------------------------------|
//! | null             | `N;`                             |
//! | bool             | `b:1;` / `b:0;`                  |
//! | integer          | `i:42;`                          |
//! | float            | `d:0.5;`                         |
//! | string           | `s:<byte length>:"<bytes>";`     |
//! | array / object   | `a:<count>:{<key><value>...}`    |
//!
//! Array keys are `i:<n>;` or `s:<len>:"<key>";`. An array whose keys are
//! exactly `i:0..count` decodes to a JSON array, anything else to an object.
//! Objects keyed `"0".."n-1"` in order keep string keys so they stay objects.
//! An empty object has no keys to tell it apart and decodes as `[]`.
//! Integers above `i64::MAX` are written and read as unsigned.

use std::fmt::Write as _;

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Live session content, in insertion order.
pub type Content = Map<String, Value>;

/// Maximum nesting of arrays accepted by the decoder.
pub const MAX_DEPTH: usize = 128;

/// Codec error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed session data at byte {pos}: {reason}")]
    Malformed { pos: usize, reason: &'static str },
    #[error("unsupported type tag {tag:?} at byte {pos}")]
    UnsupportedTag { pos: usize, tag: char },
    #[error("invalid UTF-8 in session data at byte {0}")]
    InvalidUtf8(usize),
    #[error("session data nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Encode content into the flat wire format.
///
/// Names containing `|` or starting with `!` cannot be represented and are
/// skipped.
#[must_use]
pub fn encode(content: &Content) -> String {
    let mut out = String::new();
    for (name, value) in content {
        if name.contains('|') || name.starts_with('!') {
            tracing::warn!(name, "Skipping session key that cannot be encoded");
            continue;
        }
        out.push_str(name);
        out.push('|');
        write_value(&mut out, value);
    }
    out
}

/// Decode a payload into fresh content.
///
/// # Errors
/// Returns error if the payload is malformed.
pub fn decode(input: impl AsRef<[u8]>) -> Result<Content, CodecError> {
    let mut content = Content::new();
    decode_into(input, &mut content)?;
    Ok(content)
}

/// Decode a payload and merge its records into existing content.
///
/// Existing keys not present in the payload are kept. Nothing is merged
/// if the payload is malformed.
///
/// # Errors
/// Returns error if the payload is malformed.
pub fn decode_into(input: impl AsRef<[u8]>, content: &mut Content) -> Result<(), CodecError> {
    let mut parser = Parser::new(input.as_ref());
    let mut records = Vec::new();
    while !parser.at_end() {
        if parser.peek() == Some(b'!') {
            // Undefined marker: a name without a value.
            parser.pos += 1;
            parser.until(b'|')?;
            continue;
        }
        let start = parser.pos;
        let name = parser.until(b'|')?;
        let name = utf8(name, start)?;
        let value = parser.value(0)?;
        records.push((name.to_string(), value));
    }
    content.extend(records);
    Ok(())
}

fn write_value(out: &mut String, value: &Value) {
    // Writing into a String cannot fail.
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(b) => {
            let _ = write!(out, "b:{};", u8::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let _ = write!(out, "i:{i};");
            } else if let Some(u) = n.as_u64() {
                let _ = write!(out, "i:{u};");
            } else if let Some(f) = n.as_f64() {
                let _ = write!(out, "d:{f};");
            }
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            let _ = write!(out, "a:{}:{{", items.len());
            for (i, item) in items.iter().enumerate() {
                let _ = write!(out, "i:{i};");
                write_value(out, item);
            }
            out.push('}');
        }
        Value::Object(map) => {
            // Keys `0..count` in order would read back as a list.
            let list_shaped = map.keys().enumerate().all(|(i, key)| {
                integer_key(key).and_then(|k| usize::try_from(k).ok()) == Some(i)
            });
            let _ = write!(out, "a:{}:{{", map.len());
            for (key, item) in map {
                match integer_key(key).filter(|_| !list_shaped) {
                    Some(i) => {
                        let _ = write!(out, "i:{i};");
                    }
                    None => write_string(out, key),
                }
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    let _ = write!(out, "s:{}:\"{s}\";", s.len());
}

/// Keys that look like canonical integers are stored as integer keys.
fn integer_key(key: &str) -> Option<i64> {
    key.parse::<i64>()
        .ok()
        .filter(|i| i.to_string() == key)
}

fn utf8(bytes: &[u8], pos: usize) -> Result<&str, CodecError> {
    std::str::from_utf8(bytes).map_err(|e| CodecError::InvalidUtf8(pos + e.valid_up_to()))
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

enum Key {
    Index(i64),
    Name(String),
}

impl<'a> Parser<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    const fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<u8, CodecError> {
        let byte = self.peek().ok_or(CodecError::Malformed {
            pos: self.pos,
            reason: "unexpected end of input",
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn consume(&mut self, expected: u8, reason: &'static str) -> Result<(), CodecError> {
        let pos = self.pos;
        if self.next()? == expected {
            Ok(())
        } else {
            Err(CodecError::Malformed { pos, reason })
        }
    }

    /// Consume up to and including `delimiter`, returning what came before it.
    fn until(&mut self, delimiter: u8) -> Result<&'a [u8], CodecError> {
        let start = self.pos;
        let offset = self.bytes[start..]
            .iter()
            .position(|b| *b == delimiter)
            .ok_or(CodecError::Malformed {
                pos: start,
                reason: "missing delimiter",
            })?;
        self.pos = start + offset + 1;
        Ok(&self.bytes[start..start + offset])
    }

    fn number<T: std::str::FromStr>(&mut self, delimiter: u8) -> Result<T, CodecError> {
        let start = self.pos;
        let text = self.until(delimiter)?;
        utf8(text, start)?
            .parse::<T>()
            .map_err(|_| CodecError::Malformed {
                pos: start,
                reason: "invalid number",
            })
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len: usize = self.number(b':')?;
        self.consume(b'"', "expected opening quote")?;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::Malformed {
                pos: start,
                reason: "string length exceeds input",
            })?;
        let text = utf8(&self.bytes[start..end], start)?.to_string();
        self.pos = end;
        self.consume(b'"', "expected closing quote")?;
        self.consume(b';', "expected `;`")?;
        Ok(text)
    }

    fn value(&mut self, depth: usize) -> Result<Value, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        let pos = self.pos;
        let tag = self.next()?;
        match tag {
            b'N' => {
                self.consume(b';', "expected `;`")?;
                Ok(Value::Null)
            }
            b'b' => {
                self.consume(b':', "expected `:`")?;
                let flag: u8 = self.number(b';')?;
                Ok(Value::Bool(flag != 0))
            }
            b'i' => {
                self.consume(b':', "expected `:`")?;
                let start = self.pos;
                let text = utf8(self.until(b';')?, start)?;
                text.parse::<i64>()
                    .map(Value::from)
                    .or_else(|_| text.parse::<u64>().map(Value::from))
                    .map_err(|_| CodecError::Malformed {
                        pos: start,
                        reason: "invalid number",
                    })
            }
            b'd' => {
                self.consume(b':', "expected `:`")?;
                let f: f64 = self.number(b';')?;
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or(CodecError::Malformed {
                        pos,
                        reason: "non-finite float",
                    })
            }
            b's' => {
                self.consume(b':', "expected `:`")?;
                self.string().map(Value::String)
            }
            b'a' => {
                self.consume(b':', "expected `:`")?;
                let count: usize = self.number(b':')?;
                self.consume(b'{', "expected `{`")?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let key = self.key()?;
                    let item = self.value(depth + 1)?;
                    entries.push((key, item));
                }
                self.consume(b'}', "expected `}`")?;
                Ok(build_array(entries))
            }
            other => Err(CodecError::UnsupportedTag {
                pos,
                tag: char::from(other),
            }),
        }
    }

    fn key(&mut self) -> Result<Key, CodecError> {
        let pos = self.pos;
        match self.next()? {
            b'i' => {
                self.consume(b':', "expected `:`")?;
                Ok(Key::Index(self.number(b';')?))
            }
            b's' => {
                self.consume(b':', "expected `:`")?;
                Ok(Key::Name(self.string()?))
            }
            other => Err(CodecError::UnsupportedTag {
                pos,
                tag: char::from(other),
            }),
        }
    }
}

fn build_array(entries: Vec<(Key, Value)>) -> Value {
    let is_list = entries
        .iter()
        .enumerate()
        .all(|(i, (key, _))| matches!(key, Key::Index(k) if usize::try_from(*k) == Ok(i)));
    if is_list {
        return Value::Array(entries.into_iter().map(|(_, v)| v).collect());
    }
    let map = entries
        .into_iter()
        .map(|(key, v)| match key {
            Key::Index(i) => (i.to_string(), v),
            Key::Name(name) => (name, v),
        })
        .collect::<Map<_, _>>();
    Value::Object(map)
}
