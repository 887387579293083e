//! An owned tree of decoded values, and the SAX-to-tree builder.
//!
//! The codec's primary decoding interface is the event stream of
//! [`crate::parser::ValueHandler`]; this module is the convenience layer the
//! renderers and grep sit on. Strings are byte strings — the wire makes no
//! UTF-8 promise — and are converted lossily only at the JSON boundary.

use chrono::{DateTime, SecondsFormat};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::dictionary::Dict;
use crate::encoder::ValueWriter;
use crate::error::{EncodeError, ParseError};
use crate::parser::ValueHandler;

/// A decoded Au value.
///
/// Object entries keep their wire order. Equality is structural, with
/// doubles compared bitwise so NaN equals NaN and `0.0` differs from `-0.0`;
/// this matches what the codec actually round-trips.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// A negative integer (non-negative integers decode as [`Value::Uint`]).
    Int(i64),
    Uint(u64),
    Double(f64),
    /// Nanoseconds since the Unix epoch.
    Time(u64),
    String(Vec<u8>),
    Array(Vec<Value>),
    Object(Vec<(Vec<u8>, Value)>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Convenience constructor for string values.
    pub fn string<S: AsRef<[u8]>>(s: S) -> Self {
        Value::String(s.as_ref().to_vec())
    }

    /// Re-encode this value through a [`ValueWriter`].
    pub fn write_to(&self, writer: &mut ValueWriter<'_>) -> Result<(), EncodeError> {
        match self {
            Value::Null => writer.null(),
            Value::Bool(b) => writer.boolean(*b),
            Value::Int(i) => writer.int(*i),
            Value::Uint(u) => writer.uint(*u),
            Value::Double(d) => writer.double(*d),
            Value::Time(n) => writer.time_nanos(*n),
            Value::String(bytes) => writer.string(&String::from_utf8_lossy(bytes)),
            Value::Array(items) => {
                writer.begin_array()?;
                for item in items {
                    item.write_to(writer)?;
                }
                writer.end_array();
            }
            Value::Object(entries) => {
                writer.begin_object()?;
                for (key, value) in entries {
                    writer.key(&String::from_utf8_lossy(key));
                    value.write_to(writer)?;
                }
                writer.end_object();
            }
        }
        Ok(())
    }
}

/// Render a nanosecond timestamp as RFC 3339 with nanosecond precision,
/// falling back to the raw count if it does not fit a calendar date.
pub fn format_timestamp(nanos: u64) -> String {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    match DateTime::from_timestamp(secs, subsec) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Nanos, true),
        None => nanos.to_string(),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Uint(u) => serializer.serialize_u64(*u),
            // serde_json renders non-finite doubles as null.
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::Time(n) => serializer.serialize_str(&format_timestamp(*n)),
            Value::String(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(&String::from_utf8_lossy(key), value)?;
                }
                map.end()
            }
        }
    }
}

enum Frame {
    Array(Vec<Value>),
    Object {
        entries: Vec<(Vec<u8>, Value)>,
        pending_key: Option<Vec<u8>>,
    },
}

/// A [`ValueHandler`] that builds an owned [`Value`], resolving dictionary
/// references against the dict of the enclosing record.
pub struct ValueBuilder<'d> {
    dict: &'d Dict,
    stack: Vec<Frame>,
    string_buf: Vec<u8>,
    root: Option<Value>,
    last_pos: u64,
}

impl<'d> ValueBuilder<'d> {
    /// A builder resolving dict refs against `dict`.
    pub fn new(dict: &'d Dict) -> Self {
        Self {
            dict,
            stack: Vec::new(),
            string_buf: Vec::new(),
            root: None,
            last_pos: 0,
        }
    }

    /// The completed value, if a full value was parsed.
    pub fn finish(self) -> Option<Value> {
        self.root
    }

    fn push(&mut self, value: Value) -> Result<(), ParseError> {
        match self.stack.last_mut() {
            None => {
                self.root = Some(value);
                Ok(())
            }
            Some(Frame::Array(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Frame::Object {
                entries,
                pending_key,
            }) => match pending_key.take() {
                Some(key) => {
                    entries.push((key, value));
                    Ok(())
                }
                None => {
                    if let Value::String(bytes) = value {
                        *pending_key = Some(bytes);
                        Ok(())
                    } else {
                        Err(ParseError::NonStringKey(self.last_pos))
                    }
                }
            },
        }
    }
}

impl ValueHandler for ValueBuilder<'_> {
    fn on_object_start(&mut self) -> Result<(), ParseError> {
        self.stack.push(Frame::Object {
            entries: Vec::new(),
            pending_key: None,
        });
        Ok(())
    }

    fn on_object_end(&mut self) -> Result<(), ParseError> {
        match self.stack.pop() {
            Some(Frame::Object { entries, .. }) => self.push(Value::Object(entries)),
            _ => Err(ParseError::NonStringKey(self.last_pos)),
        }
    }

    fn on_array_start(&mut self) -> Result<(), ParseError> {
        self.stack.push(Frame::Array(Vec::new()));
        Ok(())
    }

    fn on_array_end(&mut self) -> Result<(), ParseError> {
        match self.stack.pop() {
            Some(Frame::Array(items)) => self.push(Value::Array(items)),
            _ => Err(ParseError::NonStringKey(self.last_pos)),
        }
    }

    fn on_null(&mut self, pos: u64) -> Result<(), ParseError> {
        self.last_pos = pos;
        self.push(Value::Null)
    }

    fn on_bool(&mut self, pos: u64, value: bool) -> Result<(), ParseError> {
        self.last_pos = pos;
        self.push(Value::Bool(value))
    }

    fn on_int(&mut self, pos: u64, value: i64) -> Result<(), ParseError> {
        self.last_pos = pos;
        self.push(Value::Int(value))
    }

    fn on_uint(&mut self, pos: u64, value: u64) -> Result<(), ParseError> {
        self.last_pos = pos;
        self.push(Value::Uint(value))
    }

    fn on_double(&mut self, pos: u64, value: f64) -> Result<(), ParseError> {
        self.last_pos = pos;
        self.push(Value::Double(value))
    }

    fn on_time(&mut self, pos: u64, nanos: u64) -> Result<(), ParseError> {
        self.last_pos = pos;
        self.push(Value::Time(nanos))
    }

    fn on_dict_ref(&mut self, pos: u64, index: u64) -> Result<(), ParseError> {
        self.last_pos = pos;
        let entry = self
            .dict
            .get(index)
            .ok_or(ParseError::DictRefOutOfRange {
                offset: pos,
                index,
                len: self.dict.len(),
            })?
            .to_vec();
        self.push(Value::String(entry))
    }

    fn on_string_start(&mut self, pos: u64, len: u64) -> Result<(), ParseError> {
        self.last_pos = pos;
        self.string_buf.clear();
        self.string_buf.reserve(len.min(64 * 1024) as usize);
        Ok(())
    }

    fn on_string_fragment(&mut self, fragment: &[u8]) -> Result<(), ParseError> {
        self.string_buf.extend_from_slice(fragment);
        Ok(())
    }

    fn on_string_end(&mut self) -> Result<(), ParseError> {
        let bytes = std::mem::take(&mut self.string_buf);
        self.push(Value::String(bytes))
    }
}

/// Encode a `serde_json` value through a [`ValueWriter`], mapping JSON
/// numbers onto the narrowest Au integer form they fit.
pub fn write_json_value(
    writer: &mut ValueWriter<'_>,
    json: &serde_json::Value,
) -> Result<(), EncodeError> {
    match json {
        serde_json::Value::Null => writer.null(),
        serde_json::Value::Bool(b) => writer.boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                writer.uint(u);
            } else if let Some(i) = n.as_i64() {
                writer.int(i);
            } else {
                writer.double(n.as_f64().unwrap_or(f64::NAN));
            }
        }
        serde_json::Value::String(s) => writer.string(s),
        serde_json::Value::Array(items) => {
            writer.begin_array()?;
            for item in items {
                write_json_value(writer, item)?;
            }
            writer.end_array();
        }
        serde_json::Value::Object(entries) => {
            writer.begin_object()?;
            for (key, value) in entries {
                writer.key(key);
                write_json_value(writer, value)?;
            }
            writer.end_object();
        }
    }
    Ok(())
}
