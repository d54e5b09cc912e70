//! Feature property decoding.
//!
//! Properties are a packed sequence of `(u16 column index, value)` pairs.
//! The column's declared type selects the decode rule:
//!
//! | Type                     | Encoding                       |
//! |--------------------------|--------------------------------|
//! | byte, ubyte, bool        | 1 byte                         |
//! | short, ushort            | 2 bytes LE                     |
//! | int, uint, float         | 4 bytes LE                     |
//! | long, ulong, double      | 8 bytes LE                     |
//! | string, json, datetime   | u32 LE length + UTF-8 bytes    |
//! | binary                   | u32 LE length + bytes, skipped |

use crate::error::{GeodexError, Result};
use crate::fgb::header::{Column, ColumnType};
use std::collections::BTreeMap;
use std::fmt;

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Signed 8-bit integer.
    Byte(i8),
    /// Unsigned 8-bit integer.
    UByte(u8),
    /// Boolean.
    Bool(bool),
    /// Signed 16-bit integer.
    Short(i16),
    /// Unsigned 16-bit integer.
    UShort(u16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Unsigned 32-bit integer.
    UInt(u32),
    /// Signed 64-bit integer.
    Long(i64),
    /// Unsigned 64-bit integer.
    ULong(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 text.
    String(String),
    /// JSON text.
    Json(String),
    /// ISO 8601 date-time text.
    DateTime(String),
}

/// Decoded properties keyed by column name.
pub type Properties = BTreeMap<String, ColumnValue>;

impl ColumnValue {
    /// Returns the column type this value is stored as.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::Byte(_) => ColumnType::Byte,
            ColumnValue::UByte(_) => ColumnType::UByte,
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::Short(_) => ColumnType::Short,
            ColumnValue::UShort(_) => ColumnType::UShort,
            ColumnValue::Int(_) => ColumnType::Int,
            ColumnValue::UInt(_) => ColumnType::UInt,
            ColumnValue::Long(_) => ColumnType::Long,
            ColumnValue::ULong(_) => ColumnType::ULong,
            ColumnValue::Float(_) => ColumnType::Float,
            ColumnValue::Double(_) => ColumnType::Double,
            ColumnValue::String(_) => ColumnType::String,
            ColumnValue::Json(_) => ColumnType::Json,
            ColumnValue::DateTime(_) => ColumnType::DateTime,
        }
    }

    /// Returns the text of string, JSON and date-time values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(s) | ColumnValue::Json(s) | ColumnValue::DateTime(s) => Some(s),
            _ => None,
        }
    }

    /// Compares the value's text rendering with `expected`, ignoring case.
    pub fn matches(&self, expected: &str) -> bool {
        match self.as_str() {
            Some(text) => eq_ignore_case(text, expected),
            None => eq_ignore_case(&self.to_string(), expected),
        }
    }

    /// Appends the encoded value (without column index) to `out`.
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            ColumnValue::Byte(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::UByte(v) => out.push(*v),
            ColumnValue::Bool(v) => out.push(u8::from(*v)),
            ColumnValue::Short(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::UShort(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::UInt(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::ULong(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
            ColumnValue::String(s) | ColumnValue::Json(s) | ColumnValue::DateTime(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Byte(v) => write!(f, "{}", v),
            ColumnValue::UByte(v) => write!(f, "{}", v),
            ColumnValue::Bool(v) => write!(f, "{}", v),
            ColumnValue::Short(v) => write!(f, "{}", v),
            ColumnValue::UShort(v) => write!(f, "{}", v),
            ColumnValue::Int(v) => write!(f, "{}", v),
            ColumnValue::UInt(v) => write!(f, "{}", v),
            ColumnValue::Long(v) => write!(f, "{}", v),
            ColumnValue::ULong(v) => write!(f, "{}", v),
            ColumnValue::Float(v) => write!(f, "{}", v),
            ColumnValue::Double(v) => write!(f, "{}", v),
            ColumnValue::String(s) | ColumnValue::Json(s) | ColumnValue::DateTime(s) => {
                f.write_str(s)
            }
        }
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

struct PropertyCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PropertyCursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take_slice(N)?);
        Ok(out)
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(GeodexError::Decode(format!(
                "property value of {} bytes at {} overruns {} byte buffer",
                len,
                self.pos,
                self.bytes.len()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_text(&mut self) -> Result<String> {
        let len = u32::from_le_bytes(self.take::<4>()?) as usize;
        let bytes = self.take_slice(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| GeodexError::InvalidUtf8("property text"))
    }

    /// Decodes one value; `None` for skipped binary payloads.
    fn value(&mut self, column_type: ColumnType) -> Result<Option<ColumnValue>> {
        let value = match column_type {
            ColumnType::Byte => ColumnValue::Byte(i8::from_le_bytes(self.take()?)),
            ColumnType::UByte => ColumnValue::UByte(self.take::<1>()?[0]),
            ColumnType::Bool => ColumnValue::Bool(self.take::<1>()?[0] != 0),
            ColumnType::Short => ColumnValue::Short(i16::from_le_bytes(self.take()?)),
            ColumnType::UShort => ColumnValue::UShort(u16::from_le_bytes(self.take()?)),
            ColumnType::Int => ColumnValue::Int(i32::from_le_bytes(self.take()?)),
            ColumnType::UInt => ColumnValue::UInt(u32::from_le_bytes(self.take()?)),
            ColumnType::Long => ColumnValue::Long(i64::from_le_bytes(self.take()?)),
            ColumnType::ULong => ColumnValue::ULong(u64::from_le_bytes(self.take()?)),
            ColumnType::Float => ColumnValue::Float(f32::from_le_bytes(self.take()?)),
            ColumnType::Double => ColumnValue::Double(f64::from_le_bytes(self.take()?)),
            ColumnType::String => ColumnValue::String(self.take_text()?),
            ColumnType::Json => ColumnValue::Json(self.take_text()?),
            ColumnType::DateTime => ColumnValue::DateTime(self.take_text()?),
            ColumnType::Binary => {
                let len = u32::from_le_bytes(self.take::<4>()?) as usize;
                self.take_slice(len)?;
                return Ok(None);
            }
        };
        Ok(Some(value))
    }
}

/// Decodes a packed property buffer against a column directory.
///
/// Binary values are skipped and never appear in the result.
///
/// # Errors
///
/// Returns `GeodexError::Decode` for an unknown column index or a value that
/// overruns the buffer, and `GeodexError::InvalidUtf8` for bad text.
pub fn decode_properties(bytes: &[u8], columns: &[Column]) -> Result<Properties> {
    let mut cursor = PropertyCursor { bytes, pos: 0 };
    let mut properties = Properties::new();
    while cursor.remaining() > 0 {
        let index = u16::from_le_bytes(cursor.take()?) as usize;
        let column = columns.get(index).ok_or_else(|| {
            GeodexError::Decode(format!(
                "property column {} outside directory of {} columns",
                index,
                columns.len()
            ))
        })?;
        if let Some(value) = cursor.value(column.column_type)? {
            properties.insert(column.name.clone(), value);
        }
    }
    Ok(properties)
}

/// Builds a packed property buffer.
#[derive(Debug, Clone, Default)]
pub struct PropertyWriter {
    buf: Vec<u8>,
}

impl PropertyWriter {
    /// Creates an empty property buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` for column `index`.
    pub fn push(mut self, index: u16, value: &ColumnValue) -> Self {
        self.buf.extend_from_slice(&index.to_le_bytes());
        value.encode_into(&mut self.buf);
        self
    }

    /// Appends an opaque binary value for column `index`.
    pub fn push_binary(mut self, index: u16, payload: &[u8]) -> Self {
        self.buf.extend_from_slice(&index.to_le_bytes());
        self.buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    /// Returns the packed bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_type_columns() -> Vec<Column> {
        vec![
            Column::new("byte", ColumnType::Byte),
            Column::new("ubyte", ColumnType::UByte),
            Column::new("bool", ColumnType::Bool),
            Column::new("short", ColumnType::Short),
            Column::new("ushort", ColumnType::UShort),
            Column::new("int", ColumnType::Int),
            Column::new("uint", ColumnType::UInt),
            Column::new("long", ColumnType::Long),
            Column::new("ulong", ColumnType::ULong),
            Column::new("float", ColumnType::Float),
            Column::new("double", ColumnType::Double),
            Column::new("string", ColumnType::String),
            Column::new("json", ColumnType::Json),
            Column::new("datetime", ColumnType::DateTime),
            Column::new("binary", ColumnType::Binary),
            Column::new("after_binary", ColumnType::String),
        ]
    }

    #[test]
    fn test_decode_every_column_type() {
        let expected = vec![
            (0u16, ColumnValue::Byte(-5)),
            (1, ColumnValue::UByte(250)),
            (2, ColumnValue::Bool(true)),
            (3, ColumnValue::Short(-30_000)),
            (4, ColumnValue::UShort(60_000)),
            (5, ColumnValue::Int(-2_000_000_000)),
            (6, ColumnValue::UInt(4_000_000_000)),
            (7, ColumnValue::Long(-9_000_000_000_000)),
            (8, ColumnValue::ULong(18_000_000_000_000_000_000)),
            (9, ColumnValue::Float(1.5)),
            (10, ColumnValue::Double(-0.125)),
            (11, ColumnValue::String("Portugal".into())),
            (12, ColumnValue::Json(r#"{"iso":"PT"}"#.into())),
            (13, ColumnValue::DateTime("2024-01-01T00:00:00Z".into())),
        ];
        let mut writer = PropertyWriter::new();
        for (index, value) in &expected {
            writer = writer.push(*index, value);
        }
        let bytes = writer
            .push_binary(14, &[0xde, 0xad, 0xbe, 0xef, 0x00])
            .push(15, &ColumnValue::String("sibling".into()))
            .into_bytes();

        let columns = all_type_columns();
        let properties = decode_properties(&bytes, &columns).unwrap();

        for (index, value) in &expected {
            let name = &columns[*index as usize].name;
            assert_eq!(properties.get(name), Some(value), "column {}", name);
        }
        assert!(!properties.contains_key("binary"));
        assert_eq!(
            properties.get("after_binary"),
            Some(&ColumnValue::String("sibling".into()))
        );
        assert_eq!(properties.len(), expected.len() + 1);
    }

    #[test]
    fn test_unknown_column_index_is_decode_error() {
        let bytes = PropertyWriter::new()
            .push(3, &ColumnValue::Int(1))
            .into_bytes();
        let columns = vec![Column::new("only", ColumnType::Int)];
        assert!(matches!(
            decode_properties(&bytes, &columns),
            Err(GeodexError::Decode(_))
        ));
    }

    #[test]
    fn test_truncated_text_is_decode_error() {
        let mut bytes = PropertyWriter::new()
            .push(0, &ColumnValue::String("truncated".into()))
            .into_bytes();
        bytes.truncate(bytes.len() - 2);
        let columns = vec![Column::new("name", ColumnType::String)];
        assert!(decode_properties(&bytes, &columns).is_err());
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        assert!(ColumnValue::String("Côte d'Ivoire".into()).matches("CÔTE D'IVOIRE"));
        assert!(!ColumnValue::String("France".into()).matches("Franc"));
        assert!(ColumnValue::Int(620).matches("620"));
        assert!(ColumnValue::Bool(true).matches("TRUE"));
    }

    #[test]
    fn test_empty_buffer_has_no_properties() {
        assert!(decode_properties(&[], &[]).unwrap().is_empty());
    }
}
