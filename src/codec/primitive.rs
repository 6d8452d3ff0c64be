// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Primitive scalar codec (C1): the catalog of wire types shared by the
//! record protocols (ITCH/OUCH/SQF) and by [`crate::record`].
//!
//! Each [`FieldType`] is a *descriptor*: it knows how to turn a runtime
//! [`Value`] into bytes and back, in the same spirit as the source
//! library's `TypeDefinition` subclasses, but expressed as a closed Rust
//! enum instead of a class registry (there is a fixed, known catalog of
//! primitive wire types).

use anyhow::{Result, anyhow, bail};
use zerocopy::{
    FromBytes, IntoBytes,
    byteorder::{BigEndian, I16, I32, I64, LittleEndian, U16, U32, U64},
};

use crate::error::ProtocolError;

/// Runtime value held by a [`crate::record::Record`] field.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Char(char),
    Str(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::Char(_) => "char",
            Value::Str(_) => "str",
        }
    }
}

/// Descriptor for one entry of the primitive type catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    I8,
    U8,
    I16Le,
    I16Be,
    U16Le,
    U16Be,
    I32Le,
    I32Be,
    U32Le,
    U32Be,
    I64Le,
    I64Be,
    U64Le,
    U64Be,
    CharAscii,
    CharIso8859,
    /// 2-byte little-endian length prefix + ASCII payload.
    AsciiString,
    /// 2-byte little-endian length prefix + ISO-8859-1 payload.
    Iso8859String,
    FixedAsciiString { length: usize, right_justified: bool },
    FixedIsoString { length: usize, right_justified: bool },
}

impl FieldType {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::I8 => "i8",
            FieldType::U8 => "u8",
            FieldType::I16Le | FieldType::I16Be => "i16",
            FieldType::U16Le | FieldType::U16Be => "u16",
            FieldType::I32Le | FieldType::I32Be => "i32",
            FieldType::U32Le | FieldType::U32Be => "u32",
            FieldType::I64Le | FieldType::I64Be => "i64",
            FieldType::U64Le | FieldType::U64Be => "u64",
            FieldType::CharAscii | FieldType::CharIso8859 => "char",
            FieldType::AsciiString
            | FieldType::Iso8859String
            | FieldType::FixedAsciiString { .. }
            | FieldType::FixedIsoString { .. } => "str",
        }
    }

    /// Eagerly-constructed default value, used when a record field or
    /// array-element slot is left unset.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Bool => Value::Bool(false),
            FieldType::I8 => Value::I8(0),
            FieldType::U8 => Value::U8(0),
            FieldType::I16Le | FieldType::I16Be => Value::I16(0),
            FieldType::U16Le | FieldType::U16Be => Value::U16(0),
            FieldType::I32Le | FieldType::I32Be => Value::I32(0),
            FieldType::U32Le | FieldType::U32Be => Value::U32(0),
            FieldType::I64Le | FieldType::I64Be => Value::I64(0),
            FieldType::U64Le | FieldType::U64Be => Value::U64(0),
            FieldType::CharAscii | FieldType::CharIso8859 => Value::Char('\0'),
            FieldType::AsciiString | FieldType::Iso8859String => Value::Str(String::new()),
            FieldType::FixedAsciiString { length, .. }
            | FieldType::FixedIsoString { length, .. } => {
                Value::Str(" ".repeat(*length).trim().to_string())
            },
        }
    }

    fn type_check(&self, value: &Value) -> Result<()> {
        if value.kind() == self.kind() {
            Ok(())
        } else {
            Err(ProtocolError::TypeMismatch {
                field: format!("{self:?}"),
                expected: self.kind().to_string(),
                actual: value.kind().to_string(),
            }
            .into())
        }
    }

    /// Encode `value` and return the number of bytes written.
    pub fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<usize> {
        self.type_check(value)?;
        let start = out.len();
        match (self, value) {
            (FieldType::Bool, Value::Bool(b)) => out.push(if *b { 0x01 } else { 0x00 }),
            (FieldType::I8, Value::I8(v)) => out.push(*v as u8),
            (FieldType::U8, Value::U8(v)) => out.push(*v),
            (FieldType::I16Le, Value::I16(v)) => {
                out.extend_from_slice(I16::<LittleEndian>::new(*v).as_bytes())
            },
            (FieldType::I16Be, Value::I16(v)) => {
                out.extend_from_slice(I16::<BigEndian>::new(*v).as_bytes())
            },
            (FieldType::U16Le, Value::U16(v)) => {
                out.extend_from_slice(U16::<LittleEndian>::new(*v).as_bytes())
            },
            (FieldType::U16Be, Value::U16(v)) => {
                out.extend_from_slice(U16::<BigEndian>::new(*v).as_bytes())
            },
            (FieldType::I32Le, Value::I32(v)) => {
                out.extend_from_slice(I32::<LittleEndian>::new(*v).as_bytes())
            },
            (FieldType::I32Be, Value::I32(v)) => {
                out.extend_from_slice(I32::<BigEndian>::new(*v).as_bytes())
            },
            (FieldType::U32Le, Value::U32(v)) => {
                out.extend_from_slice(U32::<LittleEndian>::new(*v).as_bytes())
            },
            (FieldType::U32Be, Value::U32(v)) => {
                out.extend_from_slice(U32::<BigEndian>::new(*v).as_bytes())
            },
            (FieldType::I64Le, Value::I64(v)) => {
                out.extend_from_slice(I64::<LittleEndian>::new(*v).as_bytes())
            },
            (FieldType::I64Be, Value::I64(v)) => {
                out.extend_from_slice(I64::<BigEndian>::new(*v).as_bytes())
            },
            (FieldType::U64Le, Value::U64(v)) => {
                out.extend_from_slice(U64::<LittleEndian>::new(*v).as_bytes())
            },
            (FieldType::U64Be, Value::U64(v)) => {
                out.extend_from_slice(U64::<BigEndian>::new(*v).as_bytes())
            },
            (FieldType::CharAscii, Value::Char(c)) => {
                if !c.is_ascii() {
                    bail!(ProtocolError::InvalidMessage(format!(
                        "char {c:?} is not valid ASCII"
                    )));
                }
                out.push(*c as u8);
            },
            (FieldType::CharIso8859, Value::Char(c)) => {
                let code = *c as u32;
                if code > 0xFF {
                    bail!(ProtocolError::InvalidMessage(format!(
                        "char {c:?} is not valid ISO-8859-1"
                    )));
                }
                out.push(code as u8);
            },
            (FieldType::AsciiString, Value::Str(s)) => encode_length_prefixed(s, true, out)?,
            (FieldType::Iso8859String, Value::Str(s)) => {
                encode_length_prefixed(s, false, out)?
            },
            (FieldType::FixedAsciiString { length, right_justified }, Value::Str(s)) => {
                encode_fixed(s, *length, *right_justified, true, out)?
            },
            (FieldType::FixedIsoString { length, right_justified }, Value::Str(s)) => {
                encode_fixed(s, *length, *right_justified, false, out)?
            },
            _ => unreachable!("type_check already rejected mismatched kinds"),
        }
        Ok(out.len() - start)
    }

    /// Decode a value starting at `bytes[0]`; returns bytes consumed.
    pub fn decode(&self, bytes: &[u8]) -> Result<(usize, Value)> {
        match self {
            FieldType::Bool => {
                let b = need(bytes, 1)?;
                Ok((1, Value::Bool(b[0] != 0)))
            },
            FieldType::I8 => {
                let b = need(bytes, 1)?;
                Ok((1, Value::I8(b[0] as i8)))
            },
            FieldType::U8 => {
                let b = need(bytes, 1)?;
                Ok((1, Value::U8(b[0])))
            },
            FieldType::I16Le => {
                let b = need(bytes, 2)?;
                Ok((2, Value::I16(I16::<LittleEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::I16Be => {
                let b = need(bytes, 2)?;
                Ok((2, Value::I16(I16::<BigEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::U16Le => {
                let b = need(bytes, 2)?;
                Ok((2, Value::U16(U16::<LittleEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::U16Be => {
                let b = need(bytes, 2)?;
                Ok((2, Value::U16(U16::<BigEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::I32Le => {
                let b = need(bytes, 4)?;
                Ok((4, Value::I32(I32::<LittleEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::I32Be => {
                let b = need(bytes, 4)?;
                Ok((4, Value::I32(I32::<BigEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::U32Le => {
                let b = need(bytes, 4)?;
                Ok((4, Value::U32(U32::<LittleEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::U32Be => {
                let b = need(bytes, 4)?;
                Ok((4, Value::U32(U32::<BigEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::I64Le => {
                let b = need(bytes, 8)?;
                Ok((8, Value::I64(I64::<LittleEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::I64Be => {
                let b = need(bytes, 8)?;
                Ok((8, Value::I64(I64::<BigEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::U64Le => {
                let b = need(bytes, 8)?;
                Ok((8, Value::U64(U64::<LittleEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::U64Be => {
                let b = need(bytes, 8)?;
                Ok((8, Value::U64(U64::<BigEndian>::read_from_bytes(b).map_err(|_| ProtocolError::InvalidMessage("short read".into()))?.get())))
            },
            FieldType::CharAscii => {
                let b = need(bytes, 1)?;
                Ok((1, Value::Char(b[0] as char)))
            },
            FieldType::CharIso8859 => {
                let b = need(bytes, 1)?;
                Ok((1, Value::Char(b[0] as char)))
            },
            FieldType::AsciiString => decode_length_prefixed(bytes, true),
            FieldType::Iso8859String => decode_length_prefixed(bytes, false),
            FieldType::FixedAsciiString { length, .. } => decode_fixed(bytes, *length, true),
            FieldType::FixedIsoString { length, .. } => decode_fixed(bytes, *length, false),
        }
    }
}

fn need(bytes: &[u8], n: usize) -> Result<&[u8]> {
    if bytes.len() < n {
        bail!(ProtocolError::InvalidMessage(format!(
            "need {n} bytes, have {}",
            bytes.len()
        )));
    }
    Ok(&bytes[..n])
}

fn encode_str_bytes(s: &str, ascii: bool) -> Result<Vec<u8>> {
    if ascii {
        if !s.is_ascii() {
            bail!(ProtocolError::InvalidMessage(format!(
                "string {s:?} is not valid ASCII"
            )));
        }
        Ok(s.as_bytes().to_vec())
    } else {
        s.chars()
            .map(|c| {
                let code = c as u32;
                if code > 0xFF {
                    Err(anyhow!(ProtocolError::InvalidMessage(format!(
                        "string {s:?} is not valid ISO-8859-1"
                    ))))
                } else {
                    Ok(code as u8)
                }
            })
            .collect()
    }
}

fn decode_str_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn encode_length_prefixed(s: &str, ascii: bool, out: &mut Vec<u8>) -> Result<()> {
    let payload = encode_str_bytes(s, ascii)?;
    let len: u16 = payload
        .len()
        .try_into()
        .map_err(|_| ProtocolError::InvalidMessage(format!("string {s:?} too long")))?;
    out.extend_from_slice(U16::<LittleEndian>::new(len).as_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

fn decode_length_prefixed(bytes: &[u8], ascii: bool) -> Result<(usize, Value)> {
    let prefix = need(bytes, 2)?;
    let len = U16::<LittleEndian>::read_from_bytes(prefix)
        .map_err(|_| ProtocolError::InvalidMessage("short read".into()))?
        .get() as usize;
    let body = need(&bytes[2..], len)?;
    let s = if ascii {
        String::from_utf8(body.to_vec())
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?
    } else {
        decode_str_bytes(body)
    };
    Ok((2 + len, Value::Str(s)))
}

fn encode_fixed(
    s: &str,
    length: usize,
    right_justified: bool,
    ascii: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    let mut payload = encode_str_bytes(s, ascii)?;
    if payload.len() > length {
        bail!(ProtocolError::InvalidMessage(format!(
            "string {s:?} exceeds fixed length {length}"
        )));
    }
    let pad = length - payload.len();
    if right_justified {
        let mut padded = vec![b' '; pad];
        padded.append(&mut payload);
        out.extend_from_slice(&padded);
    } else {
        payload.extend(std::iter::repeat_n(b' ', pad));
        out.extend_from_slice(&payload);
    }
    Ok(())
}

fn decode_fixed(bytes: &[u8], length: usize, ascii: bool) -> Result<(usize, Value)> {
    let body = need(bytes, length)?;
    let s = if ascii {
        std::str::from_utf8(body).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?
            .trim()
            .to_string()
    } else {
        decode_str_bytes(body).trim().to_string()
    };
    Ok((length, Value::Str(s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_be_round_trip() {
        let ft = FieldType::U16Be;
        let v = Value::U16(0x1234);
        let mut buf = Vec::new();
        let n = ft.encode(&v, &mut buf).expect("encode");
        assert_eq!(buf, vec![0x12, 0x34]);
        let (consumed, decoded) = ft.decode(&buf).expect("decode");
        assert_eq!(consumed, n);
        assert_eq!(decoded, v);
    }

    #[test]
    fn i32_le_round_trip() {
        let ft = FieldType::I32Le;
        let v = Value::I32(-12345);
        let mut buf = Vec::new();
        ft.encode(&v, &mut buf).expect("encode");
        let (consumed, decoded) = ft.decode(&buf).expect("decode");
        assert_eq!(consumed, 4);
        assert_eq!(decoded, v);
    }

    #[test]
    fn bool_round_trip() {
        let ft = FieldType::Bool;
        let mut buf = Vec::new();
        ft.encode(&Value::Bool(true), &mut buf).expect("encode");
        assert_eq!(buf, vec![0x01]);
        let (_, decoded) = ft.decode(&buf).expect("decode");
        assert_eq!(decoded, Value::Bool(true));
    }

    #[test]
    fn fixed_ascii_string_pads_and_strips() {
        let ft = FieldType::FixedAsciiString { length: 10, right_justified: false };
        let mut buf = Vec::new();
        ft.encode(&Value::Str("session".to_string()), &mut buf)
            .expect("encode");
        assert_eq!(buf, b"session   ");
        let (n, decoded) = ft.decode(&buf).expect("decode");
        assert_eq!(n, 10);
        assert_eq!(decoded, Value::Str("session".to_string()));
    }

    #[test]
    fn fixed_ascii_string_right_justified() {
        let ft = FieldType::FixedAsciiString { length: 20, right_justified: true };
        let mut buf = Vec::new();
        ft.encode(&Value::Str("1".to_string()), &mut buf)
            .expect("encode");
        assert_eq!(buf, b"                   1");
    }

    #[test]
    fn length_prefixed_ascii_string_round_trip() {
        let ft = FieldType::AsciiString;
        let mut buf = Vec::new();
        ft.encode(&Value::Str("test".to_string()), &mut buf)
            .expect("encode");
        assert_eq!(buf, vec![0x04, 0x00, b't', b'e', b's', b't']);
        let (n, decoded) = ft.decode(&buf).expect("decode");
        assert_eq!(n, 6);
        assert_eq!(decoded, Value::Str("test".to_string()));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let ft = FieldType::U16Be;
        let mut buf = Vec::new();
        let err = ft.encode(&Value::Bool(true), &mut buf).unwrap_err();
        assert!(err.downcast_ref::<ProtocolError>().is_some());
    }

    #[test]
    fn truncated_input_is_invalid_message() {
        let ft = FieldType::U32Be;
        let err = ft.decode(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::InvalidMessage(_))
        ));
    }
}
