// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! FIX field catalog (C10): `tag=value` ASCII encoding with no trailing
//! SOH added by the field itself (segments own the separators).

use anyhow::{Result, bail};

use crate::error::ProtocolError;

pub const SOH: u8 = 0x01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixFieldType {
    Str,
    Bool,
    Int,
    Char,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FixValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Char(char),
}

impl FixValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FixValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FixValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FixFieldType {
    fn to_ascii(self, value: &FixValue) -> Result<String> {
        Ok(match (self, value) {
            (FixFieldType::Str, FixValue::Str(s)) => s.clone(),
            (FixFieldType::Bool, FixValue::Bool(b)) => if *b { "Y" } else { "N" }.to_string(),
            (FixFieldType::Int, FixValue::Int(i)) => i.to_string(),
            (FixFieldType::Char, FixValue::Char(c)) => c.to_string(),
            _ => {
                bail!(ProtocolError::TypeMismatch {
                    field: "fix value".to_string(),
                    expected: format!("{self:?}"),
                    actual: format!("{value:?}"),
                });
            },
        })
    }

    fn from_ascii(self, s: &str) -> Result<FixValue> {
        Ok(match self {
            FixFieldType::Str => FixValue::Str(s.to_string()),
            FixFieldType::Bool => FixValue::Bool(s == "Y" || s == "y"),
            FixFieldType::Int => FixValue::Int(
                s.parse()
                    .map_err(|_| ProtocolError::InvalidMessage(format!("'{s}' is not a valid integer")))?,
            ),
            FixFieldType::Char => FixValue::Char(
                s.chars()
                    .next()
                    .ok_or_else(|| ProtocolError::InvalidMessage("empty char field".into()))?,
            ),
        })
    }
}

/// A `(tag, name, type)` triple, shared by every `Segment` entry of this
/// shape.
#[derive(Clone, Debug)]
pub struct FixFieldDef {
    pub tag: u16,
    pub name: &'static str,
    pub ty: FixFieldType,
}

impl FixFieldDef {
    pub const fn new(tag: u16, name: &'static str, ty: FixFieldType) -> Self {
        Self { tag, name, ty }
    }

    /// Encode as `tag=value` with no SOH; the caller joins fields.
    pub fn encode(&self, value: &FixValue) -> Result<Vec<u8>> {
        let mut out = format!("{}=", self.tag).into_bytes();
        out.extend_from_slice(self.ty.to_ascii(value)?.as_bytes());
        Ok(out)
    }

    pub fn decode_value(&self, ascii: &str) -> Result<FixValue> {
        self.ty.from_ascii(ascii)
    }
}

/// Split the next `tag=value` pair off the front of `bytes`, returning
/// `(tag, value_str, bytes_consumed_including_trailing_soh_if_any)`.
pub fn split_next_pair(bytes: &[u8]) -> Result<(u16, &str, usize)> {
    let eq = bytes
        .iter()
        .position(|&b| b == b'=')
        .ok_or_else(|| ProtocolError::InvalidMessage("field missing '='".to_string()))?;
    let tag: u16 = std::str::from_utf8(&bytes[..eq])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidMessage("malformed field tag".to_string()))?;

    let value_start = eq + 1;
    let (value_end, consumed) = match bytes[value_start..].iter().position(|&b| b == SOH) {
        Some(rel) => (value_start + rel, value_start + rel + 1),
        None => (bytes.len(), bytes.len()),
    };
    let value = std::str::from_utf8(&bytes[value_start..value_end])
        .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
    Ok((tag, value, consumed))
}
