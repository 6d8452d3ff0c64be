// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Arrays (§3, §4.2, P4): length-prefix + N elements, where elements may be
//! primitives, plain records, or (bit-skipping) presence-bit records.

use anyhow::Result;

use super::{
    field::ElementKind,
    record::{Record, RecordDef},
};
use crate::{
    codec::{FieldType, Value},
    error::ProtocolError,
};

/// Length-prefix descriptor; the source defaults to 16-bit big-endian
/// unsigned, so that is [`LengthPrefix::default`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthPrefix {
    U16Be,
    U16Le,
    U32Be,
    U32Le,
}

impl Default for LengthPrefix {
    fn default() -> Self {
        LengthPrefix::U16Be
    }
}

impl LengthPrefix {
    fn field_type(self) -> FieldType {
        match self {
            LengthPrefix::U16Be => FieldType::U16Be,
            LengthPrefix::U16Le => FieldType::U16Le,
            LengthPrefix::U32Be => FieldType::U32Be,
            LengthPrefix::U32Le => FieldType::U32Le,
        }
    }

    fn encode(self, n: usize, out: &mut Vec<u8>) -> Result<()> {
        let v = match self {
            LengthPrefix::U16Be | LengthPrefix::U16Le => Value::U16(
                n.try_into()
                    .map_err(|_| ProtocolError::InvalidMessage("array too long for u16 length prefix".into()))?,
            ),
            LengthPrefix::U32Be | LengthPrefix::U32Le => Value::U32(
                n.try_into()
                    .map_err(|_| ProtocolError::InvalidMessage("array too long for u32 length prefix".into()))?,
            ),
        };
        self.field_type().encode(&v, out)?;
        Ok(())
    }

    fn decode(self, bytes: &[u8]) -> Result<(usize, usize)> {
        let (n, v) = self.field_type().decode(bytes)?;
        let len = match v {
            Value::U16(x) => x as usize,
            Value::U32(x) => x as usize,
            _ => unreachable!("length-prefix field types only produce U16/U32"),
        };
        Ok((n, len))
    }
}

#[derive(Clone, Debug)]
pub struct ArrayDef {
    pub element: ElementKind,
    pub length_prefix: LengthPrefix,
}

impl ArrayDef {
    pub fn new(element: ElementKind) -> Self {
        Self { element, length_prefix: LengthPrefix::default() }
    }

    pub fn with_length_prefix(mut self, lp: LengthPrefix) -> Self {
        self.length_prefix = lp;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValue {
    Primitives(Vec<Value>),
    /// Used both for plain-record arrays and for presence-bit-record
    /// arrays — per §4.2 the bit is skipped inside an array, so both cases
    /// hold plain, always-present records.
    Records(Vec<Record>),
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Primitives(v) => v.len(),
            ArrayValue::Records(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn encode_array(def: &ArrayDef, value: &ArrayValue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    def.length_prefix.encode(value.len(), &mut out)?;
    match (&def.element, value) {
        (ElementKind::Primitive(ty), ArrayValue::Primitives(values)) => {
            for v in values {
                ty.encode(v, &mut out)?;
            }
        },
        (ElementKind::Record(_) | ElementKind::PresenceBitRecord(_), ArrayValue::Records(records)) => {
            for r in records {
                out.extend(r.encode()?);
            }
        },
        _ => {
            return Err(ProtocolError::TypeMismatch {
                field: "array element".to_string(),
                expected: "matching element kind".to_string(),
                actual: "mismatched array value variant".to_string(),
            }
            .into());
        },
    }
    Ok(out)
}

pub fn decode_array(def: &ArrayDef, bytes: &[u8]) -> Result<(usize, ArrayValue)> {
    let (mut offset, count) = def.length_prefix.decode(bytes)?;
    match &def.element {
        ElementKind::Primitive(ty) => {
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let remaining = bytes.get(offset..).ok_or_else(|| {
                    ProtocolError::InvalidMessage("array truncated before declared length".into())
                })?;
                let (n, v) = ty.decode(remaining)?;
                offset += n;
                values.push(v);
            }
            Ok((offset, ArrayValue::Primitives(values)))
        },
        ElementKind::Record(def) | ElementKind::PresenceBitRecord(def) => {
            let mut records = Vec::with_capacity(count);
            for _ in 0..count {
                let remaining = bytes.get(offset..).ok_or_else(|| {
                    ProtocolError::InvalidMessage("array truncated before declared length".into())
                })?;
                let (n, rec) = Record::decode(def.clone(), remaining)?;
                offset += n;
                records.push(rec);
            }
            Ok((offset, ArrayValue::Records(records)))
        },
    }
}
