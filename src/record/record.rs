// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;

use super::field::FieldDef;
use crate::{codec::Value, error::ProtocolError};

/// Ordered list of [`FieldDef`]s plus a name → index lookup, shared by every
/// [`Record`] instance of a kind (records of the same shape are cheap to
/// build because the definition is reference-counted, not cloned).
#[derive(Debug)]
pub struct RecordDef {
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
    index: HashMap<&'static str, usize>,
}

impl RecordDef {
    pub fn new(name: &'static str, fields: Vec<FieldDef>) -> Arc<Self> {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name, i))
            .collect();
        Arc::new(Self { name, fields, index })
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::InvalidMessage(format!("no such field '{name}'")).into())
    }
}

/// A concrete, in-memory instance of a [`RecordDef`].
///
/// Field order in `values` always matches `def.fields` — the protocols this
/// crate serializes are positional, so record identity and wire order are
/// the same thing.
#[derive(Debug, Clone)]
pub struct Record {
    pub def: Arc<RecordDef>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record whose fields are all set to their declared defaults
    /// (nested records/arrays are expected to be constructed eagerly by the
    /// caller via [`Record::set`] afterwards).
    pub fn default_for(def: Arc<RecordDef>) -> Self {
        let values = def.fields.iter().map(FieldDef::default_value).collect();
        Self { def, values }
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        Ok(&self.values[self.def.position(name)?])
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = self.def.position(name)?;
        let field = &self.def.fields[idx];
        if field.ty.kind() != value.kind() {
            return Err(ProtocolError::TypeMismatch {
                field: name.to_string(),
                expected: field.ty.kind().to_string(),
                actual: value.kind().to_string(),
            }
            .into());
        }
        self.values[idx] = value;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (field, value) in self.def.fields.iter().zip(self.values.iter()) {
            field.ty.encode(value, &mut out)?;
        }
        Ok(out)
    }

    /// Decode a record of shape `def` from the front of `bytes`, returning
    /// `(total bytes consumed, record)`.
    pub fn decode(def: Arc<RecordDef>, bytes: &[u8]) -> Result<(usize, Self)> {
        let mut offset = 0usize;
        let mut values = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let (n, v) = field.ty.decode(&bytes[offset..])?;
            offset += n;
            values.push(v);
        }
        Ok((offset, Self { def, values }))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.def.name == other.def.name && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::FieldType, record::field::FieldDef};

    fn sample_def() -> Arc<RecordDef> {
        RecordDef::new("Sample", vec![
            FieldDef::new("byte", FieldType::U8),
            FieldDef::new("short", FieldType::U16Le),
            FieldDef::new("str", FieldType::AsciiString),
        ])
    }

    #[test]
    fn record_round_trip_matches_fixture() {
        let def = sample_def();
        let mut rec = Record::default_for(def.clone());
        rec.set("byte", Value::U8(2)).expect("set byte");
        rec.set("short", Value::U16(5)).expect("set short");
        rec.set("str", Value::Str("test".to_string()))
            .expect("set str");

        let bytes = rec.encode().expect("encode");
        assert_eq!(bytes, vec![0x02, 0x05, 0x00, 0x04, 0x00, b't', b'e', b's', b't']);

        let (n, decoded) = Record::decode(def, &bytes).expect("decode");
        assert_eq!(n, bytes.len());
        assert_eq!(decoded, rec);
    }

    #[test]
    fn set_wrong_type_is_type_mismatch() {
        let def = sample_def();
        let mut rec = Record::default_for(def);
        let err = rec.set("byte", Value::Str("oops".to_string())).unwrap_err();
        assert!(err.downcast_ref::<crate::error::ProtocolError>().is_some());
    }
}
