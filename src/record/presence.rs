// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Presence-bit records (§3, §4.2, P3): a record whose encoding is prefixed
//! with a one-byte boolean flag saying whether the record follows at all.

use std::sync::Arc;

use anyhow::Result;

use super::record::{Record, RecordDef};
use crate::error::ProtocolError;

pub fn encode_presence(rec: Option<&Record>) -> Result<Vec<u8>> {
    match rec {
        None => Ok(vec![0x00]),
        Some(r) => {
            let mut out = vec![0x01];
            out.extend(r.encode()?);
            Ok(out)
        },
    }
}

pub fn decode_presence(def: Arc<RecordDef>, bytes: &[u8]) -> Result<(usize, Option<Record>)> {
    if bytes.is_empty() {
        return Err(ProtocolError::InvalidMessage("empty buffer for presence bit".into()).into());
    }
    match bytes[0] {
        0x00 => Ok((1, None)),
        0x01 => {
            let (n, rec) = Record::decode(def, &bytes[1..])?;
            Ok((1 + n, Some(rec)))
        },
        other => Err(ProtocolError::InvalidMessage(format!(
            "invalid presence bit byte {other:#x}, expected 0x00 or 0x01"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{FieldType, Value},
        record::field::FieldDef,
    };

    fn nested_def() -> Arc<RecordDef> {
        RecordDef::new("Nested", vec![FieldDef::new("flag", FieldType::Bool)])
    }

    #[test]
    fn absent_record_is_exactly_one_zero_byte() {
        let bytes = encode_presence(None).expect("encode");
        assert_eq!(bytes, vec![0x00]);
        let (n, decoded) = decode_presence(nested_def(), &bytes).expect("decode");
        assert_eq!(n, 1);
        assert!(decoded.is_none());
    }

    #[test]
    fn present_record_starts_with_one_byte() {
        let def = nested_def();
        let mut rec = Record::default_for(def.clone());
        rec.set("flag", Value::Bool(true)).expect("set");
        let bytes = encode_presence(Some(&rec)).expect("encode");
        assert_eq!(bytes[0], 0x01);
        let (n, decoded) = decode_presence(def, &bytes).expect("decode");
        assert_eq!(n, bytes.len());
        assert_eq!(decoded, Some(rec));
    }
}
