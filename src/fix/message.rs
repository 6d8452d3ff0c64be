// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! FIX message model and wire framing (C11).
//!
//! [`Message::to_bytes`] joins Header/Body/Trailer with SOH, skipping
//! any empty segment, and guarantees a trailing SOH. [`frame`] then
//! wraps that in the BeginString/BodyLength/MsgType/CheckSum envelope:
//! MsgType is prepended first, then BodyLength (measured over the
//! MsgType-prefixed body), then BeginString, and finally a checksum
//! taken over the whole resulting buffer is appended as a trailer
//! field.

use std::sync::Arc;

use anyhow::{Result, bail};
use dashmap::{DashMap, mapref::entry::Entry};

use super::{
    field::{FixFieldDef, FixFieldType, FixValue, SOH, split_next_pair},
    segment::{RepeatedTagPolicy, Segment, SegmentDef},
};
use crate::{error::ProtocolError, registry::Direction};

pub const TAG_BEGIN_STRING: u16 = 8;
pub const TAG_BODY_LENGTH: u16 = 9;
pub const TAG_MSG_TYPE: u16 = 35;
pub const TAG_CHECK_SUM: u16 = 10;

#[derive(Clone, Debug)]
pub struct MessageDef {
    pub name: &'static str,
    pub msg_type: &'static str,
    pub header: Arc<SegmentDef>,
    pub body: Arc<SegmentDef>,
    pub trailer: Arc<SegmentDef>,
    pub direction: Direction,
}

#[derive(Clone, Debug)]
pub struct Message {
    pub def: Arc<MessageDef>,
    pub header: Segment,
    pub body: Segment,
    pub trailer: Segment,
}

impl Message {
    pub fn new(def: Arc<MessageDef>) -> Self {
        Self {
            header: Segment::new(def.header.clone()),
            body: Segment::new(def.body.clone()),
            trailer: Segment::new(def.trailer.clone()),
            def,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.def.msg_type == "0"
    }

    pub fn is_logout(&self) -> bool {
        self.def.msg_type == "5"
    }

    /// Join Header/Body/Trailer with SOH, dropping empty segments,
    /// ensuring a trailing SOH. Does not include BeginString, BodyLength,
    /// MsgType, or CheckSum — those are added by [`frame`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let segments = [self.header.encode()?, self.body.encode()?, self.trailer.encode()?];
        let mut out = Vec::new();
        for segment in segments.iter().filter(|s| !s.is_empty()) {
            out.extend_from_slice(segment);
        }
        if !out.ends_with(&[SOH]) {
            out.push(SOH);
        }
        Ok(out)
    }
}

/// Wrap a message's `Header+Body+Trailer` bytes in the full wire
/// envelope: `8=<begin>|9=<len>|35=<type>|...|10=<checksum>|`.
pub fn frame(begin_string: &str, msg_type: &str, joined: &[u8]) -> Vec<u8> {
    let msg_type_field = FixFieldDef::new(TAG_MSG_TYPE, "MsgType", FixFieldType::Str);
    let mut after_msg_type = msg_type_field.encode(&FixValue::Str(msg_type.to_string())).expect("str encode is infallible");
    after_msg_type.push(SOH);
    after_msg_type.extend_from_slice(joined);

    let body_length = after_msg_type.len();
    let body_length_field = FixFieldDef::new(TAG_BODY_LENGTH, "BodyLength", FixFieldType::Int);
    let mut before_checksum = body_length_field
        .encode(&FixValue::Int(body_length as i64))
        .expect("int encode is infallible");
    before_checksum.push(SOH);
    before_checksum.extend_from_slice(&after_msg_type);

    let begin_string_field = FixFieldDef::new(TAG_BEGIN_STRING, "BeginString", FixFieldType::Str);
    let mut out = begin_string_field
        .encode(&FixValue::Str(begin_string.to_string()))
        .expect("str encode is infallible");
    out.push(SOH);
    out.extend_from_slice(&before_checksum);

    let checksum: u8 = out.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    out.extend_from_slice(format!("10={checksum:03}").as_bytes());
    out.push(SOH);
    out
}

/// Read the `35=` MsgType field out of a complete framed message,
/// wherever it falls relative to BeginString/BodyLength.
pub fn peek_msg_type(bytes: &[u8]) -> Result<String> {
    let mut offset = 0;
    while offset < bytes.len() {
        let (tag, value, consumed) = split_next_pair(&bytes[offset..])?;
        if tag == TAG_MSG_TYPE {
            return Ok(value.to_string());
        }
        offset += consumed;
        if consumed == 0 {
            break;
        }
    }
    bail!(ProtocolError::InvalidMessage("no MsgType (35=) field in message".to_string()));
}

/// Decode a complete, checksum-verified framed message against `def`,
/// using the default [`RepeatedTagPolicy::EndSegment`] for each segment.
pub fn decode(def: Arc<MessageDef>, bytes: &[u8]) -> Result<Message> {
    decode_with_policy(def, bytes, RepeatedTagPolicy::default())
}

/// Decode a complete, checksum-verified framed message against `def`,
/// applying `policy` to every segment's tag-repeat handling.
pub fn decode_with_policy(def: Arc<MessageDef>, bytes: &[u8], policy: RepeatedTagPolicy) -> Result<Message> {
    verify_checksum(bytes)?;

    let mut offset = 0;
    // Skip BeginString, BodyLength, MsgType — already known via `def`
    // and the registry lookup that selected it.
    for _ in 0..3 {
        let (_, _, consumed) = split_next_pair(&bytes[offset..])?;
        offset += consumed;
    }

    let (used, header) = Segment::decode_with_policy(def.header.clone(), &bytes[offset..], policy)?;
    offset += used;
    let (used, body) = Segment::decode_with_policy(def.body.clone(), &bytes[offset..], policy)?;
    offset += used;
    let (_, trailer) = Segment::decode_with_policy(def.trailer.clone(), &bytes[offset..], policy)?;

    Ok(Message { def, header, body, trailer })
}

/// Per-dialect `(app_name, MsgType, direction) -> MessageDef` registry,
/// alongside a by-name index, mirroring the source's single `Message.Def`
/// dict keyed by both the message's name and its wire MsgType.
///
/// Direction mirrors [`crate::registry::MessageRegistry`]'s C3 key: a
/// dialect could in principle define distinct outgoing/incoming shapes
/// sharing a MsgType. The standard session-level set registered by
/// [`super::catalog::register_into`] is symmetric (both peers send and
/// receive the identical shape), so it registers every def as
/// `Direction::Incoming` — the only direction this session ever looks up,
/// since outbound messages are built directly from the catalog's `Arc<MessageDef>`
/// statics without a registry round-trip.
#[derive(Debug, Default)]
pub struct FixMessageRegistry {
    by_type: DashMap<(String, String, Direction), Arc<MessageDef>>,
    by_name: DashMap<(String, String), Arc<MessageDef>>,
}

impl FixMessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, app_name: &'static str, def: Arc<MessageDef>) -> Result<()> {
        let type_key = (app_name.to_string(), def.msg_type.to_string(), def.direction);
        match self.by_type.entry(type_key) {
            Entry::Occupied(existing) => {
                if existing.get().name != def.name {
                    bail!(ProtocolError::DuplicateMessage {
                        app: app_name.to_string(),
                        id: def.msg_type.to_string(),
                        existing: existing.get().name.to_string(),
                        new: def.name.to_string(),
                    });
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(def.clone());
            },
        }
        self.by_name.insert((app_name.to_string(), def.name.to_string()), def);
        Ok(())
    }

    pub fn lookup_by_type(&self, app_name: &str, msg_type: &str, direction: Direction) -> Result<Arc<MessageDef>> {
        self.by_type
            .get(&(app_name.to_string(), msg_type.to_string(), direction))
            .map(|e| e.value().clone())
            .ok_or_else(|| {
                ProtocolError::UnknownMessage { app: app_name.to_string(), id: msg_type.to_string() }.into()
            })
    }

    pub fn lookup_by_name(&self, app_name: &str, name: &str) -> Result<Arc<MessageDef>> {
        self.by_name
            .get(&(app_name.to_string(), name.to_string()))
            .map(|e| e.value().clone())
            .ok_or_else(|| ProtocolError::UnknownMessage { app: app_name.to_string(), id: name.to_string() }.into())
    }
}

fn verify_checksum(bytes: &[u8]) -> Result<()> {
    let tag10 = bytes
        .windows(3)
        .rposition(|w| w == b"10=")
        .ok_or_else(|| ProtocolError::InvalidMessage("message has no CheckSum field".to_string()))?;
    let expected: u8 = bytes[..tag10].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    let (_, value, _) = split_next_pair(&bytes[tag10..])?;
    let actual: u8 = value
        .parse()
        .map_err(|_| ProtocolError::InvalidMessage(format!("'{value}' is not a valid checksum")))?;
    if actual != expected {
        bail!(ProtocolError::InvalidMessage(format!("checksum mismatch: header says {actual}, computed {expected}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::segment::SegmentEntryDef;

    fn heartbeat_def() -> Arc<MessageDef> {
        let header = SegmentDef::new(
            "Header",
            vec![
                SegmentEntryDef::Field(FixFieldDef::new(49, "SenderCompID", FixFieldType::Str)),
                SegmentEntryDef::Field(FixFieldDef::new(56, "TargetCompID", FixFieldType::Str)),
                SegmentEntryDef::Field(FixFieldDef::new(34, "MsgSeqNum", FixFieldType::Int)),
            ],
            vec![49, 56, 34],
        );
        let body = SegmentDef::new("Body", vec![], vec![]);
        let trailer = SegmentDef::new("Trailer", vec![], vec![]);
        Arc::new(MessageDef { name: "Heartbeat", msg_type: "0", header, body, trailer, direction: Direction::Incoming })
    }

    #[test]
    fn frame_and_decode_round_trip() {
        let def = heartbeat_def();
        let mut msg = Message::new(def.clone());
        msg.header.set_field("SenderCompID", FixValue::Str("SENDER".into())).unwrap();
        msg.header.set_field("TargetCompID", FixValue::Str("TARGET".into())).unwrap();
        msg.header.set_field("MsgSeqNum", FixValue::Int(1)).unwrap();

        let joined = msg.to_bytes().unwrap();
        let framed = frame("FIX.4.4", def.msg_type, &joined);

        let text = String::from_utf8_lossy(&framed).replace('\u{1}', "|");
        assert!(text.starts_with("8=FIX.4.4|9="));
        assert!(text.contains("35=0|"));
        assert!(text.ends_with('|'));

        assert_eq!(peek_msg_type(&framed).unwrap(), "0");

        let decoded = decode(def, &framed).unwrap();
        assert_eq!(decoded.header.get_field("SenderCompID").unwrap().as_str(), Some("SENDER"));
        assert_eq!(decoded.header.get_field("MsgSeqNum").unwrap().as_int(), Some(1));
    }

    #[test]
    fn body_length_counts_from_after_body_length_field_through_before_checksum() {
        let def = heartbeat_def();
        let msg = Message::new(def.clone());
        let joined = msg.to_bytes().unwrap();
        let framed = frame("FIX.4.4", def.msg_type, &joined);

        let (_, value, _) = split_next_pair(
            &framed[framed.windows(2).position(|w| w == b"9=").unwrap()..],
        )
        .unwrap();
        let declared: usize = value.parse().unwrap();

        let msg_type_start = framed.windows(3).position(|w| w == b"35=").unwrap();
        let checksum_start = framed.windows(3).rposition(|w| w == b"10=").unwrap();
        assert_eq!(declared, checksum_start - msg_type_start);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let def = heartbeat_def();
        let mut msg = Message::new(def.clone());
        msg.header.set_field("SenderCompID", FixValue::Str("S".into())).unwrap();
        msg.header.set_field("TargetCompID", FixValue::Str("T".into())).unwrap();
        msg.header.set_field("MsgSeqNum", FixValue::Int(1)).unwrap();
        let joined = msg.to_bytes().unwrap();
        let mut framed = frame("FIX.4.4", def.msg_type, &joined);

        let checksum_start = framed.windows(3).rposition(|w| w == b"10=").unwrap();
        framed[checksum_start + 3] = b'9';

        let err = decode(def, &framed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::InvalidMessage(_))
        ));
    }
}
