// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! FIX segment model (C10): dynamic descriptors for Header/Body/Trailer
//! and repeating groups, built on the tag=value field layer.
//!
//! A plain [`Segment`] encodes its fields in insertion order, matching
//! the top-level Header/Body/Trailer. A repeating-group element encodes
//! in the group's declared schema order instead — see
//! [`Segment::encode_declared_order`] — filtered to whichever entries
//! are actually present in that element.

use std::{
    collections::HashMap,
    sync::Arc,
};

use anyhow::{Result, bail};

use super::field::{FixFieldDef, FixValue, SOH, split_next_pair};
use crate::error::ProtocolError;

/// How [`Segment::decode`] reacts to a tag it has already seen in the
/// current pass. Repeated tags normally signal the end of a segment (the
/// next segment, or a sibling group element, begins instead), but strict
/// deployments may prefer to reject them outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RepeatedTagPolicy {
    #[default]
    EndSegment,
    Error,
}

#[derive(Clone, Debug)]
pub enum SegmentEntryDef {
    Field(FixFieldDef),
    Group(Arc<GroupDef>),
}

impl SegmentEntryDef {
    fn tag(&self) -> u16 {
        match self {
            SegmentEntryDef::Field(f) => f.tag,
            SegmentEntryDef::Group(g) => g.count_tag,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SegmentEntryDef::Field(f) => f.name,
            SegmentEntryDef::Group(g) => g.count_name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GroupDef {
    pub count_tag: u16,
    pub count_name: &'static str,
    pub group: Arc<SegmentDef>,
}

#[derive(Clone, Debug)]
pub struct SegmentDef {
    pub name: &'static str,
    pub entries: Vec<SegmentEntryDef>,
    pub required: Vec<u16>,
    tag_index: HashMap<u16, usize>,
    name_index: HashMap<&'static str, usize>,
}

impl SegmentDef {
    pub fn new(name: &'static str, entries: Vec<SegmentEntryDef>, required: Vec<u16>) -> Arc<Self> {
        let mut tag_index = HashMap::with_capacity(entries.len());
        let mut name_index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            tag_index.insert(entry.tag(), i);
            name_index.insert(entry.name(), i);
        }
        Arc::new(Self { name, entries, required, tag_index, name_index })
    }

    fn entry_for_tag(&self, tag: u16) -> Option<&SegmentEntryDef> {
        self.tag_index.get(&tag).map(|&i| &self.entries[i])
    }

    pub fn field(&self, name: &str) -> Option<&FixFieldDef> {
        self.name_index.get(name).and_then(|&i| match &self.entries[i] {
            SegmentEntryDef::Field(f) => Some(f),
            SegmentEntryDef::Group(_) => None,
        })
    }
}

#[derive(Clone, Debug)]
pub enum FieldOrGroup {
    Field(FixValue),
    Group(Vec<Segment>),
}

/// An instance of a [`SegmentDef`]: an insertion-ordered association
/// list of `(tag, value)` pairs, not a map, so encode order can match
/// however the caller built it up.
#[derive(Clone, Debug)]
pub struct Segment {
    pub def: Arc<SegmentDef>,
    pub values: Vec<(u16, FieldOrGroup)>,
}

impl Segment {
    pub fn new(def: Arc<SegmentDef>) -> Self {
        Self { def, values: Vec::new() }
    }

    pub fn set_field(&mut self, name: &str, value: FixValue) -> Result<()> {
        let def = self.def.field(name).cloned().ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("'{name}' is not a field of segment '{}'", self.def.name))
        })?;
        self.values.retain(|(t, _)| *t != def.tag);
        self.values.push((def.tag, FieldOrGroup::Field(value)));
        Ok(())
    }

    pub fn get_field(&self, name: &str) -> Option<&FixValue> {
        let def = self.def.field(name)?;
        self.values.iter().find(|(t, _)| *t == def.tag).and_then(|(_, v)| match v {
            FieldOrGroup::Field(value) => Some(value),
            FieldOrGroup::Group(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        let present: Vec<u16> = self.values.iter().map(|(t, _)| *t).collect();
        let missing: Vec<String> = self
            .def
            .required
            .iter()
            .filter(|tag| !present.contains(tag))
            .map(|tag| {
                self.def
                    .entry_for_tag(*tag)
                    .map(|e| e.name().to_string())
                    .unwrap_or_else(|| tag.to_string())
            })
            .collect();
        if !missing.is_empty() {
            bail!(ProtocolError::MandatoryFieldMissing(missing));
        }
        Ok(())
    }

    /// Encode in insertion order: used for Header/Body/Trailer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.encode_entries(self.values.iter())
    }

    /// Encode in the declared schema order, filtered to present entries:
    /// used for repeating-group elements.
    pub fn encode_declared_order(&self) -> Result<Vec<u8>> {
        let ordered = self.def.entries.iter().filter_map(|entry| {
            let tag = entry.tag();
            self.values.iter().find(|(t, _)| *t == tag)
        });
        self.encode_entries(ordered)
    }

    fn encode_entries<'a>(&self, entries: impl Iterator<Item = &'a (u16, FieldOrGroup)>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (tag, value) in entries {
            match value {
                FieldOrGroup::Field(v) => {
                    let Some(SegmentEntryDef::Field(def)) = self.def.entry_for_tag(*tag) else {
                        bail!(ProtocolError::InvalidMessage(format!("tag {tag} is not a field entry")));
                    };
                    out.extend_from_slice(&def.encode(v)?);
                    out.push(SOH);
                },
                FieldOrGroup::Group(elements) => {
                    let Some(SegmentEntryDef::Group(group_def)) = self.def.entry_for_tag(*tag) else {
                        bail!(ProtocolError::InvalidMessage(format!("tag {tag} is not a group entry")));
                    };
                    let count_field = FixFieldDef::new(group_def.count_tag, group_def.count_name, super::field::FixFieldType::Int);
                    out.extend_from_slice(&count_field.encode(&FixValue::Int(elements.len() as i64))?);
                    out.push(SOH);
                    for element in elements {
                        out.extend_from_slice(&element.encode_declared_order()?);
                    }
                },
            }
        }
        Ok(out)
    }

    /// Decode against `def` with the default [`RepeatedTagPolicy::EndSegment`].
    pub fn decode(def: Arc<SegmentDef>, bytes: &[u8]) -> Result<(usize, Segment)> {
        Self::decode_with_policy(def, bytes, RepeatedTagPolicy::default())
    }

    /// Decode fields from `bytes` against `def` until end-of-buffer, an
    /// unknown tag (always ends the segment), or a repeated tag (ends the
    /// segment under [`RepeatedTagPolicy::EndSegment`], fails under
    /// [`RepeatedTagPolicy::Error`]). Returns the segment and the number
    /// of bytes consumed.
    pub fn decode_with_policy(def: Arc<SegmentDef>, bytes: &[u8], policy: RepeatedTagPolicy) -> Result<(usize, Segment)> {
        let mut segment = Segment::new(def);
        let mut offset = 0;
        let mut seen = std::collections::HashSet::new();

        while offset < bytes.len() {
            let (tag, value_str, consumed) = split_next_pair(&bytes[offset..])?;

            let Some(entry) = segment.def.entry_for_tag(tag) else { break };
            if seen.contains(&tag) {
                match policy {
                    RepeatedTagPolicy::EndSegment => break,
                    RepeatedTagPolicy::Error => {
                        bail!(ProtocolError::InvalidMessage(format!(
                            "tag {tag} repeated within segment '{}'",
                            segment.def.name
                        )));
                    },
                }
            }

            match entry.clone() {
                SegmentEntryDef::Field(field_def) => {
                    let value = field_def.decode_value(value_str)?;
                    seen.insert(tag);
                    segment.values.push((tag, FieldOrGroup::Field(value)));
                    offset += consumed;
                },
                SegmentEntryDef::Group(group_def) => {
                    let count: usize = value_str
                        .parse()
                        .map_err(|_| ProtocolError::InvalidMessage(format!("'{value_str}' is not a valid group count")))?;
                    seen.insert(tag);
                    offset += consumed;

                    let mut elements = Vec::with_capacity(count);
                    for _ in 0..count {
                        if offset >= bytes.len() {
                            bail!(ProtocolError::InvalidMessage(format!(
                                "group '{}' declares {count} entries but only {} were present",
                                group_def.count_name,
                                elements.len()
                            )));
                        }
                        let (used, element) = Segment::decode(group_def.group.clone(), &bytes[offset..])?;
                        if used == 0 {
                            bail!(ProtocolError::InvalidMessage(format!(
                                "group '{}' declares {count} entries but only {} were present",
                                group_def.count_name,
                                elements.len()
                            )));
                        }
                        offset += used;
                        elements.push(element);
                    }
                    segment.values.push((tag, FieldOrGroup::Group(elements)));
                },
            }
        }

        Ok((offset, segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::field::FixFieldType;

    fn order_def() -> Arc<SegmentDef> {
        SegmentDef::new(
            "Body",
            vec![
                SegmentEntryDef::Field(FixFieldDef::new(1, "Account", FixFieldType::Str)),
                SegmentEntryDef::Field(FixFieldDef::new(2, "Currency", FixFieldType::Str)),
                SegmentEntryDef::Field(FixFieldDef::new(11, "ClOrdID", FixFieldType::Str)),
            ],
            vec![1],
        )
    }

    #[test]
    fn plain_segment_encodes_in_insertion_order() {
        let def = order_def();
        let mut seg = Segment::new(def);
        seg.set_field("ClOrdID", FixValue::Str("100".into())).unwrap();
        seg.set_field("Account", FixValue::Str("10".into())).unwrap();
        seg.set_field("Currency", FixValue::Str("test".into())).unwrap();

        let bytes = seg.encode().unwrap();
        assert_eq!(bytes, b"11=100\x011=10\x012=test\x01");
    }

    #[test]
    fn decode_stops_at_unknown_tag() {
        let def = order_def();
        let (used, seg) = Segment::decode(def, b"1=10\x012=test\x0111=100\x01999=1000").unwrap();
        assert_eq!(used, b"1=10\x012=test\x0111=100\x01".len());
        assert_eq!(seg.get_field("Account").unwrap().as_str(), Some("10"));
        assert_eq!(seg.get_field("ClOrdID").unwrap().as_str(), Some("100"));
    }

    #[test]
    fn decode_stops_at_repeated_tag() {
        let def = order_def();
        let (used, seg) = Segment::decode(def, b"1=10\x011=20\x01").unwrap();
        assert_eq!(used, b"1=10\x01".len());
        assert_eq!(seg.values.len(), 1);
    }

    #[test]
    fn decode_with_error_policy_rejects_repeated_tag() {
        let def = order_def();
        let err = Segment::decode_with_policy(def, b"1=10\x011=20\x01", RepeatedTagPolicy::Error).unwrap_err();
        assert!(matches!(err.downcast_ref::<ProtocolError>(), Some(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn validate_reports_missing_required_fields() {
        let def = order_def();
        let seg = Segment::new(def);
        let err = seg.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::MandatoryFieldMissing(_))
        ));
    }

    fn group_parent_def() -> Arc<SegmentDef> {
        let entry = SegmentDef::new(
            "PartyEntry",
            vec![
                SegmentEntryDef::Field(FixFieldDef::new(448, "PartyID", FixFieldType::Str)),
                SegmentEntryDef::Field(FixFieldDef::new(447, "PartyIDSource", FixFieldType::Str)),
            ],
            vec![448],
        );
        let group = Arc::new(GroupDef { count_tag: 453, count_name: "NoPartyIDs", group: entry });
        SegmentDef::new(
            "Body",
            vec![
                SegmentEntryDef::Field(FixFieldDef::new(11, "ClOrdID", FixFieldType::Str)),
                SegmentEntryDef::Group(group),
            ],
            vec![11],
        )
    }

    #[test]
    fn group_elements_encode_in_declared_order_regardless_of_insertion() {
        let def = group_parent_def();
        let group_def = match &def.entries[1] {
            SegmentEntryDef::Group(g) => g.group.clone(),
            _ => unreachable!(),
        };

        let mut element = Segment::new(group_def);
        // Insert out of schema order; declared-order encode must still
        // emit PartyID (448) before PartyIDSource (447).
        element.set_field("PartyIDSource", FixValue::Str("D".into())).unwrap();
        element.set_field("PartyID", FixValue::Str("ABC".into())).unwrap();

        let mut seg = Segment::new(def);
        seg.set_field("ClOrdID", FixValue::Str("1".into())).unwrap();
        seg.values.push((453, FieldOrGroup::Group(vec![element])));

        let bytes = seg.encode().unwrap();
        assert_eq!(bytes, b"11=1\x01453=1\x01448=ABC\x01447=D\x01");
    }

    #[test]
    fn group_decode_round_trips_and_fails_when_short() {
        let def = group_parent_def();
        let bytes = b"11=1\x01453=2\x01448=ABC\x01447=D\x01448=XYZ\x01447=G\x01";
        let (used, seg) = Segment::decode(def.clone(), bytes).unwrap();
        assert_eq!(used, bytes.len());
        let FieldOrGroup::Group(elements) = &seg.values.iter().find(|(t, _)| *t == 453).unwrap().1 else {
            panic!("expected group");
        };
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].get_field("PartyID").unwrap().as_str(), Some("XYZ"));

        let short = b"11=1\x01453=2\x01448=ABC\x01447=D\x01";
        let err = Segment::decode(def, short).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::InvalidMessage(_))
        ));
    }
}
