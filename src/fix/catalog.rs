// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Standard FIX session-level messages (Logon, Heartbeat, TestRequest,
//! ResendRequest, Reject, SequenceReset, Logout) and the header/trailer
//! shared by every application message. `BeginString`/`BodyLength`/
//! `MsgType`/`CheckSum` are not segment entries here — they are handled
//! entirely by [`super::message::frame`]/[`super::message::decode`].

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::{
    field::{FixFieldDef, FixFieldType},
    message::MessageDef,
    segment::{SegmentDef, SegmentEntryDef},
};
use crate::registry::Direction;

pub const TAG_SENDER_COMP_ID: u16 = 49;
pub const TAG_TARGET_COMP_ID: u16 = 56;
pub const TAG_SENDER_SUB_ID: u16 = 50;
pub const TAG_MSG_SEQ_NUM: u16 = 34;
pub const TAG_SENDING_TIME: u16 = 52;
pub const TAG_ENCRYPT_METHOD: u16 = 98;
pub const TAG_HEART_BT_INT: u16 = 108;
pub const TAG_RESET_SEQ_NUM_FLAG: u16 = 141;
pub const TAG_USERNAME: u16 = 553;
pub const TAG_PASSWORD: u16 = 554;
pub const TAG_TEST_REQ_ID: u16 = 112;
pub const TAG_BEGIN_SEQ_NO: u16 = 7;
pub const TAG_END_SEQ_NO: u16 = 16;
pub const TAG_NEW_SEQ_NO: u16 = 36;
pub const TAG_GAP_FILL_FLAG: u16 = 123;
pub const TAG_TEXT: u16 = 58;
pub const TAG_REF_SEQ_NUM: u16 = 45;

pub static HEADER_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "Header",
        vec![
            SegmentEntryDef::Field(FixFieldDef::new(TAG_SENDER_COMP_ID, "SenderCompID", FixFieldType::Str)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_TARGET_COMP_ID, "TargetCompID", FixFieldType::Str)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_SENDER_SUB_ID, "SenderSubID", FixFieldType::Str)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_MSG_SEQ_NUM, "MsgSeqNum", FixFieldType::Int)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_SENDING_TIME, "SendingTime", FixFieldType::Str)),
        ],
        vec![TAG_SENDER_COMP_ID, TAG_TARGET_COMP_ID, TAG_MSG_SEQ_NUM, TAG_SENDING_TIME],
    )
});

pub static TRAILER_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| SegmentDef::new("Trailer", vec![], vec![]));

pub static LOGON_BODY_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "Logon",
        vec![
            SegmentEntryDef::Field(FixFieldDef::new(TAG_ENCRYPT_METHOD, "EncryptMethod", FixFieldType::Int)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_HEART_BT_INT, "HeartBtInt", FixFieldType::Int)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_RESET_SEQ_NUM_FLAG, "ResetSeqNumFlag", FixFieldType::Bool)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_USERNAME, "Username", FixFieldType::Str)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_PASSWORD, "Password", FixFieldType::Str)),
        ],
        vec![TAG_ENCRYPT_METHOD, TAG_HEART_BT_INT],
    )
});

pub static HEARTBEAT_BODY_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "Heartbeat",
        vec![SegmentEntryDef::Field(FixFieldDef::new(TAG_TEST_REQ_ID, "TestReqID", FixFieldType::Str))],
        vec![],
    )
});

pub static TEST_REQUEST_BODY_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "TestRequest",
        vec![SegmentEntryDef::Field(FixFieldDef::new(TAG_TEST_REQ_ID, "TestReqID", FixFieldType::Str))],
        vec![TAG_TEST_REQ_ID],
    )
});

pub static RESEND_REQUEST_BODY_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "ResendRequest",
        vec![
            SegmentEntryDef::Field(FixFieldDef::new(TAG_BEGIN_SEQ_NO, "BeginSeqNo", FixFieldType::Int)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_END_SEQ_NO, "EndSeqNo", FixFieldType::Int)),
        ],
        vec![TAG_BEGIN_SEQ_NO, TAG_END_SEQ_NO],
    )
});

pub static REJECT_BODY_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "Reject",
        vec![
            SegmentEntryDef::Field(FixFieldDef::new(TAG_REF_SEQ_NUM, "RefSeqNum", FixFieldType::Int)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_TEXT, "Text", FixFieldType::Str)),
        ],
        vec![TAG_REF_SEQ_NUM],
    )
});

pub static SEQUENCE_RESET_BODY_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "SequenceReset",
        vec![
            SegmentEntryDef::Field(FixFieldDef::new(TAG_GAP_FILL_FLAG, "GapFillFlag", FixFieldType::Bool)),
            SegmentEntryDef::Field(FixFieldDef::new(TAG_NEW_SEQ_NO, "NewSeqNo", FixFieldType::Int)),
        ],
        vec![TAG_NEW_SEQ_NO],
    )
});

pub static LOGOUT_BODY_DEF: Lazy<Arc<SegmentDef>> = Lazy::new(|| {
    SegmentDef::new(
        "Logout",
        vec![SegmentEntryDef::Field(FixFieldDef::new(TAG_TEXT, "Text", FixFieldType::Str))],
        vec![],
    )
});

/// Session-level messages are symmetric: both peers send and receive the
/// identical shape, and this registry is only ever consulted when decoding
/// inbound bytes, so every standard def registers as `Direction::Incoming`.
fn def(name: &'static str, msg_type: &'static str, body: Arc<SegmentDef>) -> Arc<MessageDef> {
    Arc::new(MessageDef {
        name,
        msg_type,
        header: HEADER_DEF.clone(),
        body,
        trailer: TRAILER_DEF.clone(),
        direction: Direction::Incoming,
    })
}

pub static LOGON_DEF: Lazy<Arc<MessageDef>> = Lazy::new(|| def("Logon", "A", LOGON_BODY_DEF.clone()));
pub static HEARTBEAT_DEF: Lazy<Arc<MessageDef>> = Lazy::new(|| def("Heartbeat", "0", HEARTBEAT_BODY_DEF.clone()));
pub static TEST_REQUEST_DEF: Lazy<Arc<MessageDef>> = Lazy::new(|| def("TestRequest", "1", TEST_REQUEST_BODY_DEF.clone()));
pub static RESEND_REQUEST_DEF: Lazy<Arc<MessageDef>> =
    Lazy::new(|| def("ResendRequest", "2", RESEND_REQUEST_BODY_DEF.clone()));
pub static REJECT_DEF: Lazy<Arc<MessageDef>> = Lazy::new(|| def("Reject", "3", REJECT_BODY_DEF.clone()));
pub static SEQUENCE_RESET_DEF: Lazy<Arc<MessageDef>> =
    Lazy::new(|| def("SequenceReset", "4", SEQUENCE_RESET_BODY_DEF.clone()));
pub static LOGOUT_DEF: Lazy<Arc<MessageDef>> = Lazy::new(|| def("Logout", "5", LOGOUT_BODY_DEF.clone()));

/// Register the standard session-level message set into a registry for
/// one dialect (e.g. `"FIX.4.4"`).
pub fn register_into(registry: &super::message::FixMessageRegistry, app_name: &'static str) -> anyhow::Result<()> {
    for def in [
        LOGON_DEF.clone(),
        HEARTBEAT_DEF.clone(),
        TEST_REQUEST_DEF.clone(),
        RESEND_REQUEST_DEF.clone(),
        REJECT_DEF.clone(),
        SEQUENCE_RESET_DEF.clone(),
        LOGOUT_DEF.clone(),
    ] {
        registry.register(app_name, def)?;
    }
    Ok(())
}
