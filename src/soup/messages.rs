// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SoupBinTCP wire messages (C8): the ten framed message kinds, each
//! prefixed by a 2-byte big-endian length and a 1-byte ASCII indicator.
//! Fixed-layout bodies (login handshake) are modeled as [`Record`]s built
//! on the C1/C2 primitive/record codec; variable-length bodies (data,
//! debug) carry raw bytes directly, and the empty-bodied control messages
//! carry nothing.

use std::sync::Arc;

use anyhow::{Result, bail};
use bytes::Bytes;
use once_cell::sync::Lazy;

use crate::{
    codec::{FieldType, Value},
    error::ProtocolError,
    record::{FieldDef, Record, RecordDef},
    registry::{Direction, MessageClassInfo, MessageRegistry},
};

pub const APP_NAME: &str = "soup";

pub static LOGIN_REQUEST_DEF: Lazy<Arc<RecordDef>> = Lazy::new(|| {
    RecordDef::new("LoginRequest", vec![
        FieldDef::new("user", FieldType::FixedAsciiString { length: 6, right_justified: false }),
        FieldDef::new("password", FieldType::FixedAsciiString { length: 10, right_justified: false }),
        FieldDef::new("session", FieldType::FixedAsciiString { length: 10, right_justified: false }),
        FieldDef::new("sequence", FieldType::FixedAsciiString { length: 20, right_justified: true }),
    ])
});

pub static LOGIN_ACCEPTED_DEF: Lazy<Arc<RecordDef>> = Lazy::new(|| {
    RecordDef::new("LoginAccepted", vec![
        FieldDef::new("session_id", FieldType::FixedAsciiString { length: 10, right_justified: false }),
        FieldDef::new("sequence", FieldType::FixedAsciiString { length: 20, right_justified: true }),
    ])
});

pub static LOGIN_REJECTED_DEF: Lazy<Arc<RecordDef>> = Lazy::new(|| {
    RecordDef::new("LoginRejected", vec![FieldDef::new("reason", FieldType::CharAscii)])
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginRejectReason {
    NotAuthorized,
    SessionNotAvailable,
}

impl LoginRejectReason {
    fn from_char(c: char) -> Result<Self> {
        match c {
            'A' => Ok(LoginRejectReason::NotAuthorized),
            'S' => Ok(LoginRejectReason::SessionNotAvailable),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown login reject reason '{other}'"
            ))
            .into()),
        }
    }

    fn to_char(self) -> char {
        match self {
            LoginRejectReason::NotAuthorized => 'A',
            LoginRejectReason::SessionNotAvailable => 'S',
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SoupMessage {
    LoginRequest { user: String, password: String, session: String, sequence: String },
    LoginAccepted { session_id: String, sequence: String },
    LoginRejected(LoginRejectReason),
    SequencedData(Bytes),
    UnSequencedData(Bytes),
    Debug(String),
    ClientHeartbeat,
    ServerHeartbeat,
    EndOfSession,
    LogoutRequest,
}

impl SoupMessage {
    pub fn indicator(&self) -> u8 {
        match self {
            SoupMessage::LoginRequest { .. } => b'L',
            SoupMessage::LoginAccepted { .. } => b'A',
            SoupMessage::LoginRejected(_) => b'J',
            SoupMessage::SequencedData(_) => b'S',
            SoupMessage::UnSequencedData(_) => b'U',
            SoupMessage::Debug(_) => b'+',
            SoupMessage::ClientHeartbeat => b'R',
            SoupMessage::ServerHeartbeat => b'H',
            SoupMessage::EndOfSession => b'Z',
            SoupMessage::LogoutRequest => b'O',
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, SoupMessage::ClientHeartbeat | SoupMessage::ServerHeartbeat)
    }

    pub fn is_logout(&self) -> bool {
        matches!(self, SoupMessage::EndOfSession | SoupMessage::LogoutRequest)
    }

    fn payload(&self) -> Result<Vec<u8>> {
        Ok(match self {
            SoupMessage::LoginRequest { user, password, session, sequence } => {
                let mut rec = Record::default_for(LOGIN_REQUEST_DEF.clone());
                rec.set("user", Value::Str(user.clone()))?;
                rec.set("password", Value::Str(password.clone()))?;
                rec.set("session", Value::Str(session.clone()))?;
                rec.set("sequence", Value::Str(sequence.clone()))?;
                rec.encode()?
            },
            SoupMessage::LoginAccepted { session_id, sequence } => {
                let mut rec = Record::default_for(LOGIN_ACCEPTED_DEF.clone());
                rec.set("session_id", Value::Str(session_id.clone()))?;
                rec.set("sequence", Value::Str(sequence.clone()))?;
                rec.encode()?
            },
            SoupMessage::LoginRejected(reason) => {
                let mut rec = Record::default_for(LOGIN_REJECTED_DEF.clone());
                rec.set("reason", Value::Char(reason.to_char()))?;
                rec.encode()?
            },
            SoupMessage::SequencedData(data) | SoupMessage::UnSequencedData(data) => data.to_vec(),
            SoupMessage::Debug(text) => text.as_bytes().to_vec(),
            SoupMessage::ClientHeartbeat
            | SoupMessage::ServerHeartbeat
            | SoupMessage::EndOfSession
            | SoupMessage::LogoutRequest => Vec::new(),
        })
    }

    /// Frame as `length(2, BE) ++ indicator ++ payload`, where `length`
    /// counts the indicator byte plus the payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = self.payload()?;
        let len: u16 = (1 + payload.len())
            .try_into()
            .map_err(|_| ProtocolError::InvalidMessage("soup message payload too long".into()))?;
        let mut out = Vec::with_capacity(3 + payload.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.push(self.indicator());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode a complete frame (as produced by [`crate::reader::SoupFrameReader`]).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 3 {
            bail!(ProtocolError::InvalidMessage("soup frame shorter than header".into()));
        }
        let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        if bytes.len() != 2 + len {
            bail!(ProtocolError::InvalidMessage(format!(
                "soup frame length mismatch: header says {len}, have {}",
                bytes.len() - 2
            )));
        }
        let indicator = bytes[2];
        let body = &bytes[3..];

        Ok(match indicator {
            b'L' => {
                let (_, rec) = Record::decode(LOGIN_REQUEST_DEF.clone(), body)?;
                SoupMessage::LoginRequest {
                    user: str_field(&rec, "user")?,
                    password: str_field(&rec, "password")?,
                    session: str_field(&rec, "session")?,
                    sequence: str_field(&rec, "sequence")?,
                }
            },
            b'A' => {
                let (_, rec) = Record::decode(LOGIN_ACCEPTED_DEF.clone(), body)?;
                SoupMessage::LoginAccepted {
                    session_id: str_field(&rec, "session_id")?,
                    sequence: str_field(&rec, "sequence")?,
                }
            },
            b'J' => {
                let (_, rec) = Record::decode(LOGIN_REJECTED_DEF.clone(), body)?;
                let Value::Char(c) = rec.get("reason")? else {
                    unreachable!("reason field is always Char");
                };
                SoupMessage::LoginRejected(LoginRejectReason::from_char(*c)?)
            },
            b'S' => SoupMessage::SequencedData(Bytes::copy_from_slice(body)),
            b'U' => SoupMessage::UnSequencedData(Bytes::copy_from_slice(body)),
            b'+' => SoupMessage::Debug(
                std::str::from_utf8(body)
                    .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?
                    .to_string(),
            ),
            b'R' => SoupMessage::ClientHeartbeat,
            b'H' => SoupMessage::ServerHeartbeat,
            b'Z' => SoupMessage::EndOfSession,
            b'O' => SoupMessage::LogoutRequest,
            other => {
                bail!(ProtocolError::InvalidMessage(format!(
                    "unknown soup indicator '{}'",
                    other as char
                )));
            },
        })
    }
}

fn str_field(rec: &Record, name: &str) -> Result<String> {
    match rec.get(name)? {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ProtocolError::TypeMismatch {
            field: name.to_string(),
            expected: "str".to_string(),
            actual: other.kind().to_string(),
        }
        .into()),
    }
}

/// Register the fixed-layout message shapes into a shared registry, so
/// decoders can look up `(app, indicator, direction) -> RecordDef`
/// generically alongside application-defined ITCH/OUCH record classes.
pub fn register_into(registry: &MessageRegistry<u8>) -> Result<()> {
    registry.register(MessageClassInfo {
        app_name: APP_NAME,
        id: b'L',
        class_name: "LoginRequest",
        body: LOGIN_REQUEST_DEF.clone(),
        direction: Direction::Outgoing,
    })?;
    registry.register(MessageClassInfo {
        app_name: APP_NAME,
        id: b'A',
        class_name: "LoginAccepted",
        body: LOGIN_ACCEPTED_DEF.clone(),
        direction: Direction::Incoming,
    })?;
    registry.register(MessageClassInfo {
        app_name: APP_NAME,
        id: b'J',
        class_name: "LoginRejected",
        body: LOGIN_REJECTED_DEF.clone(),
        direction: Direction::Incoming,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_matches_literal_fixture() {
        let msg = SoupMessage::LoginRequest {
            user: "nouser".to_string(),
            password: "nopassword".to_string(),
            session: "session".to_string(),
            sequence: "1".to_string(),
        };
        let bytes = msg.to_bytes().expect("encode");

        let mut expected = vec![0x00, 0x2f, b'L'];
        expected.extend_from_slice(b"nouser");
        expected.extend_from_slice(b"nopassword");
        expected.extend_from_slice(b"session   ");
        expected.extend_from_slice(&vec![b' '; 19]);
        expected.push(b'1');

        assert_eq!(bytes, expected);
        assert_eq!(bytes.len(), 49);

        let decoded = SoupMessage::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn sequenced_data_round_trips_and_empty_payload_decodes() {
        let msg = SoupMessage::SequencedData(Bytes::from_static(b"test_txt"));
        let bytes = msg.to_bytes().expect("encode");
        assert_eq!(bytes, b"\x00\x09Stest_txt");

        let decoded = SoupMessage::from_bytes(b"\x00\x01S").expect("decode empty");
        assert_eq!(decoded, SoupMessage::SequencedData(Bytes::new()));
    }

    #[test]
    fn unknown_indicator_is_invalid_message() {
        let err = SoupMessage::from_bytes(b"\x00\x02>").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn heartbeat_and_logout_classification() {
        assert!(SoupMessage::ClientHeartbeat.is_heartbeat());
        assert!(SoupMessage::ServerHeartbeat.is_heartbeat());
        assert!(SoupMessage::EndOfSession.is_logout());
        assert!(SoupMessage::LogoutRequest.is_logout());
        assert!(!SoupMessage::LogoutRequest.is_heartbeat());
    }
}
