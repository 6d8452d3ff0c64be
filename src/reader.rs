// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Byte reader (C4): turns a rolling byte buffer into a stream of classified
//! frames, tolerant of arbitrary TCP chunk boundaries.
//!
//! [`FrameReader`] only knows how to find the next frame boundary and
//! classify it (data / heartbeat / logout); turning the payload into a
//! typed message is left to the protocol-specific layer above (C8/C11) so
//! this module stays reusable across SoupBinTCP and FIX.

use anyhow::Result;
use bytes::{Bytes, BytesMut};

use crate::error::ProtocolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Heartbeat,
    Logout,
}

/// Protocol-specific framing: find one complete frame at the front of
/// `buf`, or report that more bytes are needed.
pub trait FrameReader: Send {
    /// Returns `Some((frame_len, kind))` if a full frame starts at
    /// `buf[0]`; `None` if `buf` doesn't yet hold a complete frame.
    fn try_frame(&self, buf: &[u8]) -> Result<Option<(usize, FrameKind)>>;
}

/// SoupBinTCP framing: 2-byte big-endian length, 1-byte ASCII indicator,
/// then `length - 1` payload bytes.
#[derive(Default)]
pub struct SoupFrameReader;

impl FrameReader for SoupFrameReader {
    fn try_frame(&self, buf: &[u8]) -> Result<Option<(usize, FrameKind)>> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if len == 0 {
            return Err(ProtocolError::InvalidMessage("SoupBinTCP frame length is zero".into()).into());
        }
        let total = 2 + len;
        if buf.len() < total {
            return Ok(None);
        }
        let indicator = buf[2];
        let kind = match indicator {
            b'R' | b'H' => FrameKind::Heartbeat,
            b'Z' | b'O' => FrameKind::Logout,
            b'L' | b'A' | b'J' | b'S' | b'U' | b'+' => FrameKind::Data,
            other => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "unknown SoupBinTCP indicator '{}'",
                    other as char
                ))
                .into());
            },
        };
        Ok(Some((total, kind)))
    }
}

/// FIX tag=value framing: locate `35=`, then `9=<bodylen>`, and compute the
/// exact message span from the header + declared body length + the fixed
/// 7-byte trailer (`10=NNN<SOH>`).
#[derive(Default)]
pub struct FixFrameReader;

const SOH: u8 = 0x01;
const TRAILER_LEN: usize = 7;

impl FixFrameReader {
    fn find_tag(buf: &[u8], tag: &[u8]) -> Option<usize> {
        buf.windows(tag.len()).position(|w| w == tag)
    }
}

impl FrameReader for FixFrameReader {
    fn try_frame(&self, buf: &[u8]) -> Result<Option<(usize, FrameKind)>> {
        let Some(body_len_start) = Self::find_tag(buf, b"9=") else {
            return Ok(None);
        };
        let value_start = body_len_start + 2;
        let Some(soh_rel) = buf[value_start..].iter().position(|&b| b == SOH) else {
            return Ok(None);
        };
        let value_end = value_start + soh_rel;
        let body_len: usize = std::str::from_utf8(&buf[value_start..value_end])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProtocolError::InvalidMessage("malformed FIX BodyLength".into()))?;

        let header_end = value_end + 1; // position right after the BodyLength field's SOH
        let total = header_end + body_len + TRAILER_LEN;
        if buf.len() < total {
            return Ok(None);
        }

        let Some(msg_type_rel) = Self::find_tag(&buf[..total], b"35=") else {
            return Err(ProtocolError::InvalidMessage("FIX message missing 35= MsgType".into()).into());
        };
        let type_start = msg_type_rel + 3;
        let type_end = buf[type_start..total]
            .iter()
            .position(|&b| b == SOH)
            .map(|p| type_start + p)
            .ok_or_else(|| ProtocolError::InvalidMessage("FIX MsgType field not SOH-terminated".into()))?;
        let msg_type = &buf[type_start..type_end];

        let kind = match msg_type {
            b"0" => FrameKind::Heartbeat,
            b"5" => FrameKind::Logout,
            _ => FrameKind::Data,
        };
        Ok(Some((total, kind)))
    }
}

/// Outcome of feeding bytes through [`ByteReader::on_data`].
pub struct ReadEvent {
    pub bytes: Bytes,
    pub kind: FrameKind,
}

/// Drives a [`FrameReader`] over a growing byte buffer, classifying and
/// emitting complete frames as they become available.
pub struct ByteReader<R: FrameReader> {
    framer: R,
    buf: BytesMut,
    draining: bool,
    drained: Vec<ReadEvent>,
    max_frame_length: usize,
}

impl<R: FrameReader> ByteReader<R> {
    /// No cap on buffered-but-unframed bytes.
    pub fn new(framer: R) -> Self {
        Self::with_max_frame_length(framer, usize::MAX)
    }

    /// Reject input once the unframed buffer grows past `max_frame_length`
    /// bytes without yielding a complete frame — defense against a peer
    /// declaring a runaway length prefix.
    pub fn with_max_frame_length(framer: R, max_frame_length: usize) -> Self {
        Self { framer, buf: BytesMut::new(), draining: false, drained: Vec::new(), max_frame_length }
    }

    /// Extend the buffer and pull out every complete frame currently
    /// available, in order. While draining (see
    /// [`ByteReader::buffer_until_drained`]) events are stashed instead of
    /// returned.
    pub fn on_data(&mut self, bytes: &[u8]) -> Result<Vec<ReadEvent>> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.max_frame_length {
            return Err(ProtocolError::InvalidMessage(format!(
                "buffered frame length {} exceeds configured maximum {}",
                self.buf.len(),
                self.max_frame_length
            ))
            .into());
        }
        let mut events = Vec::new();
        loop {
            match self.framer.try_frame(&self.buf)? {
                None => break,
                Some((len, kind)) => {
                    let frame = self.buf.split_to(len).freeze();
                    let event = ReadEvent { bytes: frame, kind };
                    if self.draining {
                        self.drained.push(event);
                    } else {
                        events.push(event);
                    }
                },
            }
        }
        Ok(events)
    }

    /// Scope that suspends frame emission while still accepting bytes into
    /// the buffer (so the peer's writes don't stall). On exit, drained
    /// frames are either replayed (returned) or discarded, per `discard`.
    /// Nested calls are rejected.
    pub fn buffer_until_drained<F>(&mut self, discard: bool, scope: F) -> Result<Vec<ReadEvent>>
    where F: FnOnce(&mut Self) -> Result<()> {
        if self.draining {
            return Err(ProtocolError::StateError("buffer_until_drained already active".into()).into());
        }
        self.draining = true;
        let result = scope(self);
        self.draining = false;
        let drained = std::mem::take(&mut self.drained);
        result?;
        Ok(if discard { Vec::new() } else { drained })
    }
}
