// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Crate-wide error taxonomy.
//!
//! Internal call chains return `anyhow::Result<T>`; every leaf error raised
//! by the codec, registry, reader, queue, or session layers is a
//! [`ProtocolError`] variant so callers can `downcast_ref` when they need to
//! branch on error kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("duplicate message registration for app={app} id={id}: {existing} vs {new}")]
    DuplicateMessage {
        app: String,
        id: String,
        existing: String,
        new: String,
    },

    #[error("unknown message app={app} id={id}")]
    UnknownMessage { app: String, id: String },

    #[error("type mismatch for field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("mandatory fields missing: {0:?}")]
    MandatoryFieldMissing(Vec<String>),

    #[error("state error: {0}")]
    StateError(String),

    #[error("end of queue")]
    EndOfQueue,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(std::time::Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
