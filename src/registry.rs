// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Message registry (C3): process-wide `(app_name, id) -> message class`
//! maps with duplicate-registration detection.
//!
//! The source keeps one dict pair per Python metaclass (`MsgIdToClsMap`,
//! `MsgNameToMsgMap`); here a single [`MessageRegistry`] backed by
//! [`DashMap`] plays the same role with atomic check-and-insert on
//! `entry()`, generic over whatever identifier type the protocol uses (a
//! `u8` indicator for the record protocols, a `String` MsgType for FIX).

use std::{fmt::Debug, hash::Hash, sync::Arc};

use anyhow::Result;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{error::ProtocolError, record::RecordDef};

/// Whether a message class is sent by the client (`Outgoing`) or received
/// from the peer (`Incoming`). Two classes that share the same dispatch id
/// but differ in direction are distinct registrations — e.g. an
/// application-defined protocol may reuse an indicator for both a
/// client-sent and a server-sent shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Everything the registry needs to know about one registered message
/// class.
#[derive(Clone, Debug)]
pub struct MessageClassInfo<Id> {
    pub app_name: &'static str,
    pub id: Id,
    pub class_name: &'static str,
    pub body: Arc<RecordDef>,
    pub direction: Direction,
}

/// A process-wide `(app_name, id, direction) -> class` registry.
///
/// Construct one `MessageRegistry` per application/protocol (e.g. one for
/// SoupBinTCP indicators, one for each FIX dialect's MsgType strings) and
/// share it via a `once_cell::sync::Lazy` static, mirroring the source's
/// module-level registry dicts.
#[derive(Debug)]
pub struct MessageRegistry<Id> {
    map: DashMap<(String, Id, Direction), MessageClassInfo<Id>>,
}

impl<Id> Default for MessageRegistry<Id> {
    fn default() -> Self {
        Self { map: DashMap::new() }
    }
}

impl<Id> MessageRegistry<Id>
where Id: Eq + Hash + Clone + Debug
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message class, failing if a *different* class already
    /// claims the same `(app_name, id, direction)`. Re-registering the
    /// identical class (same `class_name`) is a no-op success, matching
    /// modules that may be imported more than once.
    pub fn register(&self, info: MessageClassInfo<Id>) -> Result<()> {
        let key = (info.app_name.to_string(), info.id.clone(), info.direction);
        match self.map.entry(key) {
            Entry::Occupied(existing) => {
                if existing.get().class_name == info.class_name {
                    Ok(())
                } else {
                    Err(ProtocolError::DuplicateMessage {
                        app: info.app_name.to_string(),
                        id: format!("{:?}", info.id),
                        existing: existing.get().class_name.to_string(),
                        new: info.class_name.to_string(),
                    }
                    .into())
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(info);
                Ok(())
            },
        }
    }

    pub fn lookup(&self, app_name: &str, id: &Id, direction: Direction) -> Result<MessageClassInfo<Id>> {
        self.map
            .get(&(app_name.to_string(), id.clone(), direction))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                ProtocolError::UnknownMessage {
                    app: app_name.to_string(),
                    id: format!("{id:?}"),
                }
                .into()
            })
    }
}
