// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! FIX client session (C12): logon exchange, sequence counter, per-outbound
//! header stamping, heartbeats, and logout, layered on the generic
//! [`Session`] substrate (C7). State machine: SendLogon → AwaitLogon →
//! Dispatching → Closing.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    catalog,
    field::FixValue,
    message::{self, FixMessageRegistry, Message},
    segment::RepeatedTagPolicy,
};
use crate::{
    error::ProtocolError,
    queue::Consumer,
    reader::FixFrameReader,
    registry::Direction,
    session::{OnClose, Session, SessionOptions},
};

pub struct FixClientSession {
    session: Arc<Session<FixFrameReader>>,
    registry: Arc<FixMessageRegistry>,
    app_name: &'static str,
    begin_string: &'static str,
    sequence: AtomicU64,
    sender_comp_id: Mutex<String>,
    target_comp_id: Mutex<String>,
    sender_sub_id: Mutex<String>,
    repeated_tag_policy: RepeatedTagPolicy,
}

impl FixClientSession {
    pub async fn connect(
        addr: SocketAddr,
        begin_string: &'static str,
        app_name: &'static str,
        registry: Arc<FixMessageRegistry>,
        options: SessionOptions,
        on_close: OnClose,
    ) -> Result<Arc<Self>> {
        Self::connect_with_policy(
            addr,
            begin_string,
            app_name,
            registry,
            options,
            on_close,
            RepeatedTagPolicy::default(),
        )
        .await
    }

    /// Like [`Self::connect`], but with explicit control over how repeated
    /// tags are handled while decoding inbound segments.
    pub async fn connect_with_policy(
        addr: SocketAddr,
        begin_string: &'static str,
        app_name: &'static str,
        registry: Arc<FixMessageRegistry>,
        options: SessionOptions,
        on_close: OnClose,
        repeated_tag_policy: RepeatedTagPolicy,
    ) -> Result<Arc<Self>> {
        let session = Session::connect(addr, options, on_close).await?;
        Ok(Arc::new(Self {
            session,
            registry,
            app_name,
            begin_string,
            sequence: AtomicU64::new(1),
            sender_comp_id: Mutex::new(String::new()),
            target_comp_id: Mutex::new(String::new()),
            sender_sub_id: Mutex::new(String::new()),
            repeated_tag_policy,
        }))
    }

    fn frame_and_encode(&self, msg: &Message) -> Result<Vec<u8>> {
        let joined = msg.to_bytes()?;
        Ok(message::frame(self.begin_string, msg.def.msg_type, &joined))
    }

    /// Send a fully-formed logon message, pulling `SenderCompID`,
    /// `TargetCompID`, `SenderSubID`, and the starting sequence number
    /// from the logon's own header (not from external configuration).
    /// Awaits exactly one reply; any class other than `Logon`, or queue
    /// closure, is treated as a login refusal.
    pub async fn login(self: &Arc<Self>, logon: Message) -> Result<()> {
        {
            let header = &logon.header;
            if let Some(v) = header.get_field("SenderCompID").and_then(FixValue::as_str) {
                *self.sender_comp_id.lock().await = v.to_string();
            }
            if let Some(v) = header.get_field("TargetCompID").and_then(FixValue::as_str) {
                *self.target_comp_id.lock().await = v.to_string();
            }
            if let Some(v) = header.get_field("SenderSubID").and_then(FixValue::as_str) {
                *self.sender_sub_id.lock().await = v.to_string();
            }
            if let Some(seq) = header.get_field("MsgSeqNum").and_then(FixValue::as_int) {
                self.sequence.store(seq as u64, Ordering::SeqCst);
            }
        }

        let bytes = self.frame_and_encode(&logon)?;
        self.sequence.fetch_add(1, Ordering::SeqCst);
        self.session.send(&bytes).await?;

        let reply_bytes = self.session.queue.get().await?;
        let reply = self.decode_inbound(&reply_bytes)?;

        if reply.def.name != logon.def.name {
            self.session.close().await;
            return Err(ProtocolError::ConnectionRefused(format!(
                "expected {} reply, got {}",
                logon.def.name, reply.def.name
            ))
            .into());
        }

        let heartbeat_interval = logon
            .body
            .get_field("HeartBtInt")
            .and_then(FixValue::as_int)
            .map(|s| Duration::from_secs(s.max(1) as u64))
            .unwrap_or(Duration::from_secs(30));

        let trip_self = self.clone();
        self.session
            .start_heartbeats(
                heartbeat_interval,
                1,
                Arc::new(move || {
                    let this = trip_self.clone();
                    Box::pin(async move {
                        let _ = this.send_heartbeat(None).await;
                    })
                }),
                heartbeat_interval,
                2,
            )
            .await;

        Ok(())
    }

    fn decode_inbound(&self, bytes: &[u8]) -> Result<Message> {
        let msg_type = message::peek_msg_type(bytes)?;
        let def = self.registry.lookup_by_type(self.app_name, &msg_type, Direction::Incoming)?;
        message::decode_with_policy(def, bytes, self.repeated_tag_policy)
    }

    /// Stamp `SenderCompID`/`TargetCompID`/`SenderSubID`/`MsgSeqNum`/
    /// `SendingTime` on the header, frame, write, and ping the local
    /// heartbeat monitor unless this is a heartbeat.
    pub async fn send_msg(&self, mut msg: Message) -> Result<()> {
        msg.body.validate()?;

        let sender = self.sender_comp_id.lock().await.clone();
        let target = self.target_comp_id.lock().await.clone();
        let sub_id = self.sender_sub_id.lock().await.clone();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);

        msg.header.set_field("SenderCompID", FixValue::Str(sender))?;
        msg.header.set_field("TargetCompID", FixValue::Str(target))?;
        if !sub_id.is_empty() {
            msg.header.set_field("SenderSubID", FixValue::Str(sub_id))?;
        }
        msg.header.set_field("MsgSeqNum", FixValue::Int(seq as i64))?;
        msg.header
            .set_field("SendingTime", FixValue::Str(Utc::now().format("%Y%m%d-%H:%M:%S").to_string()))?;

        let bytes = self.frame_and_encode(&msg)?;
        self.session.send(&bytes).await?;
        if !msg.is_heartbeat() {
            self.session.ping_local_heartbeat().await;
        }
        Ok(())
    }

    pub async fn send_heartbeat(&self, test_req_id: Option<&str>) -> Result<()> {
        let mut msg = Message::new(catalog::HEARTBEAT_DEF.clone());
        if let Some(id) = test_req_id {
            msg.body.set_field("TestReqID", FixValue::Str(id.to_string()))?;
        }
        self.send_msg(msg).await
    }

    /// Attach a consumer invoked once per decoded, non-heartbeat,
    /// non-logout inbound message.
    pub async fn start_dispatching(&self, handler: Consumer<Message>) -> Result<()> {
        let registry = self.registry.clone();
        let app_name = self.app_name;
        let policy = self.repeated_tag_policy;
        self.session
            .queue
            .start_dispatching(Arc::new(move |bytes| {
                let handler = handler.clone();
                let registry = registry.clone();
                Box::pin(async move {
                    let msg_type = message::peek_msg_type(&bytes)?;
                    let def = registry.lookup_by_type(app_name, &msg_type, Direction::Incoming)?;
                    let msg = message::decode_with_policy(def, &bytes, policy)?;
                    handler(msg).await
                })
            }))
            .await
    }

    pub async fn logout(&self, text: Option<&str>) -> Result<()> {
        let mut msg = Message::new(catalog::LOGOUT_DEF.clone());
        if let Some(text) = text {
            msg.body.set_field("Text", FixValue::Str(text.to_string()))?;
        }
        self.send_msg(msg).await?;
        self.session.initiate_close().await;
        Ok(())
    }

    pub async fn close(&self) {
        self.session.close().await;
    }
}
