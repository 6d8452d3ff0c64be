// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SoupBinTCP client session (C9): login handshake, sequence bookkeeping,
//! heartbeats, and graceful logout, layered on the generic [`Session`]
//! substrate (C7).

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use tokio::sync::Mutex;

use super::messages::SoupMessage;
use crate::{
    error::ProtocolError,
    queue::Consumer,
    reader::SoupFrameReader,
    session::{OnClose, Session, SessionOptions},
};

pub struct SoupClientSession {
    session: Arc<Session<SoupFrameReader>>,
    session_id: Mutex<String>,
    sequence: AtomicU64,
    client_heartbeat_interval: Duration,
    server_heartbeat_interval: Duration,
}

impl SoupClientSession {
    pub async fn connect(
        addr: SocketAddr,
        client_heartbeat_interval: Duration,
        server_heartbeat_interval: Duration,
        options: SessionOptions,
        on_close: OnClose,
    ) -> Result<Self> {
        let session = Session::connect(addr, options, on_close).await?;
        Ok(Self {
            session,
            session_id: Mutex::new(String::new()),
            sequence: AtomicU64::new(1),
            client_heartbeat_interval,
            server_heartbeat_interval,
        })
    }

    async fn send_msg(&self, msg: &SoupMessage) -> Result<()> {
        let bytes = msg.to_bytes()?;
        self.session.send(&bytes).await?;
        if matches!(msg, SoupMessage::SequencedData(_)) {
            self.sequence.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Send `LoginRequest` and await exactly one reply. `sequence` follows
    /// the source's convention: `"1"` replays from start of day, `"0"`
    /// means live-head-only, any other value resumes from that message.
    pub async fn login(
        &self,
        user: &str,
        password: &str,
        session_name: &str,
        sequence: &str,
    ) -> Result<()> {
        let request = SoupMessage::LoginRequest {
            user: user.to_string(),
            password: password.to_string(),
            session: session_name.to_string(),
            sequence: sequence.to_string(),
        };
        self.send_msg(&request).await?;

        let reply_bytes = self.session.queue.get().await?;
        let reply = SoupMessage::from_bytes(&reply_bytes)?;

        let SoupMessage::LoginAccepted { session_id, sequence: next_sequence } = reply else {
            self.session.close().await;
            return Err(ProtocolError::ConnectionRefused(format!("{reply:?}")).into());
        };

        *self.session_id.lock().await = session_id;
        let next: u64 = next_sequence
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidMessage("non-numeric sequence in LoginAccepted".into()))?;
        self.sequence.store(next, Ordering::SeqCst);

        let heartbeat_session = self.session.clone();
        self.session
            .start_heartbeats(
                self.client_heartbeat_interval,
                1,
                Arc::new(move || {
                    let session = heartbeat_session.clone();
                    Box::pin(async move {
                        if let Ok(bytes) = SoupMessage::ClientHeartbeat.to_bytes() {
                            let _ = session.send(&bytes).await;
                        }
                    })
                }),
                self.server_heartbeat_interval,
                2,
            )
            .await;

        Ok(())
    }

    pub fn session_id_sync(&self) -> Option<String> {
        self.session_id.try_lock().ok().map(|g| g.clone())
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub async fn send_unseq_data(&self, data: &[u8]) -> Result<()> {
        self.send_msg(&SoupMessage::UnSequencedData(bytes::Bytes::copy_from_slice(data)))
            .await
    }

    pub async fn send_debug(&self, text: &str) -> Result<()> {
        self.send_msg(&SoupMessage::Debug(text.to_string())).await
    }

    /// Attach a consumer invoked once per decoded, non-heartbeat,
    /// non-logout inbound message.
    pub async fn start_dispatching(&self, handler: Consumer<SoupMessage>) -> Result<()> {
        self.session
            .queue
            .start_dispatching(Arc::new(move |bytes| {
                let handler = handler.clone();
                Box::pin(async move {
                    let msg = SoupMessage::from_bytes(&bytes)?;
                    handler(msg).await
                })
            }))
            .await
    }

    pub async fn logout(&self) -> Result<()> {
        self.send_msg(&SoupMessage::LogoutRequest).await?;
        self.session.initiate_close().await;
        Ok(())
    }

    pub async fn close(&self) {
        self.session.close().await;
    }
}
