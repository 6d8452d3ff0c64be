// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Async session substrate (C7): transport ownership, reader lifecycle,
//! inbound queue, and the local/remote heartbeat monitor pair, shared by
//! both the SoupBinTCP (C9) and FIX (C12) client sessions.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use bytes::Bytes;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cfg::enums::DrainPolicy,
    error::ProtocolError,
    heartbeat::HeartbeatMonitor,
    queue::DispatchableQueue,
    reader::{ByteReader, FrameKind, FrameReader},
};

/// Knobs that come from [`crate::cfg::config::Config`] but aren't specific
/// to either wire protocol: whether to drain on connection loss, what to do
/// with what's drained, and the reader's defensive frame-length cap.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub graceful_shutdown: bool,
    pub drain_policy: DrainPolicy,
    pub max_frame_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { graceful_shutdown: false, drain_policy: DrainPolicy::default(), max_frame_length: usize::MAX }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    LoggingIn = 1,
    Dispatching = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Connecting,
            1 => SessionState::LoggingIn,
            2 => SessionState::Dispatching,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Invoked exactly once, when the session transitions to `Closed`.
pub type OnClose = Arc<dyn Fn() + Send + Sync>;

/// Generic async session over a framed TCP transport. `R` supplies the
/// protocol-specific frame boundaries and classification (C4); everything
/// else — queueing, heartbeats, graceful/abrupt close — is shared.
pub struct Session<R: FrameReader + 'static> {
    writer: Mutex<OwnedWriteHalf>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    state: AtomicU8,
    pub queue: Arc<DispatchableQueue<Bytes>>,
    local_heartbeat: Mutex<Option<HeartbeatMonitor>>,
    remote_heartbeat: Mutex<Option<HeartbeatMonitor>>,
    cancel: CancellationToken,
    options: SessionOptions,
    peer: SocketAddr,
    on_close: Mutex<Option<OnClose>>,
    _framer: std::marker::PhantomData<R>,
}

impl<R: FrameReader + Default + 'static> Session<R> {
    /// Establish a TCP connection and start the background reader. The
    /// caller wires `on_close` before sending anything; inbound,
    /// non-heartbeat, non-logout frames land on [`Session::queue`].
    pub async fn connect(addr: SocketAddr, options: SessionOptions, on_close: OnClose) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (r, w) = stream.into_split();
        Ok(Self::from_split(r, w, peer, options, on_close))
    }

    pub fn from_split(
        r: OwnedReadHalf,
        w: OwnedWriteHalf,
        peer: SocketAddr,
        options: SessionOptions,
        on_close: OnClose,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            writer: Mutex::new(w),
            reader_task: Mutex::new(None),
            state: AtomicU8::new(SessionState::Connecting as u8),
            queue: Arc::new(DispatchableQueue::new()),
            local_heartbeat: Mutex::new(None),
            remote_heartbeat: Mutex::new(None),
            cancel: CancellationToken::new(),
            options,
            peer,
            on_close: Mutex::new(Some(on_close)),
            _framer: std::marker::PhantomData,
        });

        let task_session = session.clone();
        let handle = tokio::spawn(async move {
            task_session.read_loop(r).await;
        });
        // `reader_task` is only ever written here, before any other task can
        // observe `session`, so a blocking lock is fine.
        *session.reader_task.try_lock().expect("uncontended at construction") = Some(handle);

        session
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    async fn read_loop(self: Arc<Self>, mut r: OwnedReadHalf) {
        use tokio::io::AsyncReadExt;

        let mut framed = ByteReader::with_max_frame_length(R::default(), self.options.max_frame_length);
        let mut buf = [0u8; 4096];
        loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = r.read(&mut buf) => match res {
                    Ok(0) => {
                        self.on_connection_lost().await;
                        break;
                    },
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "session read failed");
                        self.on_connection_lost().await;
                        break;
                    },
                },
            };

            let events = match framed.on_data(&buf[..n]) {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "frame parse error, closing session");
                    self.close().await;
                    break;
                },
            };

            if self.dispatch_events(events).await {
                break;
            }
        }
    }

    /// Returns true if the session closed as a result of processing these
    /// events. Non-heartbeat, non-logout frames are forwarded onto
    /// [`Session::queue`]; queue closure (after `close()`) is treated the
    /// same as a handler failure.
    async fn dispatch_events(&self, events: Vec<crate::reader::ReadEvent>) -> bool {
        for event in events {
            match event.kind {
                FrameKind::Heartbeat => {
                    if let Some(monitor) = self.remote_heartbeat.lock().await.as_ref() {
                        monitor.ping();
                    }
                },
                FrameKind::Logout => {
                    debug!("peer requested logout/end-of-session");
                    self.close().await;
                    return true;
                },
                FrameKind::Data => {
                    if let Some(monitor) = self.remote_heartbeat.lock().await.as_ref() {
                        monitor.ping();
                    }
                    if let Err(e) = self.queue.put(event.bytes).await {
                        warn!(error = %e, "failed to enqueue inbound message, closing session");
                        self.close().await;
                        return true;
                    }
                },
            }
        }
        false
    }

    async fn on_connection_lost(&self) {
        debug!("connection lost");
        self.close().await;
    }

    /// Start both heartbeat monitors: the local side re-sends a keepalive
    /// on trip and keeps running; the remote side closes the session on
    /// trip and stops.
    pub async fn start_heartbeats(
        self: &Arc<Self>,
        local_interval: Duration,
        local_tolerate_missed: u32,
        on_local_trip: Arc<dyn Fn() -> futures_trip::TripFuture + Send + Sync>,
        remote_interval: Duration,
        remote_tolerate_missed: u32,
    ) {
        let local_trip = on_local_trip.clone();
        let local = HeartbeatMonitor::start(
            local_interval,
            local_tolerate_missed,
            false,
            Box::new(move || local_trip()),
        );
        *self.local_heartbeat.lock().await = Some(local);

        let remote_session = self.clone();
        let remote = HeartbeatMonitor::start(
            remote_interval,
            remote_tolerate_missed,
            true,
            Box::new(move || {
                let session = remote_session.clone();
                Box::pin(async move {
                    warn!("remote heartbeat monitor tripped, closing session");
                    session.close().await;
                })
            }),
        );
        *self.remote_heartbeat.lock().await = Some(remote);
    }

    /// Ping the local heartbeat monitor, deferring the next keepalive.
    pub async fn ping_local_heartbeat(&self) {
        if let Some(monitor) = self.local_heartbeat.lock().await.as_ref() {
            monitor.ping();
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(ProtocolError::StateError("send on closed session".into()).into());
        }
        let mut w = self.writer.lock().await;
        w.write_all(bytes).await.map_err(|e| anyhow!(e))?;
        self.ping_local_heartbeat().await;
        Ok(())
    }

    /// Schedule an asynchronous close; safe to call more than once.
    pub async fn initiate_close(self: &Arc<Self>) {
        if self.state() == SessionState::Closed || self.state() == SessionState::Closing {
            return;
        }
        self.set_state(SessionState::Closing);
        let session = self.clone();
        tokio::spawn(async move {
            session.close().await;
        });
    }

    /// Tear down the queue, both monitors, and the reader, then close the
    /// transport and invoke the on-close hook. Idempotent.
    pub async fn close(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        self.set_state(SessionState::Closed);
        self.cancel.cancel();

        // A graceful close lets the dispatcher finish delivering whatever
        // was already read off the wire before the peer went away, unless
        // the configured policy says to discard it; an abrupt close always
        // drops it.
        self.queue.stop(self.options.graceful_shutdown && !self.options.drain_policy.discard()).await;
        if let Some(mut monitor) = self.local_heartbeat.lock().await.take() {
            monitor.stop().await;
        }
        if let Some(mut monitor) = self.remote_heartbeat.lock().await.take() {
            monitor.stop().await;
        }
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }

        {
            let mut w = self.writer.lock().await;
            let _ = w.shutdown().await;
        }

        if let Some(hook) = self.on_close.lock().await.take() {
            hook();
        }
    }
}

/// Tiny private re-export to keep the `start_heartbeats` signature
/// readable without leaking `Pin<Box<dyn Future<...>>>` plumbing at every
/// call site.
mod futures_trip {
    use std::{future::Future, pin::Pin};

    pub type TripFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use tokio::net::TcpListener;

    use super::*;
    use crate::reader::SoupFrameReader;

    #[tokio::test]
    async fn close_is_idempotent_and_invokes_hook_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let accept = tokio::spawn(async move { listener.accept().await.expect("accept").0 });
        let client = TcpStream::connect(addr).await.expect("connect");
        let server = accept.await.expect("join");
        let (r, w) = client.into_split();
        drop(server);

        let closed = Arc::new(AtomicUsize::new(0));
        let closed_clone = closed.clone();

        let session: Arc<Session<SoupFrameReader>> = Session::from_split(
            r,
            w,
            "127.0.0.1:1".parse().unwrap(),
            SessionOptions::default(),
            Arc::new(move || {
                closed_clone.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        session.close().await;
        session.close().await;
        assert_eq!(closed.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn graceful_close_delivers_already_enqueued_message_to_dispatcher() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let accept = tokio::spawn(async move { listener.accept().await.expect("accept").0 });
        let client = TcpStream::connect(addr).await.expect("connect");
        let server = accept.await.expect("join");
        let (r, w) = client.into_split();
        drop(server);

        let session: Arc<Session<SoupFrameReader>> = Session::from_split(
            r,
            w,
            "127.0.0.1:1".parse().unwrap(),
            SessionOptions { graceful_shutdown: true, ..SessionOptions::default() },
            Arc::new(|| {}),
        );

        session.queue.put(Bytes::from_static(b"already-read")).await.expect("put");

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        session
            .queue
            .start_dispatching(Arc::new(move |_item| {
                let seen = seen_clone.clone();
                Box::pin(async move {
                    seen.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(())
                })
            }))
            .await
            .expect("start dispatching");

        session.close().await;
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abrupt_close_discards_already_enqueued_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let accept = tokio::spawn(async move { listener.accept().await.expect("accept").0 });
        let client = TcpStream::connect(addr).await.expect("connect");
        let server = accept.await.expect("join");
        let (r, w) = client.into_split();
        drop(server);

        let session: Arc<Session<SoupFrameReader>> =
            Session::from_split(r, w, "127.0.0.1:1".parse().unwrap(), SessionOptions::default(), Arc::new(|| {}));

        session.queue.put(Bytes::from_static(b"already-read")).await.expect("put");

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        session
            .queue
            .start_dispatching(Arc::new(move |_item| {
                let seen = seen_clone.clone();
                Box::pin(async move {
                    seen.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(())
                })
            }))
            .await
            .expect("start dispatching");

        session.close().await;
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 0);
    }
}
