// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Dispatchable message queue (C5): a FIFO with an optional single-consumer
//! dispatcher, a pause scope, and a buffer-until-drained shutdown hook.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::Result;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ProtocolError;

type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A queue item consumer used by [`DispatchableQueue::start_dispatching`].
pub type Consumer<T> = Arc<dyn Fn(T) -> BoxFuture<'static> + Send + Sync>;

pub struct DispatchableQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
    dispatching: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    /// Whether the dispatcher loop should keep consuming items already
    /// sitting in the channel after `cancel` fires, instead of stopping
    /// immediately. Set by [`DispatchableQueue::stop`].
    drain_on_cancel: Arc<AtomicBool>,
    dispatcher: Mutex<Option<Consumer<T>>>,
    dispatcher_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Send + 'static> DispatchableQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            dispatching: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            drain_on_cancel: Arc::new(AtomicBool::new(false)),
            dispatcher: Mutex::new(None),
            dispatcher_task: Mutex::new(None),
        }
    }

    pub fn put_nowait(&self, item: T) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::EndOfQueue.into());
        }
        self.tx
            .send(item)
            .map_err(|_| ProtocolError::EndOfQueue.into())
    }

    pub async fn put(&self, item: T) -> Result<()> {
        self.put_nowait(item)
    }

    /// Blocking receive; only legal while no dispatcher is attached.
    pub async fn get(&self) -> Result<T> {
        if self.dispatching.load(Ordering::SeqCst) {
            return Err(
                ProtocolError::StateError("get() while a dispatcher is active".into()).into(),
            );
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ProtocolError::EndOfQueue.into()),
            item = rx.recv() => item.ok_or_else(|| ProtocolError::EndOfQueue.into()),
        }
    }

    pub fn get_nowait(&self) -> Result<T> {
        if self.dispatching.load(Ordering::SeqCst) {
            return Err(
                ProtocolError::StateError("get_nowait() while a dispatcher is active".into())
                    .into(),
            );
        }
        let mut rx = self
            .rx
            .try_lock()
            .map_err(|_| ProtocolError::StateError("queue busy".into()))?;
        match rx.try_recv() {
            Ok(item) => Ok(item),
            Err(mpsc::error::TryRecvError::Empty) => {
                Err(ProtocolError::StateError("no message available".into()).into())
            },
            Err(mpsc::error::TryRecvError::Disconnected) => Err(ProtocolError::EndOfQueue.into()),
        }
    }

    /// Attach a consumer that is awaited once per dequeued item. Exceptions
    /// from the consumer are logged and the dispatcher keeps running.
    pub async fn start_dispatching(&self, f: Consumer<T>) -> Result<()> {
        if self.dispatching.swap(true, Ordering::SeqCst) {
            return Err(ProtocolError::StateError("dispatcher already running".into()).into());
        }
        *self.dispatcher.lock().await = Some(f);
        self.spawn_dispatcher().await;
        Ok(())
    }

    async fn spawn_dispatcher(&self) {
        let rx = self.rx.clone();
        let f = self.dispatcher.lock().await.clone();
        let Some(f) = f else { return };
        let cancel = self.cancel.clone();
        let drain_on_cancel = self.drain_on_cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let item = {
                    let mut rx = rx.lock().await;
                    if cancel.is_cancelled() {
                        // Nothing more will ever be sent; either keep
                        // delivering what's already queued, or stop now.
                        if drain_on_cancel.load(Ordering::SeqCst) { rx.try_recv().ok() } else { None }
                    } else {
                        tokio::select! {
                            _ = cancel.cancelled() => continue,
                            item = rx.recv() => item,
                        }
                    }
                };
                let Some(item) = item else { break };
                if let Err(e) = f(item).await {
                    warn!(error = %e, "dispatcher handler failed, continuing");
                }
            }
        });
        *self.dispatcher_task.lock().await = Some(handle);
    }

    /// Stop the dispatcher. If `drain` is set, the task first delivers
    /// every item already sitting in the channel before exiting; otherwise
    /// it stops as soon as it notices cancellation, leaving queued items
    /// unconsumed.
    async fn stop_dispatcher_task(&self) {
        self.dispatching.store(false, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Scoped pause: stop the consumer for the duration of `scope`, then
    /// restart it (if one was attached) on return.
    pub async fn pause_dispatching<F, Fut>(&self, scope: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let was_dispatching = self.dispatching.swap(false, Ordering::SeqCst);
        if was_dispatching
            && let Some(handle) = self.dispatcher_task.lock().await.take()
        {
            handle.abort();
            let _ = handle.await;
        }

        let result = scope().await;

        if was_dispatching {
            self.dispatching.store(true, Ordering::SeqCst);
            self.spawn_dispatcher().await;
        }
        result
    }

    /// Scoped drain barrier: pause dispatch, run `scope`, then either
    /// replay (resume dispatching — items queued during the scope are
    /// delivered in order) or discard (drop everything queued during the
    /// scope) depending on `discard`.
    pub async fn buffer_until_drained<F, Fut>(&self, discard: bool, scope: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.pause_dispatching(move || async move {
            let result = scope().await;
            if discard {
                let mut rx = self.rx.lock().await;
                while rx.try_recv().is_ok() {}
            }
            result
        })
        .await
    }

    /// Close the queue; subsequent `get`/`put` calls fail with
    /// [`ProtocolError::EndOfQueue`]. When `drain` is set, any messages
    /// already enqueued but not yet handed to the dispatcher are delivered
    /// before the dispatcher stops, instead of being discarded.
    pub async fn stop(&self, drain: bool) {
        self.closed.store(true, Ordering::SeqCst);
        self.drain_on_cancel.store(drain, Ordering::SeqCst);
        self.cancel.cancel();
        self.stop_dispatcher_task().await;
    }
}

impl<T: Send + 'static> Default for DispatchableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn get_after_close_raises_end_of_queue() {
        let q: DispatchableQueue<u32> = DispatchableQueue::new();
        q.stop(false).await;
        let err = q.get().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::EndOfQueue)
        ));
    }

    #[tokio::test]
    async fn get_while_dispatching_is_state_error() {
        let q: Arc<DispatchableQueue<u32>> = Arc::new(DispatchableQueue::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        q.start_dispatching(Arc::new(move |_item: u32| {
            let seen = seen_clone.clone();
            Box::pin(async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }))
        .await
        .expect("start dispatching");

        let err = q.get().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::StateError(_))
        ));

        q.put(1).await.expect("put");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        q.stop(false).await;
    }

    #[tokio::test]
    async fn fifo_order_preserved_without_dispatcher() {
        let q: DispatchableQueue<u32> = DispatchableQueue::new();
        q.put(1).await.expect("put 1");
        q.put(2).await.expect("put 2");
        q.put(3).await.expect("put 3");
        assert_eq!(q.get().await.expect("get 1"), 1);
        assert_eq!(q.get().await.expect("get 2"), 2);
        assert_eq!(q.get().await.expect("get 3"), 3);
    }
}
