// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Heartbeat monitor (C6): a periodic liveness timer with a ping flag and a
//! missed-beat trip action, used for both the local ("ping on trip") and
//! remote ("close on trip") sides of a session.

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type TripFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type TripFn = Box<dyn Fn() -> TripFuture + Send + Sync>;

/// Handle to a running heartbeat monitor task.
pub struct HeartbeatMonitor {
    pinged: std::sync::Arc<AtomicBool>,
    missed: std::sync::Arc<AtomicU32>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    /// Start a monitor with period `interval`. Once `tolerate_missed`
    /// consecutive periods elapse without a [`HeartbeatMonitor::ping`],
    /// `on_trip` is invoked. If `stop_when_no_activity` is true the monitor
    /// stops itself after tripping once (the "remote" side — trip closes
    /// the session); otherwise it keeps running after every trip (the
    /// "local" side — trip just emits a keepalive).
    pub fn start(
        interval: Duration,
        tolerate_missed: u32,
        stop_when_no_activity: bool,
        on_trip: TripFn,
    ) -> Self {
        let pinged = std::sync::Arc::new(AtomicBool::new(true));
        let missed = std::sync::Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let task_pinged = pinged.clone();
        let task_missed = missed.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; consume it.
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {},
                }

                if task_pinged.swap(false, Ordering::SeqCst) {
                    task_missed.store(0, Ordering::SeqCst);
                    continue;
                }

                let missed_now = task_missed.fetch_add(1, Ordering::SeqCst) + 1;
                if missed_now >= tolerate_missed {
                    debug!(missed_now, tolerate_missed, "heartbeat monitor tripped");
                    task_missed.store(0, Ordering::SeqCst);
                    on_trip().await;
                    if stop_when_no_activity {
                        break;
                    }
                }
            }
        });

        Self { pinged, missed, cancel, task: Some(task) }
    }

    /// Record activity, deferring the next trip by at least one period.
    pub fn ping(&self) {
        self.pinged.store(true, Ordering::SeqCst);
        self.missed.store(0, Ordering::SeqCst);
    }

    /// Stop the monitor. Safe to call from within the trip action itself
    /// (the task observes cancellation only at its next suspension point,
    /// after `on_trip` has already returned).
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "heartbeat monitor task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn trips_after_tolerated_misses_with_no_pings() {
        let trips = Arc::new(AtomicUsize::new(0));
        let trips_clone = trips.clone();

        let mut monitor = HeartbeatMonitor::start(
            Duration::from_millis(10),
            3,
            true,
            Box::new(move || {
                let trips = trips_clone.clone();
                Box::pin(async move {
                    trips.fetch_add(1, AtomicOrdering::SeqCst);
                })
            }),
        );

        tokio::time::advance(Duration::from_millis(10) * 4).await;
        tokio::task::yield_now().await;

        assert_eq!(trips.load(AtomicOrdering::SeqCst), 1);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn never_trips_while_pinged_faster_than_interval() {
        let trips = Arc::new(AtomicUsize::new(0));
        let trips_clone = trips.clone();

        let mut monitor = HeartbeatMonitor::start(
            Duration::from_millis(10),
            2,
            false,
            Box::new(move || {
                let trips = trips_clone.clone();
                Box::pin(async move {
                    trips.fetch_add(1, AtomicOrdering::SeqCst);
                })
            }),
        );

        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(5)).await;
            monitor.ping();
        }
        tokio::task::yield_now().await;

        assert_eq!(trips.load(AtomicOrdering::SeqCst), 0);
        monitor.stop().await;
    }
}
