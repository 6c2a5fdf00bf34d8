//! # Fan-out registry for runner events.
//!
//! [`Bus`] keeps one independent queue per subscriber. Publishing never waits on a
//! consumer: each queue is unbounded at the channel level, and a per-subscriber
//! `pending` counter enforces the capacity for **non-terminal** events only.
//!
//! ## Architecture
//! ```text
//! publish(kind)
//!     │  seq += 1 (under the registry lock, so seq order == delivery order)
//!     ├──► [queue 1] ──► Subscription::recv()            (pull, driver/UI)
//!     ├──► [queue 2] ──► worker ──► sub.on_event()        (push, Subscribe impl)
//!     │                     └──► panic → caught, warn
//!     └──► [queue N] ──► ...
//! ```
//!
//! ## Rules
//! - **Per-subscriber FIFO**: each endpoint observes events in publish order
//! - **Overflow**: a non-terminal event is dropped for that subscriber only (warn + counted)
//! - **End is never dropped** for an endpoint that is still subscribed
//! - **Pruning**: endpoints whose receiver was dropped are removed on the next publish
//! - **Close**: senders are dropped; receivers drain what is queued, then observe `None`

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use crate::subscribers::{Subscribe, Subscription};

use super::event::{Event, EventKind};

/// Default per-subscriber capacity for non-terminal events.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

struct Channel {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Event>,
    pending: Arc<AtomicUsize>,
    capacity: usize,
}

#[derive(Default)]
struct State {
    seq: u64,
    closed: bool,
    channels: Vec<Channel>,
    workers: Vec<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<State>,
    dropped: AtomicU64,
}

/// Registry of subscriber queues. Cheap to clone.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Bus")
            .field("seq", &state.seq)
            .field("closed", &state.closed)
            .field("subscribers", &state.channels.len())
            .finish()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Publishes `kind` to every live endpoint. Never blocks on consumers.
    ///
    /// After [`close`](Self::close) this is a no-op.
    pub fn publish(&self, kind: EventKind) {
        let label = kind.as_label();
        let generation = kind.generation();
        let mut dropped_for: Vec<Arc<str>> = Vec::new();

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.seq += 1;
            let event = Event::new(state.seq, kind);
            let terminal = event.is_terminal();

            state.channels.retain(|ch| {
                if ch.tx.is_closed() {
                    return false;
                }
                if !terminal && ch.pending.load(Ordering::Acquire) >= ch.capacity {
                    dropped_for.push(Arc::clone(&ch.name));
                    return true;
                }
                ch.pending.fetch_add(1, Ordering::AcqRel);
                if ch.tx.send(event.clone()).is_err() {
                    ch.pending.fetch_sub(1, Ordering::AcqRel);
                    return false;
                }
                true
            });
        }

        for name in dropped_for {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                subscriber = %name,
                event = label,
                generation = ?generation,
                "subscriber queue full, event dropped"
            );
        }
    }

    /// Registers a pull endpoint. `capacity` is clamped to at least 1.
    ///
    /// The endpoint only observes events published after this call.
    pub fn subscribe(&self, name: impl Into<Arc<str>>, capacity: usize) -> Subscription {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let mut state = self.inner.state.lock();
        if !state.closed {
            state.channels.push(Channel {
                name: Arc::clone(&name),
                tx,
                pending: Arc::clone(&pending),
                capacity: capacity.max(1),
            });
        }
        Subscription::new(name, rx, pending)
    }

    /// Registers a push subscriber driven by its own worker task.
    ///
    /// Must be called from within a tokio runtime. Panics inside
    /// [`Subscribe::on_event`] are caught and logged; the worker keeps going.
    pub fn attach(&self, sub: Arc<dyn Subscribe>) {
        let mut subscription = self.subscribe(sub.name(), sub.queue_capacity());
        let worker = tokio::spawn(
            async move {
                while let Some(event) = subscription.recv().await {
                    let fut = sub.on_event(&event);
                    if let Err(panic_err) = AssertUnwindSafe(fut).catch_unwind().await {
                        tracing::warn!(
                            subscriber = sub.name(),
                            info = %panic_message(&*panic_err),
                            "subscriber panicked"
                        );
                    }
                }
            }
            .with_current_subscriber(),
        );
        self.inner.state.lock().workers.push(worker);
    }

    /// Closes every endpoint and returns the push workers so the caller can await them.
    ///
    /// Idempotent; later calls return no workers.
    pub fn close(&self) -> Vec<JoinHandle<()>> {
        let mut state = self.inner.state.lock();
        state.closed = true;
        state.channels.clear();
        std::mem::take(&mut state.workers)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of endpoints that have not been pruned yet.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.channels.retain(|ch| !ch.tx.is_closed());
        state.channels.len()
    }

    /// Total events dropped across all subscribers because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Output;
    use async_trait::async_trait;
    use std::time::Duration;

    fn cancel(generation: u64) -> EventKind {
        EventKind::Cancel { generation }
    }

    fn end(generation: u64) -> EventKind {
        EventKind::End {
            generation,
            output: Arc::new(Output::default()),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order_with_increasing_seq() {
        let bus = Bus::new();
        let mut a = bus.subscribe("a", 16);
        let mut b = bus.subscribe("b", 16);
        for g in 1..=3 {
            bus.publish(cancel(g));
        }
        for sub in [&mut a, &mut b] {
            let mut last = 0;
            for g in 1..=3 {
                let ev = sub.recv().await.unwrap();
                assert_eq!(ev.generation(), Some(g));
                assert!(ev.seq > last);
                last = ev.seq;
            }
        }
    }

    #[tokio::test]
    async fn full_queue_drops_non_terminal_but_never_end() {
        let bus = Bus::new();
        let mut slow = bus.subscribe("slow", 1);

        bus.publish(cancel(1));
        bus.publish(cancel(2)); // dropped: queue at capacity
        bus.publish(end(3)); // never dropped
        bus.publish(end(4));

        assert_eq!(bus.dropped(), 1);
        let got: Vec<_> = [
            slow.recv().await.unwrap(),
            slow.recv().await.unwrap(),
            slow.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| (e.kind.as_label(), e.generation()))
        .collect();
        assert_eq!(
            got,
            vec![("cancel", Some(1)), ("end", Some(3)), ("end", Some(4))]
        );
        assert!(slow.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let bus = Bus::new();
        let keep = bus.subscribe("keep", 8);
        drop(bus.subscribe("gone", 8));
        bus.publish(cancel(1));
        assert_eq!(bus.subscriber_count(), 1);
        drop(keep);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let bus = Bus::new();
        let mut sub = bus.subscribe("s", 8);
        bus.publish(cancel(1));
        assert!(bus.close().is_empty());
        bus.publish(cancel(2));
        assert_eq!(sub.recv().await.unwrap().generation(), Some(1));
        assert!(sub.recv().await.is_none());

        let mut late = bus.subscribe("late", 8);
        assert!(late.recv().await.is_none());
    }

    struct Flaky {
        seen: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Subscribe for Flaky {
        async fn on_event(&self, event: &Event) {
            let g = event.generation().unwrap_or_default();
            if g == 2 {
                panic!("boom on {g}");
            }
            self.seen.lock().push(g);
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn push_worker_survives_panics_and_stops_on_close() {
        let bus = Bus::new();
        let flaky = Arc::new(Flaky {
            seen: Mutex::new(Vec::new()),
        });
        bus.attach(flaky.clone());
        for g in 1..=3 {
            bus.publish(cancel(g));
        }
        for worker in bus.close() {
            tokio::time::timeout(Duration::from_secs(5), worker)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(*flaky.seen.lock(), vec![1, 3]);
    }
}
