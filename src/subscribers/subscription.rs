//! # Pull-style event endpoint.
//!
//! A [`Subscription`] is returned by [`Runner::subscribe`](crate::Runner::subscribe).
//! It can be polled with [`recv`](Subscription::recv) or consumed as a
//! [`futures::Stream`]. Dropping it unsubscribes.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::events::Event;

/// Receive side of one subscriber queue.
#[derive(Debug)]
pub struct Subscription {
    name: Arc<str>,
    rx: mpsc::UnboundedReceiver<Event>,
    pending: Arc<AtomicUsize>,
}

impl Subscription {
    pub(crate) fn new(
        name: Arc<str>,
        rx: mpsc::UnboundedReceiver<Event>,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        Self { name, rx, pending }
    }

    /// Next event, or `None` once the runner has shut down and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        let event = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(event)
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        let event = self.rx.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(event)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Events queued and not yet received.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                this.pending.fetch_sub(1, Ordering::AcqRel);
                Poll::Ready(Some(event))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use crate::events::{Bus, EventKind};

    #[tokio::test]
    async fn stream_yields_events_then_ends() {
        let bus = Bus::new();
        let sub = bus.subscribe("stream", 8);
        bus.publish(EventKind::Cancel { generation: 7 });
        bus.publish(EventKind::Cancel { generation: 8 });
        assert_eq!(sub.pending(), 2);
        bus.close();

        let gens: Vec<_> = sub.map(|e| e.generation()).collect().await;
        assert_eq!(gens, vec![Some(7), Some(8)]);
    }

    #[tokio::test]
    async fn receiving_frees_capacity() {
        let bus = Bus::new();
        let mut sub = bus.subscribe("one", 1);
        bus.publish(EventKind::Cancel { generation: 1 });
        assert!(sub.try_recv().is_some());
        bus.publish(EventKind::Cancel { generation: 2 });
        assert_eq!(sub.try_recv().and_then(|e| e.generation()), Some(2));
        assert_eq!(bus.dropped(), 0);
    }
}
