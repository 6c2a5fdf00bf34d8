//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for plugging custom event handlers into the
//! runner. Each subscriber is driven by a dedicated worker loop fed by its own queue
//! in the [`Bus`](crate::events::Bus).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching, retries); they do **not** block
//!   the runner nor other subscribers.
//! - Each subscriber **declares** its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. When the queue is full, non-terminal events for
//!   that subscriber are **dropped** (warn). `End` is always delivered.
//!
//! ## Example
//! ```rust
//! use rendervisor::{Event, EventKind, Subscribe};
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Audit {
//!     async fn on_event(&self, ev: &Event) {
//!         if let EventKind::End { generation, output } = &ev.kind {
//!             let _ = (generation, output.is_success());
//!         }
//!     }
//!     fn name(&self) -> &'static str { "audit" }
//!     fn queue_capacity(&self) -> usize { 512 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{DEFAULT_SUBSCRIBER_CAPACITY, Event};

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime (prefer async I/O and cooperative waits).
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue for non-terminal events.
    fn queue_capacity(&self) -> usize {
        DEFAULT_SUBSCRIBER_CAPACITY
    }
}
