//! Runner events: data model and fan-out bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] the four event cases plus sequence/timestamp metadata
//! - [`Bus`] per-subscriber queues with drop-and-warn for non-terminal events
//!
//! ## Quick reference
//! - **Publisher**: the runner's control loop (single writer, so publish order is causal order).
//! - **Consumers**: [`Subscription`](crate::Subscription) endpoints and
//!   [`Subscribe`](crate::Subscribe) workers attached through the runner.

mod bus;
mod event;

pub use bus::{Bus, DEFAULT_SUBSCRIBER_CAPACITY};
pub use event::{Event, EventKind};
