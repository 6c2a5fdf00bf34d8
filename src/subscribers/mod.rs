//! # Event subscribers.
//!
//! Two ways to consume runner events, both backed by an independent queue in the
//! [`Bus`](crate::events::Bus):
//!
//! - **Pull**: [`Subscription`] from [`Runner::subscribe`](crate::Runner::subscribe);
//!   `recv().await` or use it as a `Stream`.
//! - **Push**: implement [`Subscribe`] and pass it to the runner builder or
//!   [`Runner::attach`](crate::Runner::attach); a worker task calls `on_event` for you.
//!
//! ## Architecture
//! ```text
//! Runner actor ── publish(kind) ──► Bus
//!                                    ├──► Subscription ──► driver / UI
//!                                    ├──► worker ──► LogWriter::on_event   (tracing)
//!                                    ├──► worker ──► SinkSubscriber        (Output → Sink)
//!                                    └──► worker ──► custom Subscribe impl
//! ```
//!
//! ## Built-in subscribers
//! - `LogWriter` structured `tracing` line per event (`logging` feature)
//! - [`SinkSubscriber`] delivers completed outputs to a [`Sink`]

#[cfg(feature = "logging")]
mod log;
mod sink;
mod subscribe;
mod subscription;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use sink::{
    BatchSink, LatestOutput, OutputSink, Rendered, Sink, SinkSubscriber, select_sink,
};
pub use subscribe::Subscribe;
pub use subscription::Subscription;
