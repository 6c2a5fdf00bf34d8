//! Bounded diagnostic log history.
//!
//! ## Contents
//! - [`CircularLogBuffer`] fixed-capacity ring of byte records, safe to share across threads
//! - [`BufferMakeWriter`] `tracing-subscriber` writer that turns each log event into one record
//! - [`dispatch`] builds a [`tracing::Dispatch`] that writes into a buffer
//!
//! The buffer is owned by the driver, not by the runner: the runner only receives a
//! `Dispatch` and attaches it to the tasks it spawns.

mod buffer;
mod writer;

pub use buffer::{CircularLogBuffer, DEFAULT_LOG_CAPACITY};
pub use writer::{BufferMakeWriter, BufferWriter, dispatch};
