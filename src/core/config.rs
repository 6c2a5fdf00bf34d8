//! # Runner configuration.
//!
//! [`RunnerConfig`] centralizes the timing and capacity knobs of one
//! [`Runner`](crate::Runner). It is plain data: no file or environment loading.
//!
//! ## Clamping
//! - `subscriber_capacity = 0` → 1
//! - `watch_channel_capacity = 0` → 1

use std::time::Duration;

use crate::events::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::exec::DEFAULT_KILL_GRACE;

/// Settings for a runner instance.
///
/// ## Field semantics
/// - `debounce`: quiescence window collapsing bursts of file notifications into one trigger
/// - `subscriber_capacity`: per-subscriber bound on queued non-terminal events
/// - `kill_grace`: pause between SIGTERM and a hard kill of a cancelled render
/// - `shutdown_grace`: how long `shutdown()` waits for renders and subscriber workers
/// - `watch_channel_capacity`: buffer between the notify callback thread and the watch loop
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Trailing-edge debounce window; each relevant notification restarts it.
    pub debounce: Duration,

    /// Capacity used by [`Runner::subscribe`](crate::Runner::subscribe).
    ///
    /// Push subscribers declare their own via [`Subscribe::queue_capacity`](crate::Subscribe::queue_capacity).
    pub subscriber_capacity: usize,

    /// Time a cancelled command gets to exit after SIGTERM.
    pub kill_grace: Duration,

    /// Upper bound for a graceful shutdown.
    ///
    /// If exceeded, `shutdown()` returns `RuntimeError::GraceExceeded`.
    pub shutdown_grace: Duration,

    /// Raw notifications buffered before the watcher starts dropping them.
    ///
    /// Dropping is harmless: any notification inside a burst re-arms the debounce.
    pub watch_channel_capacity: usize,
}

impl RunnerConfig {
    #[inline]
    pub fn subscriber_capacity_clamped(&self) -> usize {
        self.subscriber_capacity.max(1)
    }

    #[inline]
    pub fn watch_channel_capacity_clamped(&self) -> usize {
        self.watch_channel_capacity.max(1)
    }
}

impl Default for RunnerConfig {
    /// Default configuration:
    ///
    /// - `debounce = 100ms`
    /// - `subscriber_capacity = 1024`
    /// - `kill_grace = 1.5s`
    /// - `shutdown_grace = 5s`
    /// - `watch_channel_capacity = 256`
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            kill_grace: DEFAULT_KILL_GRACE,
            shutdown_grace: Duration::from_secs(5),
            watch_channel_capacity: 256,
        }
    }
}
