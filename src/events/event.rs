//! # Events emitted by the runner.
//!
//! [`EventKind`] is a closed set of four cases:
//! - **Start**: a generation began executing with the given profile
//! - **End**: a generation finished (success, failure, or watch failure)
//! - **Configure**: the profile override or watch state changed
//! - **Cancel**: a generation was superseded or stopped; its result will be discarded
//!
//! The [`Event`] wrapper adds a bus-local sequence number and a wall-clock timestamp.
//! Payloads are `Arc`-shared, so cloning an event per subscriber is cheap.
//!
//! ## Ordering guarantees
//! `seq` increases strictly in publish order. For any generation `g`, `Start(g)` is
//! published before `Cancel(g)` or `End(g)`, and at most one `End(g)` ever exists.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use rendervisor::{EventKind, Profile};
//!
//! let kind = EventKind::Start { generation: 1, profile: Arc::new(Profile::new("echo", "echo")) };
//! assert_eq!(kind.generation(), Some(1));
//! assert_eq!(kind.as_label(), "start");
//! assert!(!kind.is_terminal());
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use crate::exec::Output;
use crate::profiles::Profile;

/// Classification and payload of a runner event.
#[derive(Clone, Debug)]
pub enum EventKind {
    /// Generation `generation` started with `profile`.
    Start {
        generation: u64,
        profile: Arc<Profile>,
    },

    /// Generation `generation` completed. Never dropped by the bus.
    End {
        generation: u64,
        output: Arc<Output>,
    },

    /// Effective configuration changed.
    ///
    /// `profile` is the forced profile, or `None` when profiles are auto-selected by rules.
    Configure {
        profile: Option<Arc<Profile>>,
        watching: bool,
    },

    /// Generation `generation` was cancelled; no `End` follows for it.
    Cancel { generation: u64 },
}

impl EventKind {
    /// Generation the event refers to, if any.
    pub fn generation(&self) -> Option<u64> {
        match self {
            EventKind::Start { generation, .. }
            | EventKind::End { generation, .. }
            | EventKind::Cancel { generation } => Some(*generation),
            EventKind::Configure { .. } => None,
        }
    }

    /// True for `End`: the only kind the bus must never drop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::End { .. })
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::Start { .. } => "start",
            EventKind::End { .. } => "end",
            EventKind::Configure { .. } => "configure",
            EventKind::Cancel { .. } => "cancel",
        }
    }
}

/// Event as delivered to subscribers.
#[derive(Clone, Debug)]
pub struct Event {
    /// Bus-local sequence number, strictly increasing in publish order.
    pub seq: u64,
    /// Wall-clock publish time.
    pub at: SystemTime,
    pub kind: EventKind,
}

impl Event {
    pub(crate) fn new(seq: u64, kind: EventKind) -> Self {
        Self {
            seq,
            at: SystemTime::now(),
            kind,
        }
    }

    pub fn generation(&self) -> Option<u64> {
        self.kind.generation()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Output carried by an `End` event.
    pub fn output(&self) -> Option<&Output> {
        match &self.kind {
            EventKind::End { output, .. } => Some(output),
            _ => None,
        }
    }
}
