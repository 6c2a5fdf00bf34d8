//! Error types used by the rendervisor runtime and render attempts.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`]: errors raised by the engine itself and returned from API calls
//!   (profile resolution, catalog validation, shutdown).
//! - [`RenderError`]: the terminal error of a single render attempt, carried inside
//!   [`Output`](crate::Output) and published with `End` events.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the rendervisor runtime.
///
/// These never describe a failed render (see [`RenderError`]); they describe requests
/// the engine could not act on at all.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// No rule matched the input and no default profile is configured.
    #[error("no profile matched {path:?} and no default profile is configured")]
    NoProfileMatched {
        /// Input path that was inspected.
        path: PathBuf,
    },

    /// A profile name was referenced that the catalog does not contain.
    #[error("unknown profile {name:?}")]
    UnknownProfile {
        /// The missing profile name.
        name: String,
    },

    /// A profile could not be constructed (e.g. empty ad-hoc command).
    #[error("invalid profile: {reason}")]
    InvalidProfile {
        /// What was wrong with it.
        reason: String,
    },

    /// A rule predicate could not be compiled.
    #[error("invalid rule for profile {profile:?}: {reason}")]
    InvalidRule {
        /// Target profile of the offending rule.
        profile: String,
        /// Compilation error.
        reason: String,
    },

    /// The input path could not be inspected.
    #[error("input {path:?} unavailable: {reason}")]
    InputUnavailable {
        /// Input path.
        path: PathBuf,
        /// Underlying I/O error message.
        reason: String,
    },

    /// The runner has been shut down and no longer accepts requests.
    #[error("runner is shut down")]
    Closed,

    /// Shutdown grace period was exceeded; some render attempts did not exit in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Labels of the attempts or workers that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use rendervisor::RuntimeError;
    ///
    /// let err = RuntimeError::UnknownProfile { name: "helm".into() };
    /// assert_eq!(err.as_label(), "runtime_unknown_profile");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::NoProfileMatched { .. } => "runtime_no_profile_matched",
            RuntimeError::UnknownProfile { .. } => "runtime_unknown_profile",
            RuntimeError::InvalidProfile { .. } => "runtime_invalid_profile",
            RuntimeError::InvalidRule { .. } => "runtime_invalid_rule",
            RuntimeError::InputUnavailable { .. } => "runtime_input_unavailable",
            RuntimeError::Closed => "runtime_closed",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::NoProfileMatched { path } => {
                format!("nothing to render at {}", path.display())
            }
            RuntimeError::UnknownProfile { name } => format!("profile {name:?} is not defined"),
            RuntimeError::InvalidProfile { reason } => format!("invalid profile: {reason}"),
            RuntimeError::InvalidRule { profile, reason } => {
                format!("rule -> {profile}: {reason}")
            }
            RuntimeError::InputUnavailable { path, reason } => {
                format!("cannot read {}: {reason}", path.display())
            }
            RuntimeError::Closed => "runner closed".to_string(),
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck={stuck:?}")
            }
        }
    }
}

/// # Terminal error of one render attempt.
///
/// Spawn failures and non-zero exits are both "this render failed"; the variant keeps the
/// underlying cause for diagnostics. [`RenderError::Cancelled`] is not a failure: it marks an
/// attempt the runner superseded itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The command could not be started (missing binary, permission denied, bad cwd).
    #[error("failed to spawn {command:?}: {reason}")]
    Spawn {
        /// Program that was requested.
        command: String,
        /// OS error message.
        reason: String,
    },

    /// The command ran and exited unsuccessfully.
    #[error("{command:?} exited with {}", describe_exit(.code))]
    Exit {
        /// Program that was run.
        command: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// Reading the command's output or waiting for it failed.
    #[error("i/o failure: {reason}")]
    Io {
        /// Underlying error message.
        reason: String,
    },

    /// The attempt was cancelled before it completed.
    #[error("render cancelled")]
    Cancelled,

    /// The file watcher stopped; automatic re-rendering is disabled.
    #[error("watch failed: {reason}")]
    WatchFailed {
        /// Why the notification source stopped.
        reason: String,
    },

    /// The attempt's supervising task died unexpectedly.
    #[error("internal error: {reason}")]
    Internal {
        /// Description of the failure.
        reason: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl RenderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RenderError::Spawn { .. } => "render_spawn_failed",
            RenderError::Exit { .. } => "render_exit_failed",
            RenderError::Io { .. } => "render_io_failed",
            RenderError::Cancelled => "render_cancelled",
            RenderError::WatchFailed { .. } => "render_watch_failed",
            RenderError::Internal { .. } => "render_internal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RenderError::Spawn { command, reason } => format!("spawn {command}: {reason}"),
            RenderError::Exit { command, code } => {
                format!("{command}: exited with {}", describe_exit(code))
            }
            RenderError::Io { reason } => format!("io: {reason}"),
            RenderError::Cancelled => "cancelled".to_string(),
            RenderError::WatchFailed { reason } => format!("watch: {reason}"),
            RenderError::Internal { reason } => format!("internal: {reason}"),
        }
    }

    /// True when the attempt was cancelled rather than failed.
    ///
    /// # Example
    /// ```
    /// use rendervisor::RenderError;
    ///
    /// assert!(RenderError::Cancelled.is_cancelled());
    /// assert!(!RenderError::Exit { command: "helm".into(), code: Some(1) }.is_cancelled());
    /// ```
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_message_mentions_code_or_signal() {
        let coded = RenderError::Exit {
            command: "helm".into(),
            code: Some(2),
        };
        assert_eq!(coded.to_string(), "\"helm\" exited with status 2");

        let signalled = RenderError::Exit {
            command: "helm".into(),
            code: None,
        };
        assert!(signalled.to_string().ends_with("a signal"));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(RuntimeError::Closed.as_label(), "runtime_closed");
        assert_eq!(
            RenderError::WatchFailed { reason: "gone".into() }.as_label(),
            "render_watch_failed"
        );
    }
}
