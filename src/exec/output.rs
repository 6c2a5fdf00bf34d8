//! # Result of one render attempt.
//!
//! An [`Output`] is immutable once built and is shared with subscribers as
//! `Arc<Output>` inside `End` events.

use std::borrow::Cow;
use std::time::Duration;

use crate::error::RenderError;

/// Captured stdout/stderr plus the terminal error, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    error: Option<RenderError>,
    duration: Duration,
}

impl Output {
    pub fn new(
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        error: Option<RenderError>,
        duration: Duration,
    ) -> Self {
        Self {
            stdout,
            stderr,
            error,
            duration,
        }
    }

    /// Output with no captured streams, only an error.
    pub fn from_error(error: RenderError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub(crate) fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Terminal error; `None` on success.
    pub fn error(&self) -> Option<&RenderError> {
        self.error.as_ref()
    }

    /// Wall-clock time from spawn request to completion.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(RenderError::is_cancelled)
    }
}
