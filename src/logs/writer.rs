//! `tracing-subscriber` integration for [`CircularLogBuffer`].
//!
//! The formatter writes a log event in several small chunks; [`BufferWriter`] collects
//! them and stores the whole line as a single record when dropped, so one event is one
//! record.

use std::io::{self, Write};

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use super::CircularLogBuffer;

/// [`MakeWriter`](tracing_subscriber::fmt::MakeWriter) that appends to a [`CircularLogBuffer`].
#[derive(Clone, Debug)]
pub struct BufferMakeWriter {
    buffer: CircularLogBuffer,
}

impl BufferMakeWriter {
    pub fn new(buffer: &CircularLogBuffer) -> Self {
        Self {
            buffer: buffer.clone(),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for BufferMakeWriter {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter {
            buffer: self.buffer.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Per-event writer. Flushes its bytes into the ring on [`Drop`].
pub struct BufferWriter {
    buffer: CircularLogBuffer,
    buf: Vec<u8>,
}

impl Write for BufferWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BufferWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        self.buffer.write(&self.buf);
    }
}

/// Builds a [`Dispatch`] that formats events without ANSI codes into `buffer`.
///
/// `directive` is an [`EnvFilter`] directive such as `"info"` or `"rendervisor=debug"`;
/// an unparsable directive falls back to `info`.
pub fn dispatch(buffer: &CircularLogBuffer, directive: &str) -> Dispatch {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(BufferMakeWriter::new(buffer))
        .finish();
    Dispatch::new(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_event_becomes_one_record() {
        let buffer = CircularLogBuffer::new(8);
        let dispatch = dispatch(&buffer, "debug");

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(generation = 3, "render started");
            tracing::debug!("second line");
            tracing::trace!("filtered out");
        });

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("render started"));
        assert!(lines[0].contains("generation=3"));
        assert!(lines[1].contains("second line"));
    }

    #[test]
    fn bad_directive_falls_back_to_info() {
        let buffer = CircularLogBuffer::new(8);
        let dispatch = dispatch(&buffer, "rendervisor=notalevel");

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("kept");
            tracing::debug!("dropped");
        });

        assert_eq!(buffer.len(), 1);
    }
}
