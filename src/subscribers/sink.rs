//! # Output sinks.
//!
//! A [`Sink`] receives the [`Output`] of every completed render. Two implementations:
//!
//! - [`LatestOutput`] keeps only the newest result in a `tokio::sync::watch` channel;
//!   an interactive UI (or a control server) reads from it.
//! - [`BatchSink`] streams stdout/stderr bytes to writers, one render after another.
//!
//! [`select_sink`] picks one at startup from whether the destination is a terminal and
//! returns an [`OutputSink`]: the driver keeps it to read the holder, and
//! [`SinkSubscriber`] plugs [`OutputSink::as_sink`] into the event stream.
//!
//! ```text
//! Bus ──► SinkSubscriber ──(End, not cancelled)──► Sink::write_output(g, output)
//!                                                    ├─ LatestOutput: watch::send
//!                                                    └─ BatchSink:    write stdout/stderr
//! ```

use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::events::{Event, EventKind};
use crate::exec::Output;

use super::Subscribe;

/// Destination for rendered output.
pub trait Sink: Send + Sync + 'static {
    fn write_output(&self, generation: u64, output: &Arc<Output>) -> io::Result<()>;
}

/// A completed render as held by [`LatestOutput`].
#[derive(Clone, Debug)]
pub struct Rendered {
    pub generation: u64,
    pub output: Arc<Output>,
}

/// Keeps the most recent output; older generations are replaced.
#[derive(Debug)]
pub struct LatestOutput {
    tx: watch::Sender<Option<Rendered>>,
}

impl Default for LatestOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestOutput {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn latest(&self) -> Option<Rendered> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every new output.
    pub fn watch(&self) -> watch::Receiver<Option<Rendered>> {
        self.tx.subscribe()
    }
}

impl Sink for LatestOutput {
    fn write_output(&self, generation: u64, output: &Arc<Output>) -> io::Result<()> {
        self.tx.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|r| r.generation > generation) {
                return false;
            }
            *slot = Some(Rendered {
                generation,
                output: Arc::clone(output),
            });
            true
        });
        Ok(())
    }
}

/// Writes stdout and stderr bytes to two writers; failures get a trailing note on `err`.
pub struct BatchSink<O, E> {
    writers: Mutex<(O, E)>,
}

impl BatchSink<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> BatchSink<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            writers: Mutex::new((out, err)),
        }
    }

    pub fn into_inner(self) -> (O, E) {
        self.writers.into_inner()
    }
}

impl<O, E> Sink for BatchSink<O, E>
where
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    fn write_output(&self, generation: u64, output: &Arc<Output>) -> io::Result<()> {
        let mut guard = self.writers.lock();
        let (out, err) = &mut *guard;
        out.write_all(output.stdout())?;
        out.flush()?;
        err.write_all(output.stderr())?;
        if let Some(e) = output.error() {
            writeln!(err, "render {generation} failed: {e}")?;
        }
        err.flush()
    }
}

/// The sink picked once at startup by [`select_sink`].
#[derive(Clone)]
pub enum OutputSink {
    /// A UI reads the newest render from the holder.
    Interactive(Arc<LatestOutput>),
    /// Every render is written to stdout/stderr as it completes.
    Batch(Arc<BatchSink<io::Stdout, io::Stderr>>),
}

impl OutputSink {
    /// The sink to hand to a [`SinkSubscriber`].
    pub fn as_sink(&self) -> Arc<dyn Sink> {
        match self {
            OutputSink::Interactive(latest) => Arc::clone(latest) as Arc<dyn Sink>,
            OutputSink::Batch(batch) => Arc::clone(batch) as Arc<dyn Sink>,
        }
    }

    /// The readable holder, when interactive.
    pub fn latest(&self) -> Option<&Arc<LatestOutput>> {
        match self {
            OutputSink::Interactive(latest) => Some(latest),
            OutputSink::Batch(_) => None,
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, OutputSink::Interactive(_))
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputSink::Interactive(latest) => f.debug_tuple("Interactive").field(latest).finish(),
            OutputSink::Batch(_) => f.write_str("Batch"),
        }
    }
}

/// Chooses the sink for a destination: [`LatestOutput`] when interactive, stdio otherwise.
pub fn select_sink(interactive: bool) -> OutputSink {
    if interactive {
        OutputSink::Interactive(Arc::new(LatestOutput::new()))
    } else {
        OutputSink::Batch(Arc::new(BatchSink::stdio()))
    }
}

/// Forwards completed, non-cancelled outputs to a [`Sink`].
pub struct SinkSubscriber {
    sink: Arc<dyn Sink>,
}

impl SinkSubscriber {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Subscribe for SinkSubscriber {
    async fn on_event(&self, event: &Event) {
        let EventKind::End { generation, output } = &event.kind else {
            return;
        };
        if output.is_cancelled() {
            return;
        }
        if let Err(e) = self.sink.write_output(*generation, output) {
            tracing::warn!(generation, error = %e, "sink write failed");
        }
    }

    fn name(&self) -> &'static str {
        "sink"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::RenderError;

    fn output(stdout: &str, stderr: &str, error: Option<RenderError>) -> Arc<Output> {
        Arc::new(Output::new(
            stdout.into(),
            stderr.into(),
            error,
            Duration::ZERO,
        ))
    }

    #[test]
    fn batch_sink_writes_streams_and_failure_note() {
        let sink = BatchSink::new(Vec::new(), Vec::new());
        sink.write_output(1, &output("kind: Pod\n", "", None)).unwrap();
        sink.write_output(
            2,
            &output(
                "",
                "boom",
                Some(RenderError::Exit {
                    command: "helm".into(),
                    code: Some(1),
                }),
            ),
        )
        .unwrap();

        let (out, err) = sink.into_inner();
        assert_eq!(out, b"kind: Pod\n");
        let err = String::from_utf8(err).unwrap();
        assert!(err.starts_with("boom"));
        assert!(err.contains("render 2 failed"));
    }

    #[test]
    fn latest_output_ignores_older_generations() {
        let latest = LatestOutput::new();
        let mut rx = latest.watch();
        latest.write_output(2, &output("two", "", None)).unwrap();
        latest.write_output(1, &output("one", "", None)).unwrap();

        let got = latest.latest().unwrap();
        assert_eq!(got.generation, 2);
        assert_eq!(got.output.stdout(), b"two");
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn interactive_selection_is_readable_through_the_subscriber() {
        let selected = select_sink(true);
        assert!(selected.is_interactive());
        let latest = selected.latest().unwrap().clone();
        let mut rx = latest.watch();

        let sub = SinkSubscriber::new(selected.as_sink());
        let bus = crate::events::Bus::new();
        let mut events = bus.subscribe("probe", 8);
        bus.publish(EventKind::End {
            generation: 4,
            output: output("kind: Pod\n", "", None),
        });
        bus.close();
        while let Some(ev) = events.recv().await {
            sub.on_event(&ev).await;
        }

        assert!(rx.has_changed().unwrap());
        let got = rx.borrow_and_update().clone().unwrap();
        assert_eq!(got.generation, 4);
        assert_eq!(got.output.stdout(), b"kind: Pod\n");
    }

    #[test]
    fn batch_selection_has_no_holder() {
        let selected = select_sink(false);
        assert!(!selected.is_interactive());
        assert!(selected.latest().is_none());
    }

    #[tokio::test]
    async fn subscriber_skips_cancelled_and_non_end_events() {
        let latest = Arc::new(LatestOutput::new());
        let sub = SinkSubscriber::new(latest.clone());
        let bus = crate::events::Bus::new();
        let mut rx = bus.subscribe("probe", 8);

        bus.publish(EventKind::Cancel { generation: 1 });
        bus.publish(EventKind::End {
            generation: 1,
            output: Arc::new(Output::from_error(RenderError::Cancelled)),
        });
        bus.publish(EventKind::End {
            generation: 2,
            output: output("ok", "", None),
        });
        bus.close();
        while let Some(ev) = rx.recv().await {
            sub.on_event(&ev).await;
        }

        assert_eq!(latest.latest().map(|r| r.generation), Some(2));
    }
}
