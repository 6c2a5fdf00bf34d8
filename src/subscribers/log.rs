//! # Logging subscriber.
//!
//! [`LogWriter`] turns every runner event into one `tracing` record. Pair it with
//! [`logs::dispatch`](crate::logs::dispatch) to keep a bounded history of events in a
//! [`CircularLogBuffer`](crate::CircularLogBuffer).
//!
//! ## Output format
//! ```text
//! INFO render started generation=1 profile="helm"
//! INFO render finished generation=1 duration=42ms stdout_bytes=1234 stderr_bytes=0
//! WARN render failed generation=2 error="\"helm\" exited with status 1"
//! INFO render cancelled generation=3
//! INFO configuration changed profile=auto watching=true
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Logs runner events through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match &e.kind {
            EventKind::Start {
                generation,
                profile,
            } => {
                tracing::info!(generation, profile = profile.name(), "render started");
            }
            EventKind::End { generation, output } => match output.error() {
                None => tracing::info!(
                    generation,
                    duration = ?output.duration(),
                    stdout_bytes = output.stdout().len(),
                    stderr_bytes = output.stderr().len(),
                    "render finished"
                ),
                Some(err) => tracing::warn!(
                    generation,
                    label = err.as_label(),
                    error = %err,
                    "render failed"
                ),
            },
            EventKind::Cancel { generation } => {
                tracing::info!(generation, "render cancelled");
            }
            EventKind::Configure { profile, watching } => {
                tracing::info!(
                    profile = profile.as_ref().map_or("auto", |p| p.name()),
                    watching,
                    "configuration changed"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
