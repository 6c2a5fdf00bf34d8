//! # Watch loop: file notifications → debounced triggers.
//!
//! A `notify` watcher runs on its own thread and forwards raw results into a bounded
//! tokio channel with `try_send` (a full channel only loses notifications that fall in a
//! burst already being debounced). The async loop collapses bursts into a single
//! [`WatchSignal::Changed`] and reports notification-source failures once.
//!
//! ```text
//! notify thread ──try_send──► raw rx ──► debounce(window) ──► input still exists?
//!                                             │                   ├─ yes ─► Changed(paths)
//!                                             │                   └─ no  ─► Failed, stop
//!                                             └─ watcher error ───────────► Failed, stop
//! ```
//!
//! ## Rules
//! - Trailing-edge debounce: the window restarts on every **relevant** notification
//! - Relevant = create/modify/remove under the input path (access events are ignored)
//! - A failure is sent at most once, then the loop exits
//! - Every signal carries the watch `epoch` so the runner can ignore stale loops

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind as FsEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;

/// Message from a watch loop to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WatchSignal {
    /// Input-relative paths touched during one debounced burst.
    Changed(Vec<PathBuf>),
    /// The notification source stopped.
    Failed(String),
}

/// What the debouncer should do with one raw item.
pub(crate) enum Step<U> {
    Skip,
    Keep(U),
    Fail(String),
}

/// Outcome of one debounced burst.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Burst<U> {
    Ready(Vec<U>),
    Failed(String),
    Stopped,
}

/// Waits for the first kept item, then absorbs items until `window` passes without one.
///
/// Returns `Stopped` on cancellation or when the source closes before a burst starts.
pub(crate) async fn debounce<T, U>(
    rx: &mut mpsc::Receiver<T>,
    window: Duration,
    token: &CancellationToken,
    mut classify: impl FnMut(T) -> Step<U>,
) -> Burst<U> {
    let mut kept = Vec::new();

    loop {
        let item = tokio::select! {
            _ = token.cancelled() => return Burst::Stopped,
            item = rx.recv() => item,
        };
        match item.map(&mut classify) {
            None => return Burst::Stopped,
            Some(Step::Skip) => continue,
            Some(Step::Fail(reason)) => return Burst::Failed(reason),
            Some(Step::Keep(u)) => {
                kept.push(u);
                break;
            }
        }
    }

    let mut deadline = Instant::now() + window;
    loop {
        tokio::select! {
            _ = token.cancelled() => return Burst::Stopped,
            _ = sleep_until(deadline) => return Burst::Ready(kept),
            item = rx.recv() => match item.map(&mut classify) {
                None => return Burst::Ready(kept),
                Some(Step::Skip) => {}
                Some(Step::Fail(reason)) => return Burst::Failed(reason),
                Some(Step::Keep(u)) => {
                    kept.push(u);
                    deadline = Instant::now() + window;
                }
            },
        }
    }
}

/// The watched input, canonicalized once.
#[derive(Debug, Clone)]
struct Target {
    path: PathBuf,
    is_dir: bool,
}

impl Target {
    /// Input-relative paths of `event` that matter, or why the source failed.
    fn classify(&self, res: notify::Result<notify::Event>) -> Step<Vec<PathBuf>> {
        let event = match res {
            Ok(event) => event,
            Err(e) => return Step::Fail(e.to_string()),
        };
        if !matches!(
            event.kind,
            FsEventKind::Create(_) | FsEventKind::Modify(_) | FsEventKind::Remove(_)
        ) {
            return Step::Skip;
        }

        let relative: Vec<PathBuf> = event
            .paths
            .iter()
            .filter_map(|p| self.relative(p))
            .collect();
        if relative.is_empty() {
            Step::Skip
        } else {
            Step::Keep(relative)
        }
    }

    fn relative(&self, changed: &Path) -> Option<PathBuf> {
        if self.is_dir {
            changed.strip_prefix(&self.path).ok().map(Path::to_path_buf)
        } else if changed == self.path {
            self.path.file_name().map(PathBuf::from)
        } else {
            None
        }
    }
}

/// Starts watching `input`. Fails if the path cannot be watched.
pub(crate) fn spawn(
    input: &Path,
    window: Duration,
    capacity: usize,
    epoch: u64,
    token: CancellationToken,
    out: mpsc::Sender<(u64, WatchSignal)>,
) -> Result<JoinHandle<()>, String> {
    let path = std::fs::canonicalize(input).map_err(|e| format!("{}: {e}", input.display()))?;
    let is_dir = path.is_dir();
    let target = Target { path, is_dir };

    let (raw_tx, mut raw_rx) = mpsc::channel(capacity.max(1));
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = raw_tx.try_send(res);
        },
        notify::Config::default(),
    )
    .map_err(|e| e.to_string())?;

    let (watch_root, mode) = if target.is_dir {
        (target.path.clone(), RecursiveMode::Recursive)
    } else {
        let parent = target
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| target.path.clone());
        (parent, RecursiveMode::NonRecursive)
    };
    watcher
        .watch(&watch_root, mode)
        .map_err(|e| format!("watch {}: {e}", watch_root.display()))?;

    tracing::debug!(path = %target.path.display(), epoch, "watch started");

    let task = async move {
        // Dropping the watcher stops the notify thread.
        let _watcher = watcher;
        loop {
            let burst = debounce(&mut raw_rx, window, &token, |res| target.classify(res)).await;
            let signal = match burst {
                Burst::Stopped => break,
                Burst::Failed(reason) => WatchSignal::Failed(reason),
                Burst::Ready(_) if !target.path.exists() => {
                    WatchSignal::Failed(format!("{} was removed", target.path.display()))
                }
                Burst::Ready(batches) => {
                    let paths: BTreeSet<PathBuf> = batches.into_iter().flatten().collect();
                    WatchSignal::Changed(paths.into_iter().collect())
                }
            };
            let failed = matches!(signal, WatchSignal::Failed(_));
            if out.send((epoch, signal)).await.is_err() || failed {
                break;
            }
        }
        tracing::debug!(epoch, "watch stopped");
    };

    Ok(tokio::spawn(task.with_current_subscriber()))
}
