//! # Runner control loop.
//!
//! One actor task owns all mutable runner state. The public [`Runner`](crate::Runner)
//! handle talks to it through a command channel; executor completions and watch signals
//! arrive on their own channels. Because a single task publishes every event, publish
//! order is causal order.
//!
//! ## State machine
//! ```text
//!            trigger                       completion(g)
//!   Idle ─────────────► Running(g) ─────────────────────────► Idle   publish End(g)
//!                          │  ▲
//!                 trigger  │  │ start g+1, publish Start(g+1)
//!                          ▼  │
//!                     Cancelling(g)   cancel token(g), publish Cancel(g);
//!                                     completion(g) is discarded later
//! ```
//!
//! ## Rules
//! - `Start(g)` is published before any `Cancel(g)`/`End(g)`
//! - Exactly one of `End(g)` or a silent discard happens for every `Start(g)`
//! - A completion whose generation is not the in-flight one is stale and dropped (debug log)
//! - Resolution errors of explicit triggers go back to the caller; watch-originated ones are
//!   logged at warn and start nothing
//! - Watch failure: cancel in-flight, publish `End` for a fresh generation carrying
//!   [`RenderError::WatchFailed`], then `Configure{ watching: false }`

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{self, JoinSet};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;

use crate::error::{RenderError, RuntimeError};
use crate::events::{Bus, EventKind};
use crate::exec::{Executor, Output, working_dir};
use crate::profiles::{Catalog, Profile};

use super::config::RunnerConfig;
use super::runner::{Configure, ProfileChoice, RunState, RunnerStatus};
use super::watcher::{self, WatchSignal};

/// Requests sent from the [`Runner`](crate::Runner) handle.
pub(super) enum Command {
    Trigger {
        reply: oneshot::Sender<Result<u64, RuntimeError>>,
    },
    Configure {
        request: Configure,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

/// In-flight attempt.
struct Inflight {
    generation: u64,
    token: CancellationToken,
}

struct ActiveWatch {
    token: CancellationToken,
}

/// Initial actor state assembled by the builder.
pub(super) struct Seed {
    pub path: PathBuf,
    pub catalog: Arc<Catalog>,
    pub forced: Option<Arc<Profile>>,
    pub extra_args: Vec<String>,
    pub watch: bool,
    pub config: RunnerConfig,
}

pub(super) struct Actor {
    path: PathBuf,
    catalog: Arc<Catalog>,
    forced: Option<Arc<Profile>>,
    extra_args: Vec<String>,
    config: RunnerConfig,
    executor: Executor,

    generation: u64,
    last_profile: Option<Arc<Profile>>,
    inflight: Option<Inflight>,
    waiters: JoinSet<(u64, Output)>,
    waiting: HashMap<task::Id, u64>,

    watch: Option<ActiveWatch>,
    watch_epoch: u64,
    watch_tx: mpsc::Sender<(u64, WatchSignal)>,
    watch_rx: mpsc::Receiver<(u64, WatchSignal)>,

    bus: Bus,
    status: watch::Sender<RunnerStatus>,
    root: CancellationToken,
}

impl Actor {
    pub(super) fn new(
        seed: Seed,
        bus: Bus,
        status: watch::Sender<RunnerStatus>,
        root: CancellationToken,
    ) -> (Self, bool) {
        let (watch_tx, watch_rx) = mpsc::channel(16);
        let actor = Self {
            path: seed.path,
            catalog: seed.catalog,
            forced: seed.forced,
            extra_args: seed.extra_args,
            executor: Executor::new(seed.config.kill_grace),
            config: seed.config,
            generation: 0,
            last_profile: None,
            inflight: None,
            waiters: JoinSet::new(),
            waiting: HashMap::new(),
            watch: None,
            watch_epoch: 0,
            watch_tx,
            watch_rx,
            bus,
            status,
            root,
        };
        (actor, seed.watch)
    }

    /// Runs until shutdown, until the handle is dropped, or until the root token is cancelled.
    pub(super) async fn run(mut self, mut commands: mpsc::Receiver<Command>, watch_on_start: bool) {
        tracing::debug!(path = %self.path.display(), "runner started");
        if watch_on_start {
            self.enable_watch();
        }

        loop {
            tokio::select! {
                biased;
                _ = self.root.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    None => break,
                    Some(Command::Shutdown { reply }) => {
                        let res = self.shutdown().await;
                        let _ = reply.send(res);
                        return;
                    }
                    Some(Command::Trigger { reply }) => {
                        let res = self.trigger().await;
                        let _ = reply.send(res);
                    }
                    Some(Command::Configure { request, reply }) => {
                        let res = self.configure(request).await;
                        let _ = reply.send(res);
                    }
                },
                Some(done) = self.waiters.join_next_with_id(), if !self.waiters.is_empty() => {
                    self.complete(done);
                }
                Some((epoch, signal)) = self.watch_rx.recv() => {
                    self.on_watch(epoch, signal).await;
                }
            }
        }

        // Handle dropped without shutdown: stop everything without waiting.
        self.stop_watch();
        if let Some(inflight) = self.inflight.take() {
            inflight.token.cancel();
        }
        self.root.cancel();
        self.waiters.abort_all();
        for worker in self.bus.close() {
            worker.abort();
        }
        self.set_state(RunState::Idle);
        tracing::debug!("runner stopped");
    }

    async fn trigger(&mut self) -> Result<u64, RuntimeError> {
        let profile = self.resolve().await?;
        let workdir = working_dir(&self.path);
        self.supersede();

        self.generation += 1;
        let generation = self.generation;
        let handle = self
            .executor
            .start(&profile, &self.extra_args, &workdir, &self.root);
        let token = handle.cancel_token();
        let waiter = self
            .waiters
            .spawn(async move { (generation, handle.wait().await) }.with_current_subscriber());
        self.waiting.insert(waiter.id(), generation);

        self.inflight = Some(Inflight { generation, token });
        self.last_profile = Some(Arc::clone(&profile));
        self.set_state(RunState::Running(generation));
        tracing::info!(generation, profile = profile.name(), "render started");
        self.bus.publish(EventKind::Start {
            generation,
            profile,
        });
        Ok(generation)
    }

    /// Forced profile, or rule-based selection on a blocking thread.
    async fn resolve(&self) -> Result<Arc<Profile>, RuntimeError> {
        if let Some(profile) = &self.forced {
            return Ok(Arc::clone(profile));
        }
        let catalog = Arc::clone(&self.catalog);
        let path = self.path.clone();
        task::spawn_blocking(move || catalog.resolve(&path))
            .await
            .map_err(|e| RuntimeError::InputUnavailable {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
    }

    /// Cancels the in-flight generation, if any. Its completion will be discarded.
    fn supersede(&mut self) {
        let Some(inflight) = self.inflight.take() else {
            return;
        };
        self.set_state(RunState::Cancelling(inflight.generation));
        inflight.token.cancel();
        tracing::debug!(generation = inflight.generation, "render superseded");
        self.bus.publish(EventKind::Cancel {
            generation: inflight.generation,
        });
        self.set_state(RunState::Idle);
    }

    fn complete(&mut self, done: Result<(task::Id, (u64, Output)), task::JoinError>) {
        let (generation, output) = match done {
            Ok((id, (generation, output))) => {
                self.waiting.remove(&id);
                (generation, output)
            }
            Err(e) => {
                let Some(generation) = self.waiting.remove(&e.id()) else {
                    return;
                };
                let reason = e.to_string();
                (generation, Output::from_error(RenderError::Internal { reason }))
            }
        };

        if self.inflight.as_ref().map(|i| i.generation) != Some(generation) {
            tracing::debug!(generation, "discarding stale completion");
            return;
        }
        self.inflight = None;

        match output.error() {
            None => tracing::info!(
                generation,
                duration = ?output.duration(),
                "render finished"
            ),
            Some(e) => tracing::warn!(generation, error = %e, "render failed"),
        }
        self.set_state(RunState::Idle);
        self.bus.publish(EventKind::End {
            generation,
            output: Arc::new(output),
        });
    }

    async fn configure(&mut self, request: Configure) -> Result<(), RuntimeError> {
        let forced = match request.profile {
            Some(choice) => Some(choose(&self.catalog, choice)?),
            None => None,
        };

        let mut command_changed = false;
        if let Some(forced) = forced
            && forced != self.forced
        {
            self.forced = forced;
            command_changed = true;
        }
        if let Some(args) = request.extra_args
            && args != self.extra_args
        {
            self.extra_args = args;
            command_changed = true;
        }

        match request.watch {
            Some(true) if self.watch.is_none() => self.enable_watch(),
            Some(false) if self.watch.is_some() => {
                self.stop_watch();
                self.publish_configure();
            }
            _ => self.publish_configure(),
        }

        if command_changed
            && self.watch.is_some()
            && let Err(e) = self.trigger().await
        {
            tracing::warn!(error = %e, "re-render after configure failed to resolve");
        }
        Ok(())
    }

    fn publish_configure(&mut self) {
        let watching = self.watch.is_some();
        self.status.send_modify(|s| {
            s.watching = watching;
            s.profile = self.forced.clone().or_else(|| self.last_profile.clone());
        });
        self.bus.publish(EventKind::Configure {
            profile: self.forced.clone(),
            watching,
        });
    }

    /// Starts the watch loop and publishes `Configure`; reports a failure instead if it cannot start.
    fn enable_watch(&mut self) {
        self.watch_epoch += 1;
        let token = self.root.child_token();
        let started = watcher::spawn(
            &self.path,
            self.config.debounce,
            self.config.watch_channel_capacity_clamped(),
            self.watch_epoch,
            token.clone(),
            self.watch_tx.clone(),
        );
        match started {
            Ok(_join) => {
                tracing::info!(path = %self.path.display(), "watching for changes");
                self.watch = Some(ActiveWatch { token });
                self.publish_configure();
            }
            Err(reason) => self.watch_failed(reason),
        }
    }

    fn stop_watch(&mut self) {
        if let Some(active) = self.watch.take() {
            active.token.cancel();
        }
    }

    async fn on_watch(&mut self, epoch: u64, signal: WatchSignal) {
        if epoch != self.watch_epoch || self.watch.is_none() {
            return;
        }
        match signal {
            WatchSignal::Failed(reason) => self.watch_failed(reason),
            WatchSignal::Changed(paths) => {
                let filter = self.forced.as_ref().or(self.last_profile.as_ref());
                if let Some(profile) = filter
                    && !paths.iter().any(|p| profile.watches(p))
                {
                    tracing::debug!(profile = profile.name(), "change outside source filter");
                    return;
                }
                tracing::debug!(changed = paths.len(), "input changed");
                if let Err(e) = self.trigger().await {
                    tracing::warn!(
                        path = %self.path.display(),
                        label = e.as_label(),
                        error = %e,
                        "watch-triggered render not started"
                    );
                }
            }
        }
    }

    fn watch_failed(&mut self, reason: String) {
        tracing::warn!(path = %self.path.display(), %reason, "watch failed, re-rendering disabled");
        self.stop_watch();
        self.supersede();

        self.generation += 1;
        let generation = self.generation;
        self.set_state(RunState::Idle);
        self.bus.publish(EventKind::End {
            generation,
            output: Arc::new(Output::from_error(RenderError::WatchFailed { reason })),
        });
        self.publish_configure();
    }

    async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        tracing::debug!("runner shutting down");
        self.stop_watch();
        self.supersede();

        let grace = self.config.shutdown_grace;
        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();

        let drained = timeout_at(deadline, async {
            while self.waiters.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            let mut generations: Vec<u64> = self.waiting.values().copied().collect();
            generations.sort_unstable();
            stuck.extend(generations.into_iter().map(|g| format!("generation {g}")));
            self.waiters.abort_all();
        }
        self.waiting.clear();

        for mut worker in self.bus.close() {
            if timeout_at(deadline, &mut worker).await.is_err() {
                stuck.push("subscriber worker".to_string());
                worker.abort();
            }
        }

        self.root.cancel();
        self.set_state(RunState::Idle);
        self.status.send_modify(|s| s.closed = true);

        if stuck.is_empty() {
            tracing::debug!("runner stopped within grace");
            Ok(())
        } else {
            tracing::warn!(?grace, ?stuck, "shutdown grace exceeded");
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    fn set_state(&mut self, state: RunState) {
        let generation = self.generation;
        let watching = self.watch.is_some();
        let profile = self.forced.clone().or_else(|| self.last_profile.clone());
        self.status.send_modify(|s| {
            s.state = state;
            s.generation = generation;
            s.watching = watching;
            s.profile = profile;
        });
    }
}

/// Turns a [`ProfileChoice`] into the forced profile (`None` = rule-based selection).
pub(super) fn choose(
    catalog: &Catalog,
    choice: ProfileChoice,
) -> Result<Option<Arc<Profile>>, RuntimeError> {
    match choice {
        ProfileChoice::Auto => Ok(None),
        ProfileChoice::Named(name) => catalog.require(&name).map(Some),
        ProfileChoice::AdHoc(raw) => Profile::ad_hoc(&raw).map(|p| Some(Arc::new(p))),
    }
}

