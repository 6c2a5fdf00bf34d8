//! # Runner handle.
//!
//! [`Runner`] is the public face of one render session. It is a thin handle over the
//! control actor (see `core/actor.rs`): every call is a message, every answer a reply.
//! All handle methods take `&self`, so a runner can be shared behind an `Arc`.
//!
//! ```text
//! Runner ──(Command)──► actor ──► Executor / watch loop
//!   │                     └──publish──► Bus ──► Subscription / Subscribe workers
//!   └──subscribe()/attach()───────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use rendervisor::{Catalog, Profile, Runner};
//!
//! # async fn demo() -> Result<(), rendervisor::RuntimeError> {
//! let catalog = Catalog::single(Profile::new("echo", "echo").with_args(["hello"]));
//! let runner = Runner::builder(".", catalog).build()?;
//! let mut events = runner.subscribe();
//!
//! let generation = runner.trigger().await?;
//! while let Some(ev) = events.recv().await {
//!     if ev.is_terminal() && ev.generation() == Some(generation) {
//!         println!("{}", ev.output().map(|o| o.stdout_lossy()).unwrap_or_default());
//!         break;
//!     }
//! }
//! runner.shutdown().await
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

use crate::error::RuntimeError;
use crate::events::Bus;
use crate::profiles::{Catalog, Profile};
use crate::subscribers::{Subscribe, Subscription};

use super::actor::Command;
use super::builder::RunnerBuilder;
use super::config::RunnerConfig;

/// Where the control loop currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Running(u64),
    Cancelling(u64),
}

/// Read-only snapshot of the control loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunnerStatus {
    pub state: RunState,
    /// Last allocated generation (0 before the first trigger).
    pub generation: u64,
    /// Forced profile, or the most recently resolved one.
    pub profile: Option<Arc<Profile>>,
    pub watching: bool,
    /// Set once `shutdown()` has completed.
    pub closed: bool,
}

/// How the runner picks a profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ProfileChoice {
    /// Re-resolve from the catalog's rules on every trigger.
    #[default]
    Auto,
    /// Force a catalog profile by name.
    Named(String),
    /// Force a profile synthesized from a raw command line.
    AdHoc(String),
}

/// Configuration change request. `None` fields are left untouched.
///
/// A change of profile or extra args re-renders immediately when watch is active.
/// Enabling watch alone does not render.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configure {
    pub profile: Option<ProfileChoice>,
    pub watch: Option<bool>,
    pub extra_args: Option<Vec<String>>,
}

impl Configure {
    pub fn profile(mut self, choice: ProfileChoice) -> Self {
        self.profile = Some(choice);
        self
    }

    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = Some(enabled);
        self
    }

    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = Some(args.into_iter().map(Into::into).collect());
        self
    }
}

/// Handle to a running render session.
///
/// Dropping the handle without [`shutdown`](Self::shutdown) cancels the root token:
/// the in-flight render is killed and every subscription closes.
pub struct Runner {
    commands: mpsc::Sender<Command>,
    bus: Bus,
    status: watch::Receiver<RunnerStatus>,
    root: CancellationToken,
    dispatch: Dispatch,
    config: RunnerConfig,
    path: PathBuf,
}

impl Runner {
    /// Starts building a runner for `path` with profiles and rules from `catalog`.
    pub fn builder(path: impl Into<PathBuf>, catalog: Catalog) -> RunnerBuilder {
        RunnerBuilder::new(path.into(), catalog)
    }

    pub(super) fn from_parts(
        commands: mpsc::Sender<Command>,
        bus: Bus,
        status: watch::Receiver<RunnerStatus>,
        root: CancellationToken,
        dispatch: Dispatch,
        config: RunnerConfig,
        path: PathBuf,
    ) -> Self {
        Self {
            commands,
            bus,
            status,
            root,
            dispatch,
            config,
            path,
        }
    }

    /// Requests a render now, superseding any in-flight one.
    ///
    /// Returns the new generation, or the resolution error (nothing is started then).
    pub async fn trigger(&self) -> Result<u64, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Trigger { reply }, rx).await
    }

    /// Changes the profile choice, watch state and/or extra args. Always publishes `Configure`.
    pub async fn configure(&self, request: Configure) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Configure { request, reply }, rx)
            .await
    }

    /// New pull subscription observing events published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.bus
            .subscribe("subscription", self.config.subscriber_capacity_clamped())
    }

    /// Attaches a push subscriber; its worker logs through the runner's dispatch.
    pub fn attach(&self, sub: Arc<dyn Subscribe>) {
        tracing::dispatcher::with_default(&self.dispatch, || self.bus.attach(sub));
    }

    pub fn status(&self) -> RunnerStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn status_watch(&self) -> watch::Receiver<RunnerStatus> {
        self.status.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Stops the watch loop, cancels the in-flight render and closes every subscription.
    ///
    /// Waits up to `shutdown_grace` for render tasks and subscriber workers; returns
    /// [`RuntimeError::GraceExceeded`] if some did not stop, [`RuntimeError::Closed`] if
    /// the runner was already shut down.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Shutdown { reply }, rx).await
    }

    async fn request<T>(
        &self,
        cmd: Command,
        rx: oneshot::Receiver<Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| RuntimeError::Closed)?;
        rx.await.map_err(|_| RuntimeError::Closed)?
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("path", &self.path)
            .field("status", &*self.status.borrow())
            .finish()
    }
}
