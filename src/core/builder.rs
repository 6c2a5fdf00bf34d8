use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

use crate::error::RuntimeError;
use crate::events::Bus;
use crate::profiles::Catalog;
use crate::subscribers::Subscribe;

use super::actor::{self, Actor, Seed};
use super::config::RunnerConfig;
use super::runner::{ProfileChoice, Runner, RunnerStatus};

/// Builder for a [`Runner`].
pub struct RunnerBuilder {
    path: PathBuf,
    catalog: Catalog,
    config: RunnerConfig,
    profile: ProfileChoice,
    watch: bool,
    extra_args: Vec<String>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    dispatch: Option<Dispatch>,
}

impl RunnerBuilder {
    pub(super) fn new(path: PathBuf, catalog: Catalog) -> Self {
        Self {
            path,
            catalog,
            config: RunnerConfig::default(),
            profile: ProfileChoice::Auto,
            watch: false,
            extra_args: Vec::new(),
            subscribers: Vec::new(),
            dispatch: None,
        }
    }

    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial profile choice (default: rule-based).
    pub fn profile(mut self, choice: ProfileChoice) -> Self {
        self.profile = choice;
        self
    }

    /// Start the watch loop as soon as the runner is built. Does not render by itself.
    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    /// Arguments appended to every invocation.
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Push subscribers attached before the first event can be published.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Logging context for every task the runner spawns.
    ///
    /// Defaults to the dispatcher that is current when [`build`](Self::build) runs.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Validates the profile choice and spawns the control loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Runner, RuntimeError> {
        let forced = actor::choose(&self.catalog, self.profile)?;
        let dispatch = self
            .dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));

        let bus = Bus::new();
        tracing::dispatcher::with_default(&dispatch, || {
            for sub in self.subscribers {
                bus.attach(sub);
            }
        });

        let root = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(RunnerStatus {
            profile: forced.clone(),
            ..RunnerStatus::default()
        });
        let (commands_tx, commands_rx) = mpsc::channel(32);

        let seed = Seed {
            path: self.path.clone(),
            catalog: Arc::new(self.catalog),
            forced,
            extra_args: self.extra_args,
            watch: self.watch,
            config: self.config.clone(),
        };
        let (actor, watch_on_start) = Actor::new(seed, bus.clone(), status_tx, root.clone());
        tokio::spawn(
            actor
                .run(commands_rx, watch_on_start)
                .with_subscriber(dispatch.clone()),
        );

        Ok(Runner::from_parts(
            commands_tx,
            bus,
            status_rx,
            root,
            dispatch,
            self.config,
            self.path,
        ))
    }
}
