//! Runtime core: the runner and its control loop.
//!
//! The public API from this module is [`Runner`] (built with [`RunnerBuilder`]), its
//! request/status types, [`RunnerConfig`] and [`wait_for_shutdown_signal`].
//!
//! Internal modules:
//! - [`actor`]: owns runner state; single-flight supervision, supersession, event publishing;
//! - [`watcher`]: notify-backed watch loop with trailing-edge debounce;
//! - [`builder`]: validates the initial configuration and spawns the actor;
//! - [`shutdown`]: cross-platform termination signal for drivers.

mod actor;
mod builder;
mod config;
mod runner;
mod shutdown;
mod watcher;

pub use builder::RunnerBuilder;
pub use config::RunnerConfig;
pub use runner::{Configure, ProfileChoice, RunState, Runner, RunnerStatus};
pub use shutdown::wait_for_shutdown_signal;
