//! Render command execution.
//!
//! - [`Executor`] spawns one command per attempt and hands back an [`ExecHandle`]
//! - [`Output`] is the immutable result carried by `End` events

mod executor;
mod output;

pub use executor::{DEFAULT_KILL_GRACE, ExecHandle, Executor, working_dir};
pub use output::Output;
