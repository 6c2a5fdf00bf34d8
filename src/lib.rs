//! # rendervisor
//!
//! **Rendervisor** is a render orchestration engine for local Kubernetes manifest
//! sources (plain YAML trees, Helm charts, Kustomize overlays).
//!
//! It selects an external render command for an input path (explicitly, or by matching
//! rules against the input's files), runs it asynchronously, optionally re-runs it when
//! the input changes, and guarantees that only one render is current at a time: a new
//! trigger cancels and supersedes whatever is still in flight. Every state transition is
//! published as a typed, ordered event stream.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!    ┌─────────────┐       ┌──────────────────────────┐
//!    │   Catalog   │       │ Driver (CLI / UI / demo) │
//!    │ profiles +  │       └──┬────────┬────────┬─────┘
//!    │ rules       │ trigger  │ config │  subscribe
//!    └──────┬──────┘          ▼        ▼        │
//! ┌─────────▼──────────────────────────────────────────────────────┐
//! │  Runner handle ──(Command)──► actor (owns all state)           │
//! │                                 ├─ resolve: Snapshot + match   │
//! │                                 ├─ Executor::start ──► child   │
//! │                                 ├─ watch loop (notify+debounce)│
//! │                                 └─ publish(EventKind)          │
//! └─────────────────────────────────┬──────────────────────────────┘
//!                                   ▼
//!                     ┌──────────────────────────┐
//!                     │  Bus (per-subscriber     │
//!                     │  queues, End never drop) │
//!                     └──┬───────────┬───────────┘
//!                        ▼           ▼
//!                 Subscription    Subscribe workers
//!                  (pull/Stream)   ├─ LogWriter  ──► tracing ──► CircularLogBuffer
//!                                  └─ SinkSubscriber ──► Sink (LatestOutput | BatchSink)
//! ```
//!
//! ### Lifecycle of one generation
//! ```text
//! trigger ─► resolve profile ─► cancel g-1 (publish Cancel(g-1)) ─► g += 1
//!         ─► Executor::start ─► publish Start(g)
//!         ─► wait ─┬─ g still current ─► publish End(g, output)
//!                  └─ superseded       ─► discard silently
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                   |
//! |-------------------|----------------------------------------------------------|--------------------------------------|
//! | **Runner**        | Single-flight renders, supersession, watch, shutdown     | [`Runner`], [`RunnerBuilder`]        |
//! | **Profiles**      | Render commands, rules and first-match selection         | [`Profile`], [`Rule`], [`Catalog`]   |
//! | **Execution**     | Spawn, capture, cooperative cancellation                 | [`Executor`], [`Output`]             |
//! | **Events**        | Ordered event stream, pull and push subscribers          | [`Event`], [`Subscription`], [`Subscribe`] |
//! | **Sinks**         | Interactive latest-output holder or batch writer         | [`Sink`], [`OutputSink`], [`LatestOutput`] |
//! | **Logs**          | Bounded log history fed by `tracing`                     | [`CircularLogBuffer`], [`logs::dispatch`] |
//! | **Errors**        | Engine errors vs. per-render errors                      | [`RuntimeError`], [`RenderError`]    |
//! | **Configuration** | Debounce, capacities, grace periods                      | [`RunnerConfig`]                     |
//!
//! ## Optional features
//! - `logging`: exports the built-in `LogWriter` subscriber.
//!
//! ## Example
//! ```rust,no_run
//! use rendervisor::{Catalog, Profile, Rule, Runner, EventKind};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Catalog::builder()
//!         .profile(Profile::new("helm", "helm").with_args(["template", "."]))
//!         .profile(Profile::new("kustomize", "kustomize").with_args(["build", "."]))
//!         .rule(Rule::file("Chart.yaml", "helm")?)
//!         .rule(Rule::file("kustomization.yaml", "kustomize")?)
//!         .build()?;
//!
//!     let runner = Runner::builder("./deploy", catalog).build()?;
//!     let mut events = runner.subscribe();
//!     runner.trigger().await?;
//!
//!     while let Some(ev) = events.recv().await {
//!         if let EventKind::End { output, .. } = &ev.kind {
//!             print!("{}", output.stdout_lossy());
//!             break;
//!         }
//!     }
//!     runner.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod exec;
pub mod logs;
mod profiles;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    Configure, ProfileChoice, RunState, Runner, RunnerBuilder, RunnerConfig, RunnerStatus,
    wait_for_shutdown_signal,
};
pub use error::{RenderError, RuntimeError};
pub use events::{Bus, DEFAULT_SUBSCRIBER_CAPACITY, Event, EventKind};
pub use exec::{DEFAULT_KILL_GRACE, ExecHandle, Executor, Output, working_dir};
pub use logs::{CircularLogBuffer, DEFAULT_LOG_CAPACITY};
pub use profiles::{
    Catalog, CatalogBuilder, Glob, MAX_CONTENT_BYTES, Predicate, Profile, Rule, Snapshot,
    match_rules,
};
pub use subscribers::{
    BatchSink, LatestOutput, OutputSink, Rendered, Sink, SinkSubscriber, Subscribe, Subscription,
    select_sink,
};

// Optional: expose a simple built-in logger subscriber.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
