//! # Example: render a manifest directory, optionally re-rendering on change
//!
//! ```text
//! cargo run --example render --features logging -- ./deploy [--watch] [--cmd "helm template ."]
//! ```
//!
//! Picks helm / kustomize / plain YAML by the files present and prints every render. On a
//! terminal the log lines go to a ring buffer that is dumped on exit.

use std::io::IsTerminal;
use std::sync::Arc;

use tokio::sync::watch::{self, error::RecvError};
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use rendervisor::{
    Catalog, CircularLogBuffer, EventKind, LogWriter, Profile, ProfileChoice, Rendered, Rule,
    Runner, RunnerConfig, SinkSubscriber, Subscribe, logs, select_sink, wait_for_shutdown_signal,
};

fn catalog() -> anyhow::Result<Catalog> {
    Ok(Catalog::builder()
        .profile(Profile::new("helm", "helm").with_args(["template", "."]))
        .profile(Profile::new("kustomize", "kustomize").with_args(["build", "."]))
        .profile(
            Profile::new("yaml", "sh")
                .with_args(["-c", "cat *.yaml *.yml 2>/dev/null"])
                .with_source(r"\.ya?ml$")?,
        )
        .rule(Rule::file("Chart.yaml", "helm")?)
        .rule(Rule::file("kustomization.yaml", "kustomize")?)
        .rule(Rule::new("yaml").when_file_regex(r"\.ya?ml$")?)
        .default_profile("yaml")
        .build()?)
}

fn show(r: &Rendered) {
    print!("\x1b[2J\x1b[H");
    println!("# generation {} ({:?})", r.generation, r.output.duration());
    print!("{}", r.output.stdout_lossy());
    eprint!("{}", r.output.stderr_lossy());
}

/// Resolves on the next interactive render; never in batch mode.
async fn changed(rx: &mut Option<watch::Receiver<Option<Rendered>>>) -> Result<(), RecvError> {
    match rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut watch = false;
    let mut choice = ProfileChoice::Auto;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--watch" => watch = true,
            "--cmd" => choice = ProfileChoice::AdHoc(args.next().unwrap_or_default()),
            "--profile" => choice = ProfileChoice::Named(args.next().unwrap_or_default()),
            _ => path = Some(arg),
        }
    }
    let path = path.unwrap_or_else(|| ".".to_string());

    let interactive = std::io::stdout().is_terminal();

    // Interactive: keep logs off the screen and dump them on exit. Batch: straight to stderr.
    let history = CircularLogBuffer::new(200);
    let dispatch = if interactive {
        logs::dispatch(&history, "rendervisor=debug,info")
    } else {
        Dispatch::new(
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("info"))
                .with_writer(std::io::stderr)
                .finish(),
        )
    };
    let output = select_sink(interactive);
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![
        Arc::new(LogWriter),
        Arc::new(SinkSubscriber::new(output.as_sink())),
    ];

    let runner = Runner::builder(&path, catalog()?)
        .config(RunnerConfig::default())
        .profile(choice)
        .watch(watch)
        .with_subscribers(subscribers)
        .with_dispatch(dispatch)
        .build()?;
    let mut events = runner.subscribe();
    let mut rendered = output.latest().map(|latest| latest.watch());

    runner.trigger().await?;

    loop {
        tokio::select! {
            _ = wait_for_shutdown_signal() => break,
            Ok(()) = changed(&mut rendered) => {
                let current = rendered.as_mut().and_then(|rx| rx.borrow_and_update().clone());
                if let Some(r) = current {
                    show(&r);
                }
            }
            ev = events.recv() => match ev {
                Some(ev) => {
                    if let EventKind::End { .. } = ev.kind
                        && !runner.status().watching
                    {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // Shutdown drains the sink worker, so a render that raced the loop exit is shown here.
    let result = runner.shutdown().await;
    if let Some(latest) = output.latest() {
        if rendered
            .as_ref()
            .is_some_and(|rx| rx.has_changed().unwrap_or(false))
            && let Some(r) = latest.latest()
        {
            show(&r);
        }
        eprintln!("--- last log lines ---");
        for line in history.lines() {
            eprintln!("{line}");
        }
    }
    result?;
    Ok(())
}
