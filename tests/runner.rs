#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use rendervisor::{
    Catalog, CircularLogBuffer, Configure, Event, EventKind, LatestOutput, Profile,
    ProfileChoice, RenderError, Rule, RunState, Runner, RunnerConfig, RuntimeError,
    SinkSubscriber, Subscription, logs,
};
use tempfile::TempDir;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

fn sh(name: &str, script: &str) -> Profile {
    Profile::new(name, "sh").with_args(["-c", script])
}

async fn next(sub: &mut Subscription) -> Event {
    timeout(WAIT, sub.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed")
}

/// Next event that is not a `Configure`.
async fn next_run_event(sub: &mut Subscription) -> Event {
    loop {
        let ev = next(sub).await;
        if !matches!(ev.kind, EventKind::Configure { .. }) {
            return ev;
        }
    }
}

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        debounce: Duration::from_millis(50),
        kill_grace: Duration::from_millis(200),
        ..RunnerConfig::default()
    }
}

#[tokio::test]
async fn echo_renders_start_then_end() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::single(Profile::new("echo", "echo").with_args(["hello"]));
    let runner = Runner::builder(dir.path(), catalog).build().unwrap();
    let mut sub = runner.subscribe();

    assert_eq!(runner.trigger().await.unwrap(), 1);

    match next(&mut sub).await.kind {
        EventKind::Start {
            generation,
            profile,
        } => {
            assert_eq!(generation, 1);
            assert_eq!(profile.name(), "echo");
        }
        other => panic!("expected Start, got {other:?}"),
    }
    let end = next(&mut sub).await;
    assert_eq!(end.generation(), Some(1));
    let output = end.output().unwrap();
    assert_eq!(output.stdout(), b"hello\n");
    assert!(output.stderr().is_empty());
    assert!(output.is_success());

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn failing_command_reports_stderr_and_error() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::single(sh("fail", "printf boom >&2; exit 1"));
    let runner = Runner::builder(dir.path(), catalog).build().unwrap();
    let mut sub = runner.subscribe();

    runner.trigger().await.unwrap();
    assert!(matches!(next(&mut sub).await.kind, EventKind::Start { .. }));
    let end = next(&mut sub).await;
    let output = end.output().unwrap();
    assert!(output.stdout().is_empty());
    assert_eq!(output.stderr(), b"boom");
    assert!(matches!(
        output.error(),
        Some(RenderError::Exit { code: Some(1), .. })
    ));

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn back_to_back_triggers_supersede_the_first() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::single(sh("slow", "sleep 0.5; echo done"));
    let runner = Runner::builder(dir.path(), catalog)
        .config(fast_config())
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    assert_eq!(runner.trigger().await.unwrap(), 1);
    assert_eq!(runner.trigger().await.unwrap(), 2);

    let kinds: Vec<(&str, Option<u64>)> = {
        let mut seen = Vec::new();
        for _ in 0..4 {
            let ev = next(&mut sub).await;
            seen.push((ev.kind.as_label(), ev.generation()));
        }
        seen
    };
    assert_eq!(
        kinds,
        vec![
            ("start", Some(1)),
            ("cancel", Some(1)),
            ("start", Some(2)),
            ("end", Some(2)),
        ]
    );

    // The superseded generation never produces an End.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(sub.try_recv().is_none());
    assert_eq!(runner.status().state, RunState::Idle);

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn rules_select_profile_per_input() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();

    let catalog = Catalog::builder()
        .profile(sh("helm", "echo helm"))
        .profile(sh("kustomize", "echo kustomize"))
        .rule(Rule::file("Chart.yaml", "helm").unwrap())
        .rule(Rule::file("kustomization.yaml", "kustomize").unwrap())
        .build()
        .unwrap();
    let runner = Runner::builder(dir.path(), catalog).build().unwrap();
    let mut sub = runner.subscribe();

    runner.trigger().await.unwrap();
    match next(&mut sub).await.kind {
        EventKind::Start { profile, .. } => assert_eq!(profile.name(), "kustomize"),
        other => panic!("expected Start, got {other:?}"),
    }
    let end = next(&mut sub).await;
    assert_eq!(end.output().unwrap().stdout(), b"kustomize\n");
    assert_eq!(
        runner.status().profile.map(|p| p.name().to_string()),
        Some("kustomize".to_string())
    );

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn unresolvable_input_returns_error_and_starts_nothing() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::builder()
        .profile(sh("helm", "echo helm"))
        .rule(Rule::file("Chart.yaml", "helm").unwrap())
        .build()
        .unwrap();
    let runner = Runner::builder(dir.path(), catalog).build().unwrap();
    let mut sub = runner.subscribe();

    let err = runner.trigger().await.unwrap_err();
    assert!(matches!(err, RuntimeError::NoProfileMatched { .. }));
    assert!(sub.try_recv().is_none());
    assert_eq!(runner.status().generation, 0);

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn spawn_failure_is_published_as_end() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::single(Profile::new("ghost", "no-such-render-binary-5d2e"));
    let runner = Runner::builder(dir.path(), catalog).build().unwrap();
    let mut sub = runner.subscribe();

    runner.trigger().await.unwrap();
    assert!(matches!(next(&mut sub).await.kind, EventKind::Start { .. }));
    let end = next(&mut sub).await;
    assert!(matches!(
        end.output().unwrap().error(),
        Some(RenderError::Spawn { .. })
    ));

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn named_and_ad_hoc_profiles() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::builder()
        .profile(sh("a", "echo a"))
        .profile(sh("b", "echo b"))
        .default_profile("a")
        .build()
        .unwrap();

    let err = Runner::builder(dir.path(), catalog.clone())
        .profile(ProfileChoice::Named("missing".into()))
        .build()
        .unwrap_err();
    assert_eq!(err.as_label(), "runtime_unknown_profile");

    let runner = Runner::builder(dir.path(), catalog)
        .profile(ProfileChoice::Named("b".into()))
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    runner.trigger().await.unwrap();
    next(&mut sub).await;
    assert_eq!(next(&mut sub).await.output().unwrap().stdout(), b"b\n");

    runner
        .configure(Configure::default().profile(ProfileChoice::AdHoc("echo 'ad hoc'".into())))
        .await
        .unwrap();
    match next(&mut sub).await.kind {
        EventKind::Configure { profile, watching } => {
            assert_eq!(profile.unwrap().command(), "echo");
            assert!(!watching);
        }
        other => panic!("expected Configure, got {other:?}"),
    }
    // Not watching: configure alone does not render.
    assert!(sub.try_recv().is_none());

    runner.trigger().await.unwrap();
    next(&mut sub).await;
    assert_eq!(next(&mut sub).await.output().unwrap().stdout(), b"ad hoc\n");

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn full_subscription_still_receives_end() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::single(sh("slow", "sleep 0.3; echo ok"));
    let runner = Runner::builder(dir.path(), catalog)
        .config(RunnerConfig {
            subscriber_capacity: 1,
            ..fast_config()
        })
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    runner.trigger().await.unwrap();
    runner.trigger().await.unwrap();

    // Start(1) fills the queue; Cancel(1) and Start(2) are dropped; End(2) is not.
    let first = next(&mut sub).await;
    assert_eq!((first.kind.as_label(), first.generation()), ("start", Some(1)));
    let end = next(&mut sub).await;
    assert_eq!((end.kind.as_label(), end.generation()), ("end", Some(2)));
    assert_eq!(end.output().unwrap().stdout(), b"ok\n");

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn file_change_triggers_rerender() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("pod.yaml");
    std::fs::write(&manifest, "kind: Pod\n").unwrap();

    let catalog = Catalog::single(sh("cat", "cat pod.yaml"));
    let runner = Runner::builder(dir.path(), catalog)
        .config(fast_config())
        .watch(true)
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    let mut status = runner.status_watch();
    timeout(WAIT, status.wait_for(|s| s.watching))
        .await
        .unwrap()
        .unwrap();

    std::fs::write(&manifest, "kind: Service\n").unwrap();

    let start = next_run_event(&mut sub).await;
    assert!(matches!(start.kind, EventKind::Start { .. }));
    let end = next_run_event(&mut sub).await;
    assert_eq!(end.output().unwrap().stdout(), b"kind: Service\n");

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn rapid_changes_within_debounce_start_one_render() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("pod.yaml");
    std::fs::write(&manifest, "kind: Pod\n").unwrap();

    let catalog = Catalog::single(sh("cat", "cat pod.yaml"));
    let runner = Runner::builder(dir.path(), catalog)
        .config(RunnerConfig {
            debounce: Duration::from_millis(200),
            ..fast_config()
        })
        .watch(true)
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    let mut status = runner.status_watch();
    timeout(WAIT, status.wait_for(|s| s.watching))
        .await
        .unwrap()
        .unwrap();

    for i in 0..10 {
        std::fs::write(&manifest, format!("kind: Pod\nrevision: {i}\n")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let start = next_run_event(&mut sub).await;
    assert!(matches!(start.kind, EventKind::Start { .. }));
    let end = next_run_event(&mut sub).await;
    assert_eq!(end.output().unwrap().stdout(), b"kind: Pod\nrevision: 9\n");

    // Well past another debounce window: nothing else may start.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let mut starts = 0;
    while let Some(ev) = sub.try_recv() {
        if matches!(ev.kind, EventKind::Start { .. }) {
            starts += 1;
        }
    }
    assert_eq!(starts, 0);

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn removing_watched_input_fails_the_watch() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("pod.yaml");
    std::fs::write(&manifest, "kind: Pod\n").unwrap();

    let catalog = Catalog::single(sh("cat", "cat pod.yaml"));
    let runner = Runner::builder(&manifest, catalog)
        .config(fast_config())
        .watch(true)
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    let mut status = runner.status_watch();
    timeout(WAIT, status.wait_for(|s| s.watching))
        .await
        .unwrap()
        .unwrap();

    std::fs::remove_file(&manifest).unwrap();

    let end = next_run_event(&mut sub).await;
    assert!(end.is_terminal());
    assert!(matches!(
        end.output().unwrap().error(),
        Some(RenderError::WatchFailed { .. })
    ));
    match next(&mut sub).await.kind {
        EventKind::Configure { watching, .. } => assert!(!watching),
        other => panic!("expected Configure, got {other:?}"),
    }
    assert!(!runner.status().watching);
    assert_eq!(runner.status().state, RunState::Idle);

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn configure_rerenders_when_watching() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::single(Profile::new("echo", "echo"));
    let runner = Runner::builder(dir.path(), catalog)
        .config(fast_config())
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    runner
        .configure(Configure::default().watch(true))
        .await
        .unwrap();
    match next(&mut sub).await.kind {
        EventKind::Configure { watching, .. } => assert!(watching),
        other => panic!("expected Configure, got {other:?}"),
    }
    // Enabling watch alone does not render.
    assert!(sub.try_recv().is_none());

    runner
        .configure(Configure::default().extra_args(["--set", "x=1"]))
        .await
        .unwrap();
    assert!(matches!(
        next(&mut sub).await.kind,
        EventKind::Configure { .. }
    ));
    assert!(matches!(next(&mut sub).await.kind, EventKind::Start { .. }));
    assert_eq!(
        next(&mut sub).await.output().unwrap().stdout(),
        b"--set x=1\n"
    );

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_cancels_in_flight_and_closes_subscriptions() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::single(sh("sleepy", "sleep 30"));
    let runner = Runner::builder(dir.path(), catalog)
        .config(fast_config())
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    runner.trigger().await.unwrap();
    timeout(WAIT, runner.shutdown()).await.unwrap().unwrap();

    assert!(matches!(next(&mut sub).await.kind, EventKind::Start { .. }));
    assert!(matches!(next(&mut sub).await.kind, EventKind::Cancel { generation: 1 }));
    assert!(sub.recv().await.is_none());

    assert!(runner.status().closed);
    assert_eq!(runner.trigger().await.unwrap_err(), RuntimeError::Closed);
}

#[tokio::test]
async fn sink_subscriber_holds_latest_output() {
    let dir = TempDir::new().unwrap();
    let latest = Arc::new(LatestOutput::new());
    let catalog = Catalog::single(Profile::new("echo", "echo").with_args(["rendered"]));
    let runner = Runner::builder(dir.path(), catalog)
        .with_subscribers(vec![Arc::new(SinkSubscriber::new(latest.clone()))])
        .build()
        .unwrap();

    let mut rx = latest.watch();
    runner.trigger().await.unwrap();
    timeout(WAIT, rx.wait_for(|r| r.is_some()))
        .await
        .unwrap()
        .unwrap();
    let rendered = latest.latest().unwrap();
    assert_eq!(rendered.generation, 1);
    assert_eq!(rendered.output.stdout(), b"rendered\n");

    runner.shutdown().await.unwrap();
}

#[tokio::test]
async fn runner_logs_land_in_buffer_dispatch() {
    let dir = TempDir::new().unwrap();
    let buffer = CircularLogBuffer::new(64);
    let catalog = Catalog::single(Profile::new("echo", "echo").with_args(["hi"]));
    let runner = Runner::builder(dir.path(), catalog)
        .with_dispatch(logs::dispatch(&buffer, "info"))
        .build()
        .unwrap();
    let mut sub = runner.subscribe();

    runner.trigger().await.unwrap();
    next(&mut sub).await;
    next(&mut sub).await;
    runner.shutdown().await.unwrap();

    let lines = buffer.lines();
    assert!(lines.iter().any(|l| l.contains("render started")));
    assert!(lines.iter().any(|l| l.contains("render finished")));
}
