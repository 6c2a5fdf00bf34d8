//! # Run one external render command to completion.
//!
//! [`Executor::start`] spawns a background task that owns the child process and returns an
//! [`ExecHandle`] immediately. The handle's [`wait`](ExecHandle::wait) resolves to the
//! attempt's [`Output`]; [`cancel`](ExecHandle::cancel) asks the child to stop.
//!
//! ## Flow
//! ```text
//! start(profile, extra_args, workdir, parent)
//!   └─► spawn task
//!         ├─ Command::spawn ── Err ──► Output{ error: Spawn }
//!         ├─ read stdout ┐ (independent reader tasks)
//!         ├─ read stderr ┘
//!         └─ select!
//!              ├─ child.wait()      ──► Output{ stdout, stderr, error: None | Exit }
//!              └─ token.cancelled() ──► SIGTERM group ─(kill_grace)─► kill
//!                                       └─► Output{ error: Cancelled }
//!         then drain the pipes, still racing token.cancelled()
//! ```
//!
//! ## Rules
//! - Spawn failures are reported **inside** the output, never as a separate error path
//! - A cancelled attempt resolves with [`RenderError::Cancelled`], distinguishable from failure
//! - `cancel()` is idempotent and a no-op once the attempt has completed
//! - The per-attempt token is a **child** of the caller's token; parent cancellation propagates
//! - Children are spawned with `kill_on_drop` in their own process group (unix), stdin is null
//! - Cancellation also wins while the pipes drain, so `wait()` resolves even if a
//!   background grandchild keeps stdout open

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;

use crate::error::RenderError;
use crate::profiles::Profile;

use super::Output;

/// Default pause between SIGTERM and a hard kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(1500);

/// Spawns render commands.
#[derive(Clone, Copy, Debug)]
pub struct Executor {
    kill_grace: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_GRACE)
    }
}

impl Executor {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }

    /// Starts `profile` with `extra_args` appended, in `workdir`.
    ///
    /// Must be called from within a tokio runtime. Returns without waiting for the child.
    pub fn start(
        &self,
        profile: &Profile,
        extra_args: &[String],
        workdir: &Path,
        parent: &CancellationToken,
    ) -> ExecHandle {
        let token = parent.child_token();
        let program = profile.command().to_string();
        let argv = profile.argv(extra_args);

        let mut cmd = Command::new(&program);
        cmd.args(&argv)
            .current_dir(workdir)
            .envs(profile.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so cancellation reaches everything the command forks.
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(
            profile = profile.name(),
            command = %program,
            args = ?argv,
            workdir = %workdir.display(),
            "spawning render command"
        );

        let started_at = Instant::now();
        let join = tokio::spawn(
            supervise(cmd, program, token.clone(), self.kill_grace).with_current_subscriber(),
        );

        ExecHandle {
            token,
            join,
            started_at,
        }
    }
}

/// Handle to one in-flight attempt.
#[derive(Debug)]
pub struct ExecHandle {
    token: CancellationToken,
    join: JoinHandle<Output>,
    started_at: Instant,
}

impl ExecHandle {
    /// Requests termination. Idempotent; a no-op after completion.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this attempt; lets a caller cancel after handing the handle away.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the attempt. Only the awaiting task is suspended.
    pub async fn wait(self) -> Output {
        match self.join.await {
            Ok(output) => output,
            Err(e) => Output::from_error(RenderError::Internal {
                reason: e.to_string(),
            })
            .with_duration(self.started_at.elapsed()),
        }
    }
}

/// Working directory for an input: the directory itself, or a file's parent.
pub fn working_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        return input.to_path_buf();
    }
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn supervise(
    mut cmd: Command,
    program: String,
    token: CancellationToken,
    kill_grace: Duration,
) -> Output {
    let started = Instant::now();

    if token.is_cancelled() {
        return Output::from_error(RenderError::Cancelled);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Output::from_error(RenderError::Spawn {
                command: program,
                reason: e.to_string(),
            })
            .with_duration(started.elapsed());
        }
    };

    let pid = child.id();
    let mut stdout = tokio::spawn(read_all(child.stdout.take()).with_current_subscriber());
    let mut stderr = tokio::spawn(read_all(child.stderr.take()).with_current_subscriber());

    let status = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        status = child.wait() => Some(status),
    };

    let Some(status) = status else {
        terminate_then_kill(&mut child, pid, kill_grace).await;
        stdout.abort();
        stderr.abort();
        return Output::from_error(RenderError::Cancelled).with_duration(started.elapsed());
    };

    // The child is gone, but anything it left in the background may still hold the pipes.
    let streams = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        streams = async { (collect(&mut stdout).await, collect(&mut stderr).await) } => Some(streams),
    };
    let Some((stdout, stderr)) = streams else {
        #[cfg(unix)]
        signal_group(pid, nix::sys::signal::Signal::SIGKILL);
        stdout.abort();
        stderr.abort();
        return Output::from_error(RenderError::Cancelled).with_duration(started.elapsed());
    };

    let error = match (status, &stdout, &stderr) {
        (Err(e), _, _) => Some(RenderError::Io {
            reason: e.to_string(),
        }),
        (Ok(status), _, _) if !status.success() => Some(RenderError::Exit {
            command: program,
            code: status.code(),
        }),
        (Ok(_), Err(e), _) | (Ok(_), _, Err(e)) => Some(e.clone()),
        (Ok(_), Ok(_), Ok(_)) => None,
    };

    Output::new(
        stdout.unwrap_or_default(),
        stderr.unwrap_or_default(),
        error,
        started.elapsed(),
    )
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn collect(
    reader: &mut JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, RenderError> {
    match reader.await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(RenderError::Io {
            reason: e.to_string(),
        }),
        Err(e) => Err(RenderError::Internal {
            reason: e.to_string(),
        }),
    }
}

/// SIGTERM to the process group first (unix), hard kill once `grace` elapses.
///
/// Whatever is left of the group afterwards is killed too.
#[cfg_attr(not(unix), allow(unused_variables))]
async fn terminate_then_kill(child: &mut Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);

    let exited = timeout(grace, child.wait()).await.is_ok();
    if !exited {
        tracing::debug!(grace = ?grace, "render command ignored SIGTERM, killing");
        let _ = child.start_kill();
    }
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    if !exited {
        let _ = child.wait().await;
    }
}

/// Signals the process group led by `pid`. The group may already be gone.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        let _ = killpg(Pid::from_raw(pid as i32), signal);
    }
}
