//! Worker process launch with output forwarded to `tracing`.

use std::{path::PathBuf, process::ExitStatus, process::Stdio, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::oneshot,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use vpph_context::CallContext;

use crate::{error::ExecError, util::kill_graceful};

/// How long output forwarding may lag behind the worker's exit.
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

/// Process configuration.
#[derive(Clone, Debug)]
pub struct ProcConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Time between SIGTERM and SIGKILL when the worker is stopped.
    pub stop_grace: Duration,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            stop_grace: Duration::from_secs(5),
        }
    }
}

impl ProcConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Handle on a running worker: its exit outcome and a way to stop it.
#[derive(Debug)]
pub struct ExitWatch {
    pid: Option<u32>,
    stop: CancellationToken,
    outcome: oneshot::Receiver<Result<(), ExecError>>,
}

impl ExitWatch {
    #[inline]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Asks the worker to stop (SIGTERM, then SIGKILL after the grace period).
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Outcome if the worker has already exited, without waiting.
    pub fn try_outcome(&mut self) -> Option<Result<(), ExecError>> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ExecError::Lost)),
        }
    }

    /// Waits for the worker to exit.
    pub async fn wait(self) -> Result<(), ExecError> {
        self.outcome.await.unwrap_or(Err(ExecError::Lost))
    }

    /// Waits for the worker to exit without consuming the watch.
    ///
    /// Must not be polled again once it has resolved.
    pub(crate) async fn exited(&mut self) -> Result<(), ExecError> {
        (&mut self.outcome).await.unwrap_or(Err(ExecError::Lost))
    }
}

/// Spawns the worker described by `cfg`.
///
/// Each stdout/stderr line is logged at `info` with a `cmd` field. The worker is stopped when
/// `ctx` is done or [`ExitWatch::stop`] is called; either way the outcome is
/// [`ExecError::Cancelled`].
pub fn spawn(ctx: &CallContext, cfg: &ProcConfig) -> Result<ExitWatch, ExecError> {
    if cfg.program.trim().is_empty() {
        return Err(ExecError::MissingProgram);
    }

    let mut cmd = Command::new(&cfg.program);
    cmd.args(&cfg.args);
    if let Some(cwd) = &cfg.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &cfg.env {
        cmd.env(k, v);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    trace!(target: "vpph.exec.proc", program = %cfg.program, args = ?cfg.args, "spawn");
    let mut child = cmd
        .spawn()
        .map_err(|e| ExecError::Spawn(format!("{}: {e}", cfg.program)))?;
    let pid = child.id();

    let name = command_name(&cfg.program);
    let forwarders = [
        child.stdout.take().map(|out| forward_lines(name.clone(), "stdout", out)),
        child.stderr.take().map(|err| forward_lines(name.clone(), "stderr", err)),
    ];

    let (tx, rx) = oneshot::channel();
    let stop = CancellationToken::new();
    let ctx = ctx.clone();
    let stop_requested = stop.clone();
    let grace = cfg.stop_grace;

    tokio::spawn(async move {
        let outcome = tokio::select! {
            status = child.wait() => {
                drain_output(&name, forwarders).await;
                exit_outcome(status)
            }
            _ = ctx.done() => {
                debug!(target: "vpph.exec.proc", cmd = %name, "context done; stopping worker");
                let _ = kill_graceful(&mut child, grace).await;
                Err(ExecError::Cancelled)
            }
            _ = stop_requested.cancelled() => {
                debug!(target: "vpph.exec.proc", cmd = %name, "stop requested; stopping worker");
                let _ = kill_graceful(&mut child, grace).await;
                Err(ExecError::Cancelled)
            }
        };

        if let Err(e) = &outcome {
            warn!(target: "vpph.exec.proc", cmd = %name, error = %e, "worker exited");
        } else {
            debug!(target: "vpph.exec.proc", cmd = %name, "worker exited");
        }
        let _ = tx.send(outcome);
    });

    Ok(ExitWatch {
        pid,
        stop,
        outcome: rx,
    })
}

/// Waits up to [`OUTPUT_DRAIN`] for the tail of the worker's output.
///
/// A grandchild holding the pipes open must not delay the exit outcome.
async fn drain_output(cmd: &str, forwarders: [Option<JoinHandle<()>>; 2]) {
    let mut handles: Vec<_> = forwarders.into_iter().flatten().collect();
    let drained = tokio::time::timeout(OUTPUT_DRAIN, async {
        for handle in handles.iter_mut() {
            let _ = handle.await;
        }
    })
    .await;
    if drained.is_err() {
        debug!(target: "vpph.exec.proc", cmd, "output still open after exit; detaching");
        for handle in &handles {
            handle.abort();
        }
    }
}

fn exit_outcome(status: std::io::Result<ExitStatus>) -> Result<(), ExecError> {
    let status = status?;
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ExecError::NonZeroExit { code }),
        None => Err(ExecError::KilledBySignal),
    }
}

fn forward_lines<R>(cmd: String, stream: &'static str, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "vpph.exec.proc", cmd = %cmd, stream, "{line}");
        }
    })
}

fn command_name(program: &str) -> String {
    std::path::Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}
