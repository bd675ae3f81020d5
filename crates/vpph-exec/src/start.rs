use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::{debug, info};
use vpph_context::CallContext;

use crate::{
    config::{CONF_FILENAME, DEFAULT_CONFIG_TEMPLATE, RUN_DIR, write_default_config_files},
    error::StartError,
    proc::{self, ExitWatch, ProcConfig},
};

/// API socket file name inside the run directory.
const API_SOCKET: &str = "api.sock";

/// Where and how the worker is started.
#[derive(Clone, Debug)]
pub struct StartOptions {
    pub root_dir: PathBuf,
    pub config_template: String,
    pub program: String,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/"),
            config_template: DEFAULT_CONFIG_TEMPLATE.to_string(),
            program: "vpp".to_string(),
        }
    }
}

impl StartOptions {
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn with_config_template(mut self, template: impl Into<String>) -> Self {
        self.config_template = template.into();
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.root_dir.join(CONF_FILENAME)
    }

    pub fn api_socket(&self) -> PathBuf {
        self.root_dir.join(RUN_DIR).join(API_SOCKET)
    }
}

/// Opens a connection to a worker's API socket.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Connection: Send;
    type Error: Display + Send;

    async fn dial(&self, ctx: &CallContext, socket: &Path) -> Result<Self::Connection, Self::Error>;
}

/// Writes missing default config files, launches the worker and dials its API socket.
///
/// The worker lives until `ctx` is done or the returned [`ExitWatch`] is stopped, so `ctx` should
/// span the worker's lifetime; bound the dial inside the [`Dialer`]. A worker exiting while the
/// dial is pending aborts the dial. A failed dial stops the worker.
pub async fn start_and_dial<D>(
    ctx: &CallContext,
    options: &StartOptions,
    dialer: &D,
) -> Result<(D::Connection, ExitWatch), StartError>
where
    D: Dialer + ?Sized,
{
    write_default_config_files(&options.root_dir, &options.config_template).await?;

    let config_path = options.config_path();
    let cfg = ProcConfig::new(&options.program)
        .with_args(["-c".to_string(), config_path.display().to_string()]);

    info!(target: "vpph.exec.proc", program = %options.program, config = %config_path.display(), "starting worker");
    let mut exit = proc::spawn(ctx, &cfg)?;

    let socket = options.api_socket();
    debug!(target: "vpph.exec.proc", socket = %socket.display(), "dialing worker");
    let dialed = tokio::select! {
        biased;
        outcome = exit.exited() => {
            return Err(match outcome {
                Ok(()) => StartError::ExitedEarly,
                Err(e) => StartError::Exec(e),
            });
        }
        dialed = dialer.dial(ctx, &socket) => dialed,
    };

    match dialed {
        Ok(conn) => Ok((conn, exit)),
        Err(e) => {
            exit.stop();
            Err(StartError::Dial {
                socket,
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        os::unix::fs::PermissionsExt,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::error::ExecError;

    struct RecordingDialer {
        fail: bool,
        dialed: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl RecordingDialer {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                dialed: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Dialer for RecordingDialer {
        type Connection = PathBuf;
        type Error = String;

        async fn dial(&self, _ctx: &CallContext, socket: &Path) -> Result<PathBuf, String> {
            self.dialed.lock().unwrap().push(socket.to_path_buf());
            if self.fail {
                Err("connection refused".to_string())
            } else {
                Ok(socket.to_path_buf())
            }
        }
    }

    /// Never connects; gives up when its context is done.
    struct UnreachableDialer;

    #[async_trait]
    impl Dialer for UnreachableDialer {
        type Connection = ();
        type Error = vpph_context::ContextError;

        async fn dial(&self, ctx: &CallContext, _socket: &Path) -> Result<(), Self::Error> {
            Err(ctx.done().await)
        }
    }

    /// Connects after a while, bounding the attempt with its own timeout.
    struct SlowDialer;

    #[async_trait]
    impl Dialer for SlowDialer {
        type Connection = ();
        type Error = vpph_context::ContextError;

        async fn dial(&self, ctx: &CallContext, _socket: &Path) -> Result<(), Self::Error> {
            let ctx = ctx.with_timeout(Duration::from_millis(100));
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(50)) => Ok(()),
                err = ctx.done() => Err(err),
            }
        }
    }

    fn worker_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-vpp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Executable script that records its arguments and then sleeps.
    fn fake_worker(dir: &Path) -> PathBuf {
        let args = dir.join("args");
        worker_script(dir, &format!("echo \"$@\" > {}\nexec sleep 30", args.display()))
    }

    async fn start_with_script(body: &str) -> Result<((), ExitWatch), StartError> {
        let root = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let options = StartOptions::default()
            .with_root_dir(root.path())
            .with_program(worker_script(bin.path(), body).display().to_string());
        let ctx = CallContext::background();

        tokio::time::timeout(
            Duration::from_secs(10),
            start_and_dial(&ctx, &options, &UnreachableDialer),
        )
        .await
        .expect("early exit did not abort the dial")
    }

    #[test]
    fn default_options() {
        let options = StartOptions::default();
        assert_eq!(options.root_dir, PathBuf::from("/"));
        assert_eq!(options.program, "vpp");
        assert_eq!(options.config_template, DEFAULT_CONFIG_TEMPLATE);
        assert_eq!(options.config_path(), PathBuf::from("/etc/vpp/vpp.conf"));
        assert_eq!(options.api_socket(), PathBuf::from("/var/run/vpp/api.sock"));
    }

    #[tokio::test]
    async fn starts_worker_and_dials_api_socket() {
        let root = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let options = StartOptions::default()
            .with_root_dir(root.path())
            .with_program(fake_worker(bin.path()).display().to_string());
        let dialer = RecordingDialer::new(false);

        let (conn, exit) = start_and_dial(&CallContext::background(), &options, &dialer)
            .await
            .unwrap();

        assert_eq!(conn, root.path().join("var/run/vpp/api.sock"));
        assert!(root.path().join("etc/vpp/vpp.conf").is_file());
        assert!(root.path().join("var/log/vpp").is_dir());

        let args_file = bin.path().join("args");
        for _ in 0..500 {
            if std::fs::read_to_string(&args_file).is_ok_and(|s| s.ends_with('\n')) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        exit.stop();
        let outcome = tokio::time::timeout(Duration::from_secs(10), exit.wait())
            .await
            .expect("worker was not stopped");
        assert!(matches!(outcome, Err(ExecError::Cancelled)));

        let args = std::fs::read_to_string(&args_file).unwrap();
        assert_eq!(
            args.trim(),
            format!("-c {}", root.path().join("etc/vpp/vpp.conf").display())
        );
    }

    #[tokio::test]
    async fn keeps_existing_config() {
        let root = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("etc/vpp")).unwrap();
        std::fs::write(root.path().join("etc/vpp/vpp.conf"), "custom").unwrap();

        let options = StartOptions::default()
            .with_root_dir(root.path())
            .with_program(fake_worker(bin.path()).display().to_string());
        let (_conn, exit) = start_and_dial(
            &CallContext::background(),
            &options,
            &RecordingDialer::new(false),
        )
        .await
        .unwrap();
        exit.stop();

        let conf = std::fs::read_to_string(root.path().join("etc/vpp/vpp.conf")).unwrap();
        assert_eq!(conf, "custom");
    }

    #[tokio::test]
    async fn dial_failure_stops_worker() {
        let root = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let options = StartOptions::default()
            .with_root_dir(root.path())
            .with_program(fake_worker(bin.path()).display().to_string());
        let dialer = RecordingDialer::new(true);

        let err = start_and_dial(&CallContext::background(), &options, &dialer)
            .await
            .unwrap_err();

        match err {
            StartError::Dial { socket, reason } => {
                assert_eq!(socket, root.path().join("var/run/vpp/api.sock"));
                assert_eq!(reason, "connection refused");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dialer.dialed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clean_early_exit_aborts_dial() {
        let err = start_with_script("exit 0").await.unwrap_err();
        assert!(matches!(err, StartError::ExitedEarly), "got {err}");
    }

    #[tokio::test]
    async fn failing_early_exit_aborts_dial() {
        let err = start_with_script("exit 1").await.unwrap_err();
        assert!(
            matches!(err, StartError::Exec(ExecError::NonZeroExit { code: 1 })),
            "got {err}"
        );
    }

    #[tokio::test]
    async fn worker_outlives_dial_timeout() {
        let root = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let options = StartOptions::default()
            .with_root_dir(root.path())
            .with_program(fake_worker(bin.path()).display().to_string());

        let ((), mut exit) = start_and_dial(&CallContext::background(), &options, &SlowDialer)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(exit.try_outcome().is_none(), "worker stopped with the dial");
        exit.stop();
    }

    #[tokio::test]
    async fn missing_program_is_reported_before_dialing() {
        let root = tempfile::tempdir().unwrap();
        let options = StartOptions::default()
            .with_root_dir(root.path())
            .with_program("/nonexistent/vpp");
        let dialer = RecordingDialer::new(false);

        let err = start_and_dial(&CallContext::background(), &options, &dialer)
            .await
            .unwrap_err();

        assert!(matches!(err, StartError::Exec(ExecError::Spawn(_))));
        assert!(dialer.dialed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broken_template_is_a_config_error() {
        let root = tempfile::tempdir().unwrap();
        let options = StartOptions::default()
            .with_root_dir(root.path())
            .with_config_template("{{ .Missing }}");

        let err = start_and_dial(
            &CallContext::background(),
            &options,
            &RecordingDialer::new(false),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StartError::Config(_)));
    }
}
