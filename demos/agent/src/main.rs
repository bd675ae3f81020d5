use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};
use tracing::{info, warn};

use vpph_context::{CallContext, ContextError};
use vpph_core::{Connection, ExtendTimeout};
use vpph_exec::{Dialer, StartOptions, start_and_dial};
use vpph_observe::{LoggerConfig, init_logger};

/// Root directory for the worker's config and runtime files.
const ENV_ROOT_DIR: &str = "VPPH_ROOT_DIR";
/// Worker binary.
const ENV_PROGRAM: &str = "VPPH_PROGRAM";

/// Request/reply over a fresh connection to the worker's API socket.
struct SocketConnection {
    socket: PathBuf,
}

#[derive(Error, Debug)]
enum CallError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
impl Connection for SocketConnection {
    type Request = Vec<u8>;
    type Reply = Vec<u8>;
    type Error = CallError;

    async fn invoke(&self, ctx: &CallContext, request: &Vec<u8>) -> Result<Vec<u8>, CallError> {
        let exchange = async {
            let mut stream = UnixStream::connect(&self.socket).await?;
            stream.write_all(request).await?;
            stream.shutdown().await?;
            let mut reply = Vec::new();
            stream.read_to_end(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };

        tokio::select! {
            reply = exchange => Ok(reply?),
            err = ctx.done() => Err(err.into()),
        }
    }
}

/// Waits up to `timeout` for the API socket to appear.
struct SocketDialer {
    poll: Duration,
    timeout: Duration,
}

#[async_trait]
impl Dialer for SocketDialer {
    type Connection = SocketConnection;
    type Error = ContextError;

    async fn dial(&self, ctx: &CallContext, socket: &Path) -> Result<SocketConnection, ContextError> {
        let ctx = ctx.with_timeout(self.timeout);
        loop {
            if tokio::fs::try_exists(socket).await.unwrap_or(false) {
                return Ok(SocketConnection {
                    socket: socket.to_path_buf(),
                });
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll) => {}
                err = ctx.done() => return Err(err),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let cfg = LoggerConfig::from_env()?;
    init_logger(&cfg)?;
    info!("logger initialized");

    // 2) Worker
    let mut options = StartOptions::default();
    if let Ok(root) = std::env::var(ENV_ROOT_DIR) {
        options = options.with_root_dir(root);
    }
    if let Ok(program) = std::env::var(ENV_PROGRAM) {
        options = options.with_program(program);
    }

    let (root_ctx, shutdown) = CallContext::background().with_cancel();
    let dialer = SocketDialer {
        poll: Duration::from_millis(100),
        timeout: Duration::from_secs(30),
    };
    let (conn, exit) = start_and_dial(&root_ctx, &options, &dialer)
        .await
        .context("start worker")?;
    info!(pid = ?exit.pid(), "worker ready");

    // 3) Calls get at least five seconds, whatever the caller asked for
    let conn = ExtendTimeout::new(conn, Duration::from_secs(5));
    let call_ctx = root_ctx.with_timeout(Duration::from_millis(100));
    match conn.invoke(&call_ctx, &b"show version\n".to_vec()).await {
        Ok(reply) => info!(bytes = reply.len(), "reply: {}", String::from_utf8_lossy(&reply)),
        Err(e) => warn!(error = %e, "call failed"),
    }

    // 4) Keep running
    info!("press Ctrl+C to stop");
    let worker = exit.wait();
    tokio::pin!(worker);
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        outcome = &mut worker => {
            warn!(?outcome, "worker exited");
            return Ok(());
        }
    }

    info!("shutting down...");
    shutdown.cancel();
    let outcome = worker.await;
    info!(?outcome, "worker stopped");
    conn.drain_watchers().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialer(timeout: Duration) -> SocketDialer {
        SocketDialer {
            poll: Duration::from_millis(10),
            timeout,
        }
    }

    #[tokio::test]
    async fn dial_timeout_leaves_parent_context_running() {
        let dir = tempfile::tempdir().unwrap();
        let parent = CallContext::background();

        let err = dialer(Duration::from_millis(50))
            .dial(&parent, &dir.path().join("api.sock"))
            .await
            .err()
            .expect("dial to a missing socket must time out");

        assert_eq!(err, ContextError::DeadlineExceeded);
        assert!(!parent.is_done());
    }

    #[tokio::test]
    async fn dial_finds_existing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("api.sock");
        std::fs::write(&socket, b"").unwrap();

        let conn = dialer(Duration::from_secs(1))
            .dial(&CallContext::background(), &socket)
            .await
            .unwrap();
        assert_eq!(conn.socket, socket);
    }
}
