use std::time::Duration;

use tokio::process::Child;

/// SIGTERM, then SIGKILL if the child is still alive after `grace`.
#[cfg(target_family = "unix")]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    if let Some(id) = child.id() {
        // SAFETY: kill(2) has no memory-safety preconditions; `id` is our own unreaped child.
        let rc = unsafe { libc::kill(id as libc::pid_t, libc::SIGTERM) };
        if rc == 0
            && let Ok(status) = tokio::time::timeout(grace, child.wait()).await
        {
            return status.map(|_| ());
        }
    }
    child.kill().await
}

#[cfg(target_family = "windows")]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    child.kill().await
}
