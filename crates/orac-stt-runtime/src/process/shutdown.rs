//! Graceful child termination with SIGTERM → SIGKILL escalation.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How long a child gets to exit after SIGTERM before SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(5);

/// Terminate a child process, preferring a graceful exit.
///
/// Sends SIGTERM and waits up to [`TERM_GRACE`]; a child still running after
/// that is killed outright. Always reaps the child so no zombie is left. On
/// non-Unix platforms the child is killed immediately.
pub async fn terminate_child(mut child: Child) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        let Some(pid) = child.id() else {
            // Already reaped.
            return child.wait().await;
        };

        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            if e == nix::errno::Errno::ESRCH {
                return child.wait().await;
            }
            return Err(io::Error::other(e));
        }

        if let Ok(result) = tokio::time::timeout(TERM_GRACE, child.wait()).await {
            return result;
        }

        tracing::warn!(pid, "engine ignored SIGTERM, escalating to SIGKILL");
        child.kill().await?;
        child.wait().await
    }

    #[cfg(not(unix))]
    {
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    #[cfg(unix)]
    async fn sigterm_stops_a_sleeping_child() {
        let child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn sleep");
        let status = terminate_child(child).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn already_exited_child_is_reaped() {
        let child = Command::new("echo")
            .arg("done")
            .stdout(std::process::Stdio::null())
            .spawn()
            .expect("failed to spawn echo");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(terminate_child(child).await.is_ok());
    }
}
