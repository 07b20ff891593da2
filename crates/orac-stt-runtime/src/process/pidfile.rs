//! Engine pidfile handling.
//!
//! The supervisor records its child's PID so that a crashed service can adopt
//! and kill the orphaned engine on the next boot instead of fighting it for
//! the port. The pidfile is advisory: a stale PID whose command line no
//! longer matches the engine binary is ignored and removed.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Write the engine PID, creating parent directories as needed.
pub fn write_pidfile(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, pid.to_string())
}

/// Remove the pidfile, tolerating absence.
pub fn delete_pidfile(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "failed to remove pidfile");
        }
    }
}

/// Kill an orphaned engine recorded in the pidfile, if one is still running.
///
/// Verifies the PID's command line contains `binary_name` before signalling
/// anything — PIDs get recycled. Returns whether a process was terminated.
pub async fn kill_stale_engine(path: &Path, binary_name: &str) -> bool {
    let Some(pid) = read_pidfile(path) else {
        return false;
    };
    delete_pidfile(path);

    if !process_matches(pid, binary_name) {
        return false;
    }

    tracing::warn!(pid, "adopting orphaned engine from previous run, terminating it");
    terminate_pid(pid).await
}

fn read_pidfile(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}

#[cfg(unix)]
fn process_matches(pid: u32, binary_name: &str) -> bool {
    let cmdline_path = format!("/proc/{pid}/cmdline");
    match fs::read(&cmdline_path) {
        Ok(raw) => String::from_utf8_lossy(&raw).contains(binary_name),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_matches(_pid: u32, _binary_name: &str) -> bool {
    false
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(unix)]
async fn terminate_pid(pid: u32) -> bool {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let nix_pid = Pid::from_raw(pid as i32);
    if signal::kill(nix_pid, Signal::SIGTERM).is_err() {
        return false;
    }

    // Poll for exit through the SIGTERM grace window, then force.
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if !is_alive(pid) {
            tracing::info!(pid, "orphaned engine terminated");
            return true;
        }
    }

    tracing::warn!(pid, "orphaned engine ignored SIGTERM, sending SIGKILL");
    let _ = signal::kill(nix_pid, Signal::SIGKILL);
    tokio::time::sleep(Duration::from_millis(500)).await;
    true
}

#[cfg(not(unix))]
async fn terminate_pid(_pid: u32) -> bool {
    false
}
