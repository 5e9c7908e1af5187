//! PID file handling
//!
//! One daemon per user: the PID file records who owns the socket. A PID file
//! whose process is gone is considered stale and replaced.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::{getuid, Pid};
use tracing::{info, warn};

/// Get the default PID file path
///
/// Uses XDG_RUNTIME_DIR if available, otherwise /tmp/robot-face-$UID/
pub fn default_pid_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("robot-face").join("face.pid")
    } else {
        PathBuf::from(format!("/tmp/robot-face-{}/face.pid", getuid()))
    }
}

/// Whether a process with this PID exists
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 only checks for existence; EPERM means it exists as another user
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

/// Write the PID file, refusing if a live daemon already owns it
pub fn write_pid_file(path: &Path) -> Result<()> {
    if let Ok(contents) = fs::read_to_string(path) {
        match contents.trim().parse::<i32>() {
            Ok(pid) if u32::try_from(pid).ok() != Some(std::process::id()) && process_alive(pid) => {
                bail!(
                    "Another face daemon is already running (pid {pid}, PID file {})",
                    path.display()
                );
            }
            _ => warn!(path = %path.display(), "Replacing stale PID file"),
        }
    }

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID directory {}", parent.display()))?;
    }

    let pid = std::process::id();
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create PID file {}", path.display()))?;
    writeln!(file, "{pid}")?;

    info!(pid, path = %path.display(), "PID file created");
    Ok(())
}

/// Remove the PID file
pub fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = %path.display(), "Failed to remove PID file");
        } else {
            info!(path = %path.display(), "PID file removed");
        }
    }
}
