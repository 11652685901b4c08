//! Daemon process management
//!
//! PID-file bookkeeping and process control for the background
//! orchestrator.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use eyre::{Context, Result};
use tracing::{debug, info, warn};

/// Default PID file location
fn default_pid_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("midnight")
        .join("midnight.pid")
}

/// Daemon process manager
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    /// Create a manager with the default PID file location
    pub fn new() -> Self {
        Self {
            pid_file: default_pid_path(),
        }
    }

    /// Create a manager with a custom PID file path
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    /// Check if a daemon is running
    pub fn is_running(&self) -> bool {
        self.read_pid().is_some_and(is_process_running)
    }

    /// Get the running daemon's PID
    pub fn running_pid(&self) -> Option<u32> {
        self.read_pid().filter(|&pid| is_process_running(pid))
    }

    fn read_pid(&self) -> Option<u32> {
        if !self.pid_file.exists() {
            return None;
        }
        let mut file = fs::File::open(&self.pid_file).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;
        contents.trim().parse().ok()
    }

    fn write_pid(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("Failed to create PID file directory")?;
        }
        let mut file = fs::File::create(&self.pid_file).context("Failed to create PID file")?;
        write!(file, "{}", pid).context("Failed to write PID")?;
        debug!(pid, path = ?self.pid_file, "Wrote PID file");
        Ok(())
    }

    fn remove_pid_file(&self) -> Result<()> {
        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file).context("Failed to remove PID file")?;
        }
        Ok(())
    }

    /// Start the daemon by spawning `run-daemon` detached
    pub fn start(&self) -> Result<u32> {
        if let Some(pid) = self.running_pid() {
            return Err(eyre::eyre!("Daemon already running with PID {}", pid));
        }

        info!("Starting daemon...");
        let exe = std::env::current_exe().context("Failed to get current executable")?;
        let child = Command::new(&exe)
            .arg("run-daemon")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn daemon process")?;

        let pid = child.id();
        self.write_pid(pid)?;
        info!(pid, "Daemon started");
        Ok(pid)
    }

    /// Stop the daemon.
    ///
    /// Graceful stop sends SIGTERM and waits; `force` (or a timeout) falls
    /// back to SIGKILL.
    pub fn stop(&self, force: bool) -> Result<()> {
        let pid = self
            .running_pid()
            .ok_or_else(|| eyre::eyre!("Daemon is not running"))?;

        info!(pid, force, "Stopping daemon...");

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
            kill(Pid::from_raw(pid as i32), signal).context("Failed to signal daemon")?;
        }

        let mut attempts = 0;
        while is_process_running(pid) && attempts < 50 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            attempts += 1;
        }

        if is_process_running(pid) {
            warn!(pid, "Daemon did not stop gracefully, sending SIGKILL");
            #[cfg(unix)]
            {
                use nix::sys::signal::{Signal, kill};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }

        self.remove_pid_file()?;
        info!(pid, "Daemon stopped");
        Ok(())
    }

    /// Register the current process as the daemon
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        self.write_pid(pid)?;
        info!(pid, "Daemon registered");
        Ok(())
    }

    /// Remove the PID file on clean shutdown of the daemon itself
    pub fn unregister_self(&self) -> Result<()> {
        self.remove_pid_file()
    }

    /// Get the PID file path
    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    /// Get the daemon status
    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.clone(),
        }
    }
}

/// Check if a process with the given PID is running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        // Signal 0 probes for existence without affecting the process
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// Daemon status information
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_not_running_without_pid_file() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("mn.pid"));
        assert!(!manager.is_running());
        assert!(manager.running_pid().is_none());
    }

    #[test]
    fn test_write_and_read_pid() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("mn.pid"));

        manager.write_pid(424242).unwrap();
        assert_eq!(manager.read_pid(), Some(424242));

        manager.remove_pid_file().unwrap();
        assert_eq!(manager.read_pid(), None);
    }

    #[test]
    fn test_stale_pid_is_not_running() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("mn.pid"));

        // An unlikely-to-exist PID just under the default pid_max
        manager.write_pid(3_999_999).unwrap();
        assert!(!manager.is_running());
    }

    #[test]
    fn test_register_self_writes_own_pid() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("mn.pid"));

        manager.register_self().unwrap();
        assert_eq!(manager.read_pid(), Some(std::process::id()));
        // Our own process exists
        assert!(manager.is_running());
    }

    #[test]
    fn test_status() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("mn.pid");
        let manager = DaemonManager::with_pid_file(pid_file.clone());

        let status = manager.status();
        assert!(!status.running);
        assert_eq!(status.pid_file, pid_file);
    }

    #[test]
    fn test_stop_without_daemon_errors() {
        let temp = TempDir::new().unwrap();
        let manager = DaemonManager::with_pid_file(temp.path().join("mn.pid"));
        assert!(manager.stop(false).is_err());
    }
}
