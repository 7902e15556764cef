//! Parent process supervision.
//!
//! The simulator is normally launched by a wrapper script or test harness.
//! When that process goes away the simulator must not keep running on its
//! own, so every physics step checks that the parent captured at startup is
//! still the parent.

use crate::error::{Result, SitlError};

/// Watches the process that launched the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentWatch {
    pid: Option<u32>,
}

impl ParentWatch {
    /// Capture the current parent process.
    #[cfg(unix)]
    pub fn capture() -> Self {
        ParentWatch {
            pid: Some(std::os::unix::process::parent_id()),
        }
    }

    /// Parent tracking is not available on this platform.
    #[cfg(not(unix))]
    pub fn capture() -> Self {
        Self::disabled()
    }

    /// Watch an explicit parent pid.
    pub fn for_pid(pid: u32) -> Self {
        ParentWatch { pid: Some(pid) }
    }

    /// Never report the parent as gone.
    pub fn disabled() -> Self {
        ParentWatch { pid: None }
    }

    /// Pid being watched, if any.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Fail if the watched process is no longer our parent.
    ///
    /// An orphaned process is adopted by another process, so a changed
    /// parent id means the original parent has exited.
    pub fn check(&self) -> Result<()> {
        match self.pid {
            Some(pid) if !Self::is_parent(pid) => Err(SitlError::ParentExited { pid }),
            _ => Ok(()),
        }
    }

    #[cfg(unix)]
    fn is_parent(pid: u32) -> bool {
        std::os::unix::process::parent_id() == pid
    }

    #[cfg(not(unix))]
    fn is_parent(_pid: u32) -> bool {
        true
    }
}

impl Default for ParentWatch {
    fn default() -> Self {
        Self::disabled()
    }
}
