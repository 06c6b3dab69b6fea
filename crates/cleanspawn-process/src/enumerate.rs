//! Descriptor enumeration.
//!
//! Lists the descriptors a live process has open by reading the kernel's
//! per-process descriptor directory (`/proc/<pid>/fd` on Linux). The rest
//! of the crate only sees the [`DescriptorEnumerator`] trait, so the
//! concrete facility stays swappable.

use cleanspawn_common::{EnumerateError, EnumerateResult};
use nix::unistd::Pid;
use std::io::ErrorKind;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

/// Default mount point of the process information pseudo-filesystem.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Capability to list the open descriptors of a process.
///
/// Implementations must only report descriptor numbers that were really
/// open at the time of the query. The order of the result is unspecified.
pub trait DescriptorEnumerator: Send + Sync {
    fn enumerate(&self, pid: Pid) -> EnumerateResult<Vec<RawFd>>;
}

/// Enumerator backed by `<proc_root>/<pid>/fd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFdEnumerator {
    proc_root: PathBuf,
}

impl ProcFdEnumerator {
    /// Creates an enumerator reading from `/proc`.
    pub fn new() -> Self {
        Self::with_root(DEFAULT_PROC_ROOT)
    }

    /// Creates an enumerator reading from another procfs mount.
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Builds `<proc_root>/<pid>/fd`, rejecting pids that cannot name a
    /// process.
    fn fd_dir(&self, pid: Pid) -> EnumerateResult<PathBuf> {
        let raw = pid.as_raw();
        if raw <= 0 {
            return Err(EnumerateError::invalid_argument(
                raw,
                "pid must be a positive process id",
            ));
        }
        Ok(self.proc_root.join(raw.to_string()).join("fd"))
    }
}

impl Default for ProcFdEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorEnumerator for ProcFdEnumerator {
    fn enumerate(&self, pid: Pid) -> EnumerateResult<Vec<RawFd>> {
        let raw = pid.as_raw();
        let dir = self.fd_dir(pid)?;

        let entries = std::fs::read_dir(&dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => EnumerateError::not_found(raw),
            _ => EnumerateError::unavailable(raw, format!("{}: {}", dir.display(), e)),
        })?;

        let mut fds = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                EnumerateError::unavailable(raw, format!("reading {}: {}", dir.display(), e))
            })?;
            if let Some(fd) = entry.file_name().to_str().and_then(parse_descriptor) {
                fds.push(fd);
            }
        }

        Ok(fds)
    }
}

/// Parses a directory entry name as a descriptor number.
///
/// Only plain decimal digits are accepted, so `.`, `..`, signs and
/// whitespace are all rejected.
fn parse_descriptor(name: &str) -> Option<RawFd> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse::<RawFd>().ok()
}

/// Lists the open descriptors of `pid` using `/proc`.
pub fn enumerate(pid: Pid) -> EnumerateResult<Vec<RawFd>> {
    ProcFdEnumerator::new().enumerate(pid)
}
