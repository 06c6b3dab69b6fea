//! Error types for cleanspawn.
//!
//! Two families of errors exist:
//!
//! - [`SpawnError`]: everything the parent can observe while setting up,
//!   forking and reaping a child.
//! - [`EnumerateError`]: failures to list a process's open descriptors.
//!
//! Enumeration failures never fail a spawn on their own. The launcher
//! records them in its handoff report and lets the child exec with whatever
//! it inherited, so they are kept apart from [`SpawnError`].
//!
//! ```rust
//! use cleanspawn_common::{SpawnError, SpawnResult};
//!
//! fn check(program: &str) -> SpawnResult<()> {
//!     if program.is_empty() {
//!         return Err(SpawnError::invalid_argument("program", "path cannot be empty"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check("").is_err());
//! ```

use thiserror::Error;

/// Errors reported by the spawn and wait operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error("Invalid spawn argument: {what} - {reason}")]
    InvalidArgument { what: String, reason: String },

    #[error("Handoff channel setup failed: {reason}")]
    ChannelSetup { reason: String },

    #[error("Fork failed: {program} - {reason}")]
    ForkFailed { program: String, reason: String },

    /// The pid was already reaped by an earlier wait.
    #[error("Process already waited on: pid {pid}")]
    AlreadyWaited { pid: i32 },

    #[error("Wait failed: pid {pid} - {reason}")]
    WaitFailed { pid: i32, reason: String },
}

impl SpawnError {
    pub fn invalid_argument(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub fn channel_setup(reason: impl Into<String>) -> Self {
        Self::ChannelSetup {
            reason: reason.into(),
        }
    }

    pub fn fork_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ForkFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn already_waited(pid: i32) -> Self {
        Self::AlreadyWaited { pid }
    }

    pub fn wait_failed(pid: i32, reason: impl Into<String>) -> Self {
        Self::WaitFailed {
            pid,
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by calling an operation out of order
    /// rather than by the operating system.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::AlreadyWaited { .. })
    }
}

/// Errors reported while listing the open descriptors of a process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumerateError {
    /// The process (or its descriptor directory) does not exist.
    #[error("Descriptor listing not found: pid {pid}")]
    NotFound { pid: i32 },

    /// The listing exists but cannot be read, or the facility is missing.
    #[error("Descriptor listing unavailable: pid {pid} - {reason}")]
    Unavailable { pid: i32, reason: String },

    /// The query itself could not be built from the given pid.
    #[error("Invalid descriptor query: pid {pid} - {reason}")]
    InvalidArgument { pid: i32, reason: String },
}

impl EnumerateError {
    pub fn not_found(pid: i32) -> Self {
        Self::NotFound { pid }
    }

    pub fn unavailable(pid: i32, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            pid,
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(pid: i32, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            pid,
            reason: reason.into(),
        }
    }

    /// The pid the failed query was about.
    pub fn pid(&self) -> i32 {
        match self {
            Self::NotFound { pid }
            | Self::Unavailable { pid, .. }
            | Self::InvalidArgument { pid, .. } => *pid,
        }
    }
}

/// Result type for spawn operations.
pub type SpawnResult<T> = std::result::Result<T, SpawnError>;

/// Result type for descriptor enumeration.
pub type EnumerateResult<T> = std::result::Result<T, EnumerateError>;
