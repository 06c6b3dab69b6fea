//! Plain data types shared between the launcher, its configuration and
//! its callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest descriptor number the launcher will dispose of in a child.
///
/// Descriptors 0, 1 and 2 are the standard streams and are always left
/// alone; rewiring them is the job of [`Redirect`].
pub const FIRST_INHERITABLE_FD: i32 = 3;

/// What the child does with each inherited descriptor it is told about.
///
/// # Example
/// ```
/// use cleanspawn_common::DisposalPolicy;
///
/// let policy: DisposalPolicy = Default::default();
/// assert_eq!(policy, DisposalPolicy::CloseOnExec);
/// assert_eq!(policy.as_str(), "close_on_exec");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposalPolicy {
    /// Mark the descriptor close-on-exec. It stays usable until the exec
    /// replaces the image.
    #[default]
    CloseOnExec,

    /// Close the descriptor as soon as its number arrives.
    Close,
}

impl DisposalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisposalPolicy::CloseOnExec => "close_on_exec",
            DisposalPolicy::Close => "close",
        }
    }
}

impl fmt::Display for DisposalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A descriptor to wire into the child before exec, `dup2(source, target)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Redirect {
    /// Descriptor in the spawning process.
    pub source: i32,
    /// Number it should have in the child.
    pub target: i32,
}

impl Redirect {
    pub fn new(source: i32, target: i32) -> Self {
        Self { source, target }
    }
}

/// How a reaped child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// The child called exit with this code.
    Exited(i32),

    /// The child was terminated by a signal.
    Signaled { signal: i32, core_dumped: bool },
}

impl ExitStatus {
    /// True only for a normal exit with code 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// The exit code, if the child exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            ExitStatus::Signaled { .. } => None,
        }
    }

    /// The terminating signal number, if the child was killed by one.
    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(_) => None,
            ExitStatus::Signaled { signal, .. } => Some(*signal),
        }
    }

    /// Shell-style status: the exit code, or 128 + signal number.
    pub fn shell_code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Signaled { signal, .. } => 128 + signal,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled {
                signal,
                core_dumped: true,
            } => write!(f, "signal {} (core dumped)", signal),
            ExitStatus::Signaled { signal, .. } => write!(f, "signal {}", signal),
        }
    }
}
