//! Process spawning and reaping.
//!
//! [`Spawner::spawn`] is the parent half of the launch protocol:
//!
//! 1. Validate the options and build the [`LaunchPlan`] (all allocation
//!    happens here, before fork).
//! 2. Open the [`HandoffChannel`].
//! 3. Fork. The child enters [`bootstrap::launch`] and blocks on the
//!    channel.
//! 4. The parent lists the child's descriptors, sends them, and closes the
//!    channel so the child can dispose of them and exec.
//!
//! Step 4 is best effort. If the child's descriptors cannot be listed, or
//! some numbers cannot be sent, the spawn still succeeds and the child
//! execs keeping whatever it was not told about. Check
//! [`ProcessHandle::handoff`] when that matters.

use crate::bootstrap::{self, LaunchPlan};
use crate::channel::{self, HandoffChannel, HandoffReport};
use crate::enumerate::{DescriptorEnumerator, ProcFdEnumerator};
use crate::options::SpawnOptions;
use cleanspawn_common::{ExitStatus, SpawnError, SpawnResult};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::OsStr;
use tracing::{debug, info, warn};

/// Launches processes using a given descriptor enumerator.
#[derive(Debug, Clone)]
pub struct Spawner<E = ProcFdEnumerator> {
    enumerator: E,
}

impl Spawner<ProcFdEnumerator> {
    pub fn new() -> Self {
        Self::with_enumerator(ProcFdEnumerator::new())
    }
}

impl Default for Spawner<ProcFdEnumerator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DescriptorEnumerator> Spawner<E> {
    pub fn with_enumerator(enumerator: E) -> Self {
        Self { enumerator }
    }

    /// Spawns a child that inherits only its standard streams and the
    /// configured redirections.
    ///
    /// # Errors
    ///
    /// - `SpawnError::InvalidArgument` if the options fail validation
    /// - `SpawnError::ChannelSetup` if the handoff pipe cannot be created
    /// - `SpawnError::ForkFailed` if fork fails; both pipe ends are closed
    ///
    /// Failing to list or hand over the child's descriptors is not an
    /// error; see [`ProcessHandle::handoff`].
    pub fn spawn(&self, options: &SpawnOptions) -> SpawnResult<ProcessHandle> {
        options.validate()?;
        let plan = LaunchPlan::new(options)?;
        let program = options.get_program().display().to_string();

        debug!(
            "Launching {} (argc={}, envc={}, redirects={}, disposal={})",
            program,
            plan.argc(),
            plan.envc(),
            options.get_redirects().len(),
            plan.disposal()
        );

        let channel = HandoffChannel::open()?;
        let read_fd = channel.read_fd();
        let write_fd = channel.write_fd();

        // SAFETY: the child only runs bootstrap::launch, which sticks to
        // async-signal-safe calls and ends in exec, abort or _exit.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => unsafe { bootstrap::launch(&plan, read_fd, write_fd) },
            Ok(ForkResult::Parent { child }) => {
                let report = channel::feed(&self.enumerator, child, channel.into_writer());
                info!("Spawned process: {} (PID: {})", program, child);
                Ok(ProcessHandle::new(child, program, report))
            }
            Err(e) => {
                drop(channel);
                Err(SpawnError::fork_failed(program, e.to_string()))
            }
        }
    }
}

/// Spawns `program` with `args` using `/proc` for enumeration and the
/// default disposal policy.
///
/// ```rust,no_run
/// let mut child = cleanspawn_process::spawn("/bin/sh", ["-c", "ls"])?;
/// let status = child.wait()?;
/// assert!(status.success());
/// # Ok::<(), cleanspawn_common::SpawnError>(())
/// ```
pub fn spawn<P, I, S>(program: P, args: I) -> SpawnResult<ProcessHandle>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Spawner::new().spawn(&SpawnOptions::new(program).args(args))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Running,
    Reaped(ExitStatus),
}

/// Parent-side handle to a spawned child.
///
/// The child's pid is reaped at most once. Waiting again returns
/// `SpawnError::AlreadyWaited`. A handle dropped before its child was
/// reaped leaves a zombie until the parent exits.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Pid,
    program: String,
    handoff: HandoffReport,
    state: HandleState,
}

impl ProcessHandle {
    fn new(pid: Pid, program: String, handoff: HandoffReport) -> Self {
        Self {
            pid,
            program,
            handoff,
            state: HandleState::Running,
        }
    }

    pub fn id(&self) -> Pid {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// What the parent managed to hand over during spawn.
    pub fn handoff(&self) -> &HandoffReport {
        &self.handoff
    }

    /// The exit status, once the child has been reaped.
    pub fn status(&self) -> Option<ExitStatus> {
        match self.state {
            HandleState::Running => None,
            HandleState::Reaped(status) => Some(status),
        }
    }

    /// Blocks until the child terminates and returns how it ended.
    pub fn wait(&mut self) -> SpawnResult<ExitStatus> {
        self.ensure_running()?;
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(status) = exit_status(status) {
                        return Ok(self.reaped(status));
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SpawnError::wait_failed(self.pid.as_raw(), e.to_string())),
            }
        }
    }

    /// Reaps the child if it has already terminated, without blocking.
    pub fn try_wait(&mut self) -> SpawnResult<Option<ExitStatus>> {
        self.ensure_running()?;
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return Ok(None),
                Ok(status) => return Ok(exit_status(status).map(|s| self.reaped(s))),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SpawnError::wait_failed(self.pid.as_raw(), e.to_string())),
            }
        }
    }

    /// Waits on tokio's blocking pool.
    pub async fn wait_async(mut self) -> SpawnResult<ExitStatus> {
        let pid = self.pid.as_raw();
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .map_err(|e| SpawnError::wait_failed(pid, format!("wait task failed: {}", e)))?
    }

    fn ensure_running(&self) -> SpawnResult<()> {
        match self.state {
            HandleState::Running => Ok(()),
            HandleState::Reaped(_) => Err(SpawnError::already_waited(self.pid.as_raw())),
        }
    }

    fn reaped(&mut self, status: ExitStatus) -> ExitStatus {
        info!("Process {} (PID: {}) terminated: {}", self.program, self.pid, status);
        self.state = HandleState::Reaped(status);
        status
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.state == HandleState::Running {
            warn!(
                "Process handle for {} (PID: {}) dropped without wait",
                self.program, self.pid
            );
        }
    }
}

/// Maps a terminal wait status; stops and continues are not terminal.
fn exit_status(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
        WaitStatus::Signaled(_, signal, core_dumped) => Some(ExitStatus::Signaled {
            signal: signal as i32,
            core_dumped,
        }),
        _ => None,
    }
}
