//! Child bootstrap: the code that runs between fork and exec.
//!
//! The forked child is a single-threaded copy of a possibly multi-threaded
//! parent. Any lock another thread held at fork time (the allocator's, the
//! environment's, stdio's) stays locked forever in the child. Until exec,
//! the child may therefore only make async-signal-safe calls.
//!
//! # Rules for this module
//!
//! Everything the child runs lives in [`launch`] and the private `sys`
//! module. `sys` is the allowlist: read, write, close, `fcntl(F_SETFD)`,
//! dup2, `signal`, `sigprocmask`, execve, abort and `_exit`. Do NOT add:
//! - Logging (tracing, println, eprintln)
//! - Memory allocation (Box, Vec, String, format!)
//! - Mutex operations or anything touching `std::env`
//! - Directory listing
//!
//! All allocation happens earlier, in the parent, when the [`LaunchPlan`]
//! is built.

use crate::channel::{decode_fd, FD_WIDTH};
use crate::options::{EnvSource, SpawnOptions};
use cleanspawn_common::{DisposalPolicy, Redirect, SpawnError, SpawnResult, FIRST_INHERITABLE_FD};
use nix::libc;
use std::ffi::{CString, OsStr, OsString};
use std::os::fd::RawFd;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

/// Exit code of a child whose wiring or exec failed.
pub const EXEC_FAILURE_EXIT_CODE: i32 = 127;

/// Everything the child needs, prepared before fork.
///
/// The pointer arrays point into the `CString`s held alongside them and are
/// null-terminated, ready for `execve`.
pub struct LaunchPlan {
    program: CString,
    _argv: Vec<CString>,
    _envp: Vec<CString>,
    argv_ptrs: Vec<*const libc::c_char>,
    envp_ptrs: Vec<*const libc::c_char>,
    redirects: Vec<Redirect>,
    disposal: DisposalPolicy,
}

impl LaunchPlan {
    pub fn new(options: &SpawnOptions) -> SpawnResult<Self> {
        let program = to_cstring("program", options.get_program().as_os_str())?;

        let mut argv = Vec::with_capacity(options.get_args().len() + 1);
        argv.push(to_cstring("argv[0]", options.get_arg0())?);
        for (i, arg) in options.get_args().iter().enumerate() {
            argv.push(to_cstring(&format!("argv[{}]", i + 1), arg)?);
        }

        let envp = match options.get_env() {
            EnvSource::Inherit => std::env::vars_os()
                .map(|(key, value)| env_entry(&key, &value))
                .filter_map(|entry| CString::new(entry.into_vec()).ok())
                .collect(),
            EnvSource::Explicit(entries) => entries
                .iter()
                .enumerate()
                .map(|(i, entry)| to_cstring(&format!("env[{}]", i), entry))
                .collect::<SpawnResult<Vec<_>>>()?,
        };

        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);

        Ok(Self {
            program,
            _argv: argv,
            _envp: envp,
            argv_ptrs,
            envp_ptrs,
            redirects: options.get_redirects().to_vec(),
            disposal: options.get_disposal(),
        })
    }

    pub(crate) fn argc(&self) -> usize {
        self.argv_ptrs.len() - 1
    }

    pub(crate) fn envc(&self) -> usize {
        self.envp_ptrs.len() - 1
    }

    pub(crate) fn disposal(&self) -> DisposalPolicy {
        self.disposal
    }

    fn is_redirect_source(&self, fd: RawFd) -> bool {
        self.redirects.iter().any(|r| r.source == fd)
    }
}

fn to_cstring(what: &str, value: &OsStr) -> SpawnResult<CString> {
    CString::new(value.as_bytes())
        .map_err(|_| SpawnError::invalid_argument(what, "contains an interior NUL byte"))
}

fn env_entry(key: &OsStr, value: &OsStr) -> OsString {
    let mut entry = OsString::with_capacity(key.len() + value.len() + 1);
    entry.push(key);
    entry.push("=");
    entry.push(value);
    entry
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Runs the child side of the handoff and execs the target. Never returns.
///
/// # Safety
///
/// Must only be called in a freshly forked child, with `channel_read` and
/// `channel_write` being the child's copies of the handoff pipe created for
/// this spawn. The caller must not hold any state that expects to be
/// dropped: this function ends in exec, abort or `_exit`.
pub unsafe fn launch(plan: &LaunchPlan, channel_read: RawFd, channel_write: RawFd) -> ! {
    // Our copy of the write end would keep the channel open forever.
    sys::close(channel_write);

    let mut buf = [0u8; FD_WIDTH];
    loop {
        match sys::read_full(channel_read, &mut buf) {
            sys::Read::Eof => break,
            sys::Read::Full => {}
            sys::Read::Short | sys::Read::Failed => {
                sys::fatal_abort(b"cleanspawn: corrupted descriptor handoff\n")
            }
        }

        let fd = decode_fd(buf);
        if fd < FIRST_INHERITABLE_FD || fd == channel_read {
            continue;
        }

        let disposed = match plan.disposal {
            DisposalPolicy::CloseOnExec => sys::set_cloexec(fd),
            DisposalPolicy::Close if plan.is_redirect_source(fd) => sys::set_cloexec(fd),
            DisposalPolicy::Close => sys::close(fd),
        };
        if !disposed {
            sys::fatal_abort(b"cleanspawn: cannot dispose of inherited descriptor\n");
        }
    }

    sys::close(channel_read);

    // Ignored dispositions and the blocked mask both survive exec.
    sys::reset_signals();

    for redirect in &plan.redirects {
        let wired = if redirect.source == redirect.target {
            sys::clear_cloexec(redirect.source)
        } else {
            sys::dup2(redirect.source, redirect.target)
        };
        if !wired {
            sys::fatal_exit(b"cleanspawn: descriptor redirection failed\n");
        }
    }

    sys::execve(plan.program.as_ptr(), plan.argv_ptrs.as_ptr(), plan.envp_ptrs.as_ptr());
    sys::fatal_exit(b"cleanspawn: exec failed\n")
}

/// The async-signal-safe allowlist.
mod sys {
    use super::EXEC_FAILURE_EXIT_CODE;
    use nix::errno::Errno;
    use nix::libc;
    use std::os::fd::RawFd;

    pub enum Read {
        Full,
        Eof,
        Short,
        Failed,
    }

    /// One read of exactly `buf.len()` bytes, retried on EINTR.
    pub fn read_full(fd: RawFd, buf: &mut [u8]) -> Read {
        loop {
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n == 0 {
                return Read::Eof;
            }
            if n < 0 {
                if Errno::last() == Errno::EINTR {
                    continue;
                }
                return Read::Failed;
            }
            return if n as usize == buf.len() {
                Read::Full
            } else {
                Read::Short
            };
        }
    }

    /// Closes `fd`. An fd that is already gone counts as closed, and on
    /// Linux the descriptor is released even when close reports EINTR.
    pub fn close(fd: RawFd) -> bool {
        if unsafe { libc::close(fd) } == 0 {
            return true;
        }
        matches!(Errno::last(), Errno::EBADF | Errno::EINTR)
    }

    /// Marks `fd` close-on-exec. An fd that is already gone needs nothing.
    pub fn set_cloexec(fd: RawFd) -> bool {
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } != -1 {
            return true;
        }
        Errno::last() == Errno::EBADF
    }

    pub fn clear_cloexec(fd: RawFd) -> bool {
        unsafe { libc::fcntl(fd, libc::F_SETFD, 0) != -1 }
    }

    pub fn dup2(source: RawFd, target: RawFd) -> bool {
        loop {
            let rc = unsafe { libc::dup2(source, target) };
            if rc != -1 {
                return true;
            }
            if Errno::last() != Errno::EINTR {
                return false;
            }
        }
    }

    /// Restores SIGPIPE to its default action and unblocks every signal.
    pub fn reset_signals() {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);

            let mut empty = std::mem::MaybeUninit::<libc::sigset_t>::uninit();
            libc::sigemptyset(empty.as_mut_ptr());
            libc::sigprocmask(libc::SIG_SETMASK, empty.as_ptr(), std::ptr::null_mut());
        }
    }

    pub fn execve(
        program: *const libc::c_char,
        argv: *const *const libc::c_char,
        envp: *const *const libc::c_char,
    ) {
        unsafe { libc::execve(program, argv, envp) };
    }

    fn write_stderr(message: &[u8]) {
        unsafe { libc::write(libc::STDERR_FILENO, message.as_ptr().cast(), message.len()) };
    }

    pub fn fatal_abort(message: &[u8]) -> ! {
        write_stderr(message);
        unsafe { libc::abort() }
    }

    pub fn fatal_exit(message: &[u8]) -> ! {
        write_stderr(message);
        unsafe { libc::_exit(EXEC_FAILURE_EXIT_CODE) }
    }
}
