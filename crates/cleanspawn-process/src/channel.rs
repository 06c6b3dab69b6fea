//! Handoff channel between the parent and a freshly forked child.
//!
//! The channel is a pipe used two ways at once. It carries the child's
//! descriptor numbers, each encoded as a native-endian `i32`, and it is the
//! child's synchronization point: the child blocks on the read end until
//! the parent has sent everything and closed the write end.
//!
//! Each number goes out in its own write. A write of [`FD_WIDTH`] bytes is
//! below `PIPE_BUF` and therefore atomic, so the reader never sees a
//! partial integer unless the stream is actually corrupted.

use crate::enumerate::DescriptorEnumerator;
use cleanspawn_common::{EnumerateError, SpawnError, SpawnResult, FIRST_INHERITABLE_FD};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc;
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use nix::unistd::Pid;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use tracing::{debug, warn};

/// Size in bytes of one descriptor number on the wire.
pub const FD_WIDTH: usize = std::mem::size_of::<RawFd>();

/// Encodes one descriptor number for the wire.
pub fn encode_fd(fd: RawFd) -> [u8; FD_WIDTH] {
    fd.to_ne_bytes()
}

/// Decodes one descriptor number from the wire.
pub fn decode_fd(bytes: [u8; FD_WIDTH]) -> RawFd {
    RawFd::from_ne_bytes(bytes)
}

/// Both ends of a handoff pipe, created for exactly one spawn.
///
/// Both ends are close-on-exec, so no copy of either can survive into an
/// exec'd image, including children spawned concurrently by other threads.
#[derive(Debug)]
pub struct HandoffChannel {
    read_end: OwnedFd,
    write_end: OwnedFd,
}

impl HandoffChannel {
    pub fn open() -> SpawnResult<Self> {
        let (read_end, write_end) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| SpawnError::channel_setup(format!("pipe2: {}", e)))?;
        Ok(Self {
            read_end,
            write_end,
        })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_end.as_raw_fd()
    }

    pub fn write_fd(&self) -> RawFd {
        self.write_end.as_raw_fd()
    }

    /// Parent side after fork: closes the read end and keeps the writer.
    pub fn into_writer(self) -> HandoffWriter {
        drop(self.read_end);
        HandoffWriter {
            fd: self.write_end,
        }
    }

    /// Splits into raw owned ends.
    #[cfg(test)]
    pub(crate) fn into_parts(self) -> (OwnedFd, OwnedFd) {
        (self.read_end, self.write_end)
    }
}

/// Parent-owned write end. Dropping it is the end-of-sequence signal.
#[derive(Debug)]
pub struct HandoffWriter {
    fd: OwnedFd,
}

impl HandoffWriter {
    /// Sends one descriptor number.
    pub fn send(&self, fd: RawFd) -> nix::Result<()> {
        self.send_bytes(&encode_fd(fd))
    }

    /// Writes raw bytes in a single call. A short write is reported as
    /// `EIO` since the reader would treat it as corruption.
    pub(crate) fn send_bytes(&self, bytes: &[u8]) -> nix::Result<()> {
        loop {
            match nix::unistd::write(&self.fd, bytes) {
                Ok(n) if n == bytes.len() => return Ok(()),
                Ok(_) => return Err(Errno::EIO),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Closes the write end.
    pub fn finish(self) {
        drop(self.fd);
    }
}

/// Outcome of the parent's half of the handoff.
///
/// The handoff is best effort: a failure here never fails the spawn. It
/// only means the child may have kept descriptors it should not have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffReport {
    /// Descriptor numbers written to the channel.
    pub descriptors_sent: usize,

    /// Descriptor numbers that could not be written.
    pub write_failures: usize,

    /// Set when the child's descriptors could not be listed at all.
    pub enumeration_error: Option<EnumerateError>,
}

impl HandoffReport {
    /// True when every descriptor above the standard streams was handed
    /// to the child.
    pub fn is_complete(&self) -> bool {
        self.enumeration_error.is_none() && self.write_failures == 0
    }
}

/// Blocks SIGPIPE on the calling thread for as long as it lives.
///
/// A child that dies before reading everything turns the next write into
/// `EPIPE` instead of a signal, even in hosts where SIGPIPE still kills.
/// A SIGPIPE raised meanwhile is consumed before the old mask comes back.
struct SigpipeBlock {
    previous: Option<SigSet>,
}

impl SigpipeBlock {
    fn new() -> Self {
        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGPIPE);
        let mut previous = SigSet::empty();

        match pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut previous)) {
            Ok(()) => Self {
                previous: Some(previous),
            },
            Err(e) => {
                warn!("Cannot block SIGPIPE during handoff: {}", e);
                Self { previous: None }
            }
        }
    }
}

impl Drop for SigpipeBlock {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        // Already blocked by the caller: nothing of ours to undo.
        if previous.contains(Signal::SIGPIPE) {
            return;
        }

        let mut pipe = SigSet::empty();
        pipe.add(Signal::SIGPIPE);
        let poll = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe { libc::sigtimedwait(pipe.as_ref(), std::ptr::null_mut(), &poll) };

        if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None) {
            warn!("Cannot restore signal mask after handoff: {}", e);
        }
    }
}

/// Runs the parent's half of the protocol for `child`.
///
/// Lists the child's descriptors, sends every number from
/// [`FIRST_INHERITABLE_FD`] upwards, and always closes the writer before
/// returning, whatever failed along the way. SIGPIPE is blocked on the
/// calling thread meanwhile, so a child that died early only shows up as
/// write failures.
pub fn feed<E>(enumerator: &E, child: Pid, writer: HandoffWriter) -> HandoffReport
where
    E: DescriptorEnumerator + ?Sized,
{
    let _sigpipe = SigpipeBlock::new();
    let mut report = HandoffReport::default();

    match enumerator.enumerate(child) {
        Ok(fds) => {
            for fd in fds.into_iter().filter(|fd| *fd >= FIRST_INHERITABLE_FD) {
                match writer.send(fd) {
                    Ok(()) => report.descriptors_sent += 1,
                    Err(e) => {
                        warn!("Failed to hand descriptor {} to PID {}: {}", fd, child, e);
                        report.write_failures += 1;
                    }
                }
            }
        }
        Err(e) => {
            warn!("Cannot list descriptors of PID {}: {}", child, e);
            report.enumeration_error = Some(e);
        }
    }

    writer.finish();
    debug!(
        "Handoff to PID {} finished: sent={}, write_failures={}",
        child, report.descriptors_sent, report.write_failures
    );
    report
}
