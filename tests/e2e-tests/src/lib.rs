// E2E test framework for the cleanspawn launcher

use cleanspawn_common::{ExitStatus, SpawnResult};
use cleanspawn_process::{DescriptorEnumerator, HandoffReport, SpawnOptions, Spawner};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::env;
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use tracing::debug;

/// Get the path to the FDPROBE binary
pub fn get_fdprobe_path() -> PathBuf {
    let mut path = env::current_exe()
        .expect("Failed to get current exe path")
        .parent()
        .expect("Failed to get parent dir")
        .to_path_buf();

    // If we're in deps/, go up one level
    if path.ends_with("deps") {
        path.pop();
    }

    path.push("fdprobe");

    if !path.exists() {
        panic!("FDPROBE binary not found at: {}", path.display());
    }

    path
}

/// What the probe printed about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub fds: Vec<RawFd>,
    pub message: Option<String>,
}

impl ProbeReport {
    /// Parses the `FDS ...` / `MSG ...` lines written by `fdprobe`.
    pub fn parse(output: &str) -> Result<Self, String> {
        let mut report = ProbeReport::default();
        let mut saw_fds = false;

        for line in output.lines() {
            if let Some(rest) = line.strip_prefix("FDS") {
                report.fds = rest
                    .split_whitespace()
                    .map(|n| n.parse().map_err(|e| format!("bad fd {:?}: {}", n, e)))
                    .collect::<Result<_, _>>()?;
                saw_fds = true;
            } else if let Some(rest) = line.strip_prefix("MSG ") {
                report.message = Some(rest.to_string());
            }
        }

        if !saw_fds {
            return Err(format!("no FDS line in probe output: {:?}", output));
        }
        Ok(report)
    }

    /// Descriptors above the standard streams.
    pub fn extra_fds(&self) -> Vec<RawFd> {
        self.fds.iter().copied().filter(|&fd| fd > 2).collect()
    }
}

/// Outcome of one probe run.
#[derive(Debug)]
pub struct ProbeRun {
    pub status: ExitStatus,
    pub handoff: HandoffReport,
    pub report: ProbeReport,
}

/// Spawns `fdprobe` with its stdout redirected into a pipe and collects the report.
///
/// `configure` receives options for the probe binary and may add arguments,
/// redirects or a disposal policy. Stdout is always wired to the pipe.
pub fn run_probe<E, F>(spawner: &Spawner<E>, configure: F) -> SpawnResult<ProbeRun>
where
    E: DescriptorEnumerator,
    F: FnOnce(SpawnOptions) -> SpawnOptions,
{
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).expect("Failed to create stdout pipe");

    let options = configure(SpawnOptions::new(get_fdprobe_path())).redirect(write_end.as_raw_fd(), 1);
    let mut child = spawner.spawn(&options)?;
    drop(write_end);

    let mut output = String::new();
    File::from(read_end)
        .read_to_string(&mut output)
        .expect("Failed to read probe output");
    debug!("Probe {} printed {:?}", child.id(), output);

    let status = child.wait()?;
    let report = ProbeReport::parse(&output).unwrap_or_else(|e| panic!("{}", e));

    Ok(ProbeRun {
        status,
        handoff: child.handoff().clone(),
        report,
    })
}

/// Opens a scratch file with close-on-exec cleared, so it would leak into
/// children unless the launcher disposes of it.
pub fn open_inheritable() -> File {
    let file = tempfile::tempfile().expect("Failed to create temp file");
    let rc = unsafe { nix::libc::fcntl(file.as_raw_fd(), nix::libc::F_SETFD, 0) };
    assert_eq!(rc, 0, "Failed to clear FD_CLOEXEC");
    file
}

/// Assert that the probe saw no descriptors beyond stdio and `allowed`.
pub fn assert_only_stdio(report: &ProbeReport, allowed: &[RawFd]) -> Result<(), String> {
    let leaked: Vec<RawFd> = report
        .extra_fds()
        .into_iter()
        .filter(|fd| !allowed.contains(fd))
        .collect();

    if leaked.is_empty() {
        Ok(())
    } else {
        Err(format!("Descriptors leaked into child: {:?} (saw {:?})", leaked, report.fds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report() {
        let report = ProbeReport::parse("FDS 0 1 2 9\nMSG hello there\n").unwrap();
        assert_eq!(report.fds, vec![0, 1, 2, 9]);
        assert_eq!(report.extra_fds(), vec![9]);
        assert_eq!(report.message.as_deref(), Some("hello there"));
    }

    #[test]
    fn test_parse_requires_fds_line() {
        assert!(ProbeReport::parse("MSG only\n").is_err());
        assert!(ProbeReport::parse("FDS 0 x\n").is_err());
    }

    #[test]
    fn test_assert_only_stdio() {
        let report = ProbeReport { fds: vec![0, 1, 2, 7], message: None };
        assert!(assert_only_stdio(&report, &[7]).is_ok());
        assert!(assert_only_stdio(&report, &[]).is_err());
    }
}
