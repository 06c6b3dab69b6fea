//! Handoff is best effort: what the parent fails to list stays open in the
//! child, but the child still runs.

use cleanspawn_common::{EnumerateError, EnumerateResult, ExitStatus};
use cleanspawn_process::{DescriptorEnumerator, ProcFdEnumerator, Spawner};
use e2e_tests::{open_inheritable, run_probe};
use nix::unistd::Pid;
use std::os::fd::{AsRawFd, RawFd};

struct BrokenEnumerator;

impl DescriptorEnumerator for BrokenEnumerator {
    fn enumerate(&self, pid: Pid) -> EnumerateResult<Vec<RawFd>> {
        Err(EnumerateError::unavailable(pid.as_raw(), "simulated failure"))
    }
}

/// Lists only a fixed set of descriptors.
struct FixedEnumerator(Vec<RawFd>);

impl DescriptorEnumerator for FixedEnumerator {
    fn enumerate(&self, _pid: Pid) -> EnumerateResult<Vec<RawFd>> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_failed_enumeration_still_execs() {
    let extra = open_inheritable();

    let run = run_probe(&Spawner::with_enumerator(BrokenEnumerator), |options| {
        options.args(["--exit-code", "5"])
    })
    .unwrap();

    assert_eq!(run.status, ExitStatus::Exited(5));
    assert!(!run.handoff.is_complete());
    assert_eq!(run.handoff.descriptors_sent, 0);
    assert!(run.handoff.enumeration_error.is_some());
    assert!(run.report.fds.contains(&extra.as_raw_fd()));
}

#[test]
fn test_only_listed_descriptors_are_disposed() {
    let listed = open_inheritable();
    let unlisted = open_inheritable();

    let enumerator = FixedEnumerator(vec![listed.as_raw_fd()]);
    let run = run_probe(&Spawner::with_enumerator(enumerator), |options| options).unwrap();

    assert!(run.status.success());
    assert_eq!(run.handoff.descriptors_sent, 1);
    assert!(!run.report.fds.contains(&listed.as_raw_fd()));
    assert!(run.report.fds.contains(&unlisted.as_raw_fd()));
}

#[test]
fn test_missing_proc_root_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let enumerator = ProcFdEnumerator::with_root(root.path().join("absent"));

    let run = run_probe(&Spawner::with_enumerator(enumerator), |options| options).unwrap();

    assert!(run.status.success());
    assert!(matches!(
        run.handoff.enumeration_error,
        Some(EnumerateError::NotFound { .. })
    ));
}
