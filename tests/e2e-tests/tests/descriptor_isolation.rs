//! The probe must only see stdio (plus explicit redirects), whatever the
//! parent had open when it spawned.

use cleanspawn_common::{DisposalPolicy, ExitStatus};
use cleanspawn_process::Spawner;
use e2e_tests::{assert_only_stdio, open_inheritable, run_probe};
use std::os::fd::AsRawFd;
use std::thread;

#[test]
fn test_inheritable_descriptors_do_not_leak() {
    let extras: Vec<_> = (0..4).map(|_| open_inheritable()).collect();

    for policy in [DisposalPolicy::CloseOnExec, DisposalPolicy::Close] {
        let run = run_probe(&Spawner::new(), |options| options.disposal(policy)).unwrap();

        assert_eq!(run.status, ExitStatus::Exited(0));
        assert!(run.handoff.is_complete(), "handoff: {:?}", run.handoff);
        assert!(run.handoff.descriptors_sent >= extras.len());
        assert!(run.report.fds.contains(&1), "stdout missing: {:?}", run.report.fds);
        assert_only_stdio(&run.report, &[]).unwrap();
    }
}

#[test]
fn test_redirect_target_survives_disposal() {
    let extra = open_inheritable();

    for policy in [DisposalPolicy::CloseOnExec, DisposalPolicy::Close] {
        let run = run_probe(&Spawner::new(), |options| {
            options.redirect(extra.as_raw_fd(), 9).disposal(policy)
        })
        .unwrap();

        assert!(run.status.success());
        assert!(run.report.fds.contains(&9), "fd 9 missing under {}", policy);
        assert_only_stdio(&run.report, &[9]).unwrap();
    }
}

#[test]
fn test_isolation_under_concurrent_spawns() {
    let workers: Vec<_> = (0..6)
        .map(|i| {
            thread::spawn(move || {
                // Each worker opens its own leak candidates while others fork.
                let _extras: Vec<_> = (0..3).map(|_| open_inheritable()).collect();
                let policy = if i % 2 == 0 {
                    DisposalPolicy::CloseOnExec
                } else {
                    DisposalPolicy::Close
                };
                run_probe(&Spawner::new(), |options| options.disposal(policy)).unwrap()
            })
        })
        .collect();

    for worker in workers {
        let run = worker.join().unwrap();
        assert_eq!(run.status, ExitStatus::Exited(0));
        assert_only_stdio(&run.report, &[]).unwrap();
    }
}
