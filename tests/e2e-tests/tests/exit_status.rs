//! Exit codes and arguments flow through the launcher unchanged.

use cleanspawn_common::ExitStatus;
use cleanspawn_process::Spawner;
use e2e_tests::run_probe;

#[test]
fn test_exit_code_and_message() {
    let run = run_probe(&Spawner::new(), |options| {
        options.args(["--message", "hello from probe", "--exit-code", "3"])
    })
    .unwrap();

    assert_eq!(run.status, ExitStatus::Exited(3));
    assert_eq!(run.status.code(), Some(3));
    assert_eq!(run.report.message.as_deref(), Some("hello from probe"));
}

#[test]
fn test_explicit_environment_reaches_probe() {
    // RUST_LOG in the probe's environment turns on its stderr logging;
    // the report on stdout stays parseable either way.
    let run = run_probe(&Spawner::new(), |options| {
        options
            .env_clear()
            .env("RUST_LOG", "debug")
            .args(["--message", "env"])
    })
    .unwrap();

    assert!(run.status.success());
    assert_eq!(run.report.message.as_deref(), Some("env"));
}
