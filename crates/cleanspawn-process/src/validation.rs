//! Spawn input validation.
//!
//! These checks run in the parent before anything is created, so a bad
//! request never costs a pipe or a fork.

use cleanspawn_common::{Redirect, SpawnError, SpawnResult};
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Validate that a program path is usable as an exec target.
///
/// Existence is not checked; a missing program shows up as the child's
/// exit status.
pub fn validate_program(path: &Path) -> SpawnResult<()> {
    if path.as_os_str().is_empty() {
        return Err(SpawnError::invalid_argument(
            "program",
            "executable path cannot be empty",
        ));
    }

    if path.as_os_str().as_bytes().contains(&0) {
        return Err(SpawnError::invalid_argument(
            "program",
            "executable path contains a NUL byte",
        ));
    }

    Ok(())
}

/// Validate `KEY=VALUE` environment entries.
pub fn validate_env_entries(entries: &[OsString]) -> SpawnResult<()> {
    for (i, entry) in entries.iter().enumerate() {
        let bytes = entry.as_bytes();
        match bytes.iter().position(|b| *b == b'=') {
            Some(0) | None => {
                return Err(SpawnError::invalid_argument(
                    format!("env[{}]", i),
                    format!("expected KEY=VALUE, got {:?}", entry),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Validate redirection pairs.
pub fn validate_redirects(redirects: &[Redirect]) -> SpawnResult<()> {
    for redirect in redirects {
        if redirect.source < 0 || redirect.target < 0 {
            return Err(SpawnError::invalid_argument(
                "redirect",
                format!(
                    "descriptors must be non-negative, got {} -> {}",
                    redirect.source, redirect.target
                ),
            ));
        }
    }
    Ok(())
}
