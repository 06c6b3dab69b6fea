//! Spawn options: what to run and how the child's descriptors are wired.

use crate::validation;
use cleanspawn_common::{DisposalPolicy, Redirect, SpawnResult};
use std::ffi::{OsStr, OsString};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Where the child's environment comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSource {
    /// Snapshot of the spawning process's environment, taken before fork.
    Inherit,
    /// Exactly these `KEY=VALUE` entries.
    Explicit(Vec<OsString>),
}

/// Description of a program to launch.
///
/// # Example
/// ```rust,no_run
/// use cleanspawn_process::SpawnOptions;
/// use cleanspawn_common::DisposalPolicy;
///
/// let options = SpawnOptions::new("/bin/sh")
///     .args(["-c", "ls"])
///     .env("LC_ALL", "C")
///     .disposal(DisposalPolicy::Close);
/// assert_eq!(options.get_args().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    program: PathBuf,
    arg0: Option<OsString>,
    args: Vec<OsString>,
    env: EnvSource,
    redirects: Vec<Redirect>,
    disposal: DisposalPolicy,
}

impl SpawnOptions {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: PathBuf::from(program.as_ref()),
            arg0: None,
            args: Vec::new(),
            env: EnvSource::Inherit,
            redirects: Vec::new(),
            disposal: DisposalPolicy::default(),
        }
    }

    /// Appends one argument after argv[0].
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Overrides argv[0], which defaults to the program path.
    pub fn arg0(mut self, arg0: impl AsRef<OsStr>) -> Self {
        self.arg0 = Some(arg0.as_ref().to_owned());
        self
    }

    /// Sets one variable. The first call on an inheriting configuration
    /// snapshots the current environment and switches to an explicit one.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        let key = key.as_ref();
        let mut entries = match std::mem::replace(&mut self.env, EnvSource::Inherit) {
            EnvSource::Inherit => inherited_env(),
            EnvSource::Explicit(entries) => entries,
        };

        entries.retain(|entry| env_key(entry) != key.as_bytes());

        let mut entry = key.to_owned();
        entry.push("=");
        entry.push(value.as_ref());
        entries.push(entry);

        self.env = EnvSource::Explicit(entries);
        self
    }

    pub fn envs<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        vars.into_iter()
            .fold(self, |options, (key, value)| options.env(key, value))
    }

    /// Starts the child with an empty environment.
    pub fn env_clear(mut self) -> Self {
        self.env = EnvSource::Explicit(Vec::new());
        self
    }

    /// Replaces the environment with exactly these `KEY=VALUE` entries.
    pub fn environment<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.env = EnvSource::Explicit(
            entries
                .into_iter()
                .map(|e| e.as_ref().to_owned())
                .collect(),
        );
        self
    }

    /// Wires `source` in the parent to `target` in the child. Applied in
    /// insertion order, after inherited descriptors have been disposed of.
    pub fn redirect(mut self, source: RawFd, target: RawFd) -> Self {
        self.redirects.push(Redirect::new(source, target));
        self
    }

    pub fn disposal(mut self, disposal: DisposalPolicy) -> Self {
        self.disposal = disposal;
        self
    }

    pub fn get_program(&self) -> &Path {
        &self.program
    }

    pub fn get_arg0(&self) -> &OsStr {
        self.arg0
            .as_deref()
            .unwrap_or_else(|| self.program.as_os_str())
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_env(&self) -> &EnvSource {
        &self.env
    }

    pub fn get_redirects(&self) -> &[Redirect] {
        &self.redirects
    }

    pub fn get_disposal(&self) -> DisposalPolicy {
        self.disposal
    }

    /// Checks everything that can be checked before fork.
    pub fn validate(&self) -> SpawnResult<()> {
        validation::validate_program(&self.program)?;
        if let EnvSource::Explicit(entries) = &self.env {
            validation::validate_env_entries(entries)?;
        }
        validation::validate_redirects(&self.redirects)
    }
}

/// Snapshot of the current environment as `KEY=VALUE` entries.
fn inherited_env() -> Vec<OsString> {
    std::env::vars_os()
        .map(|(key, value)| {
            let mut entry = key;
            entry.push("=");
            entry.push(value);
            entry
        })
        .collect()
}

fn env_key(entry: &OsStr) -> &[u8] {
    let bytes = entry.as_bytes();
    match bytes.iter().position(|b| *b == b'=') {
        Some(i) => &bytes[..i],
        None => bytes,
    }
}
