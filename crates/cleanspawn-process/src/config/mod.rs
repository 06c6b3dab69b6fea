//! Launch configuration loaded from YAML.
//!
//! ```yaml
//! program: /bin/sh
//! args: ["-c", "ls"]
//! env: ["PATH=/usr/bin:/bin"]
//! disposal: close
//! redirects:
//!   - { source: 3, target: 1 }
//! log_level: debug
//! ```

use crate::enumerate::{ProcFdEnumerator, DEFAULT_PROC_ROOT};
use crate::options::SpawnOptions;
use anyhow::{Context, Result};
use cleanspawn_common::{DisposalPolicy, Redirect};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod validation;

/// A single program launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Explicit `KEY=VALUE` environment; absent means inherit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,

    #[serde(default)]
    pub disposal: DisposalPolicy,

    /// Descriptors of the launcher to wire into the child, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirects: Vec<Redirect>,

    #[serde(default = "default_proc_root")]
    pub proc_root: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl LaunchConfig {
    /// Creates a config for `program` with every other field defaulted.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            disposal: DisposalPolicy::default(),
            redirects: Vec::new(),
            proc_root: default_proc_root(),
            log_level: default_log_level(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: LaunchConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn to_spawn_options(&self) -> SpawnOptions {
        let options = self
            .redirects
            .iter()
            .fold(
                SpawnOptions::new(&self.program)
                    .args(&self.args)
                    .disposal(self.disposal),
                |options, r| options.redirect(r.source, r.target),
            );

        match &self.env {
            Some(entries) => options.environment(entries),
            None => options,
        }
    }

    pub fn enumerator(&self) -> ProcFdEnumerator {
        ProcFdEnumerator::with_root(&self.proc_root)
    }
}

fn default_proc_root() -> String {
    DEFAULT_PROC_ROOT.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
