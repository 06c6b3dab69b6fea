//! # cleanspawn process
//!
//! Fork/exec launcher whose children inherit only the descriptors they
//! are meant to, even when the spawning program is multi-threaded.
//!
//! Closing unwanted descriptors in the child needs the list of what is
//! open, but listing a directory is not allowed between fork and exec. So
//! the work is split:
//!
//! - the parent lists the child's descriptors ([`enumerate`]),
//! - streams the numbers through a pipe ([`channel`]),
//! - and the child, blocked on that pipe, disposes of each one and execs
//!   ([`bootstrap`]).
//!
//! ```rust,no_run
//! use cleanspawn_process::{SpawnOptions, Spawner};
//! use cleanspawn_common::DisposalPolicy;
//!
//! let options = SpawnOptions::new("/bin/sh")
//!     .args(["-c", "ls"])
//!     .disposal(DisposalPolicy::Close);
//! let mut child = Spawner::new().spawn(&options)?;
//! println!("{}", child.wait()?);
//! # Ok::<(), cleanspawn_common::SpawnError>(())
//! ```
//!
//! Linux only: enumeration relies on `/proc/<pid>/fd`.

#[cfg(not(target_os = "linux"))]
compile_error!("cleanspawn-process needs a live /proc/<pid>/fd directory and only supports Linux.");

pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod enumerate;
pub mod options;
pub mod spawn;
pub mod validation;

// Re-export main types
pub use channel::HandoffReport;
pub use config::LaunchConfig;
pub use enumerate::{enumerate, DescriptorEnumerator, ProcFdEnumerator};
pub use options::{EnvSource, SpawnOptions};
pub use spawn::{spawn, ProcessHandle, Spawner};
