//! # cleanspawn common
//!
//! Types shared by the cleanspawn crates.
//!
//! This crate provides the error taxonomy for spawning and descriptor
//! enumeration, plus the plain data types (disposal policy, redirections,
//! exit status) that flow between the launcher, its configuration and its
//! callers. It has no OS dependencies.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{EnumerateError, EnumerateResult, SpawnError, SpawnResult};
pub use types::{DisposalPolicy, ExitStatus, Redirect, FIRST_INHERITABLE_FD};
