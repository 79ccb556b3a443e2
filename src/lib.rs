//! branch-promoter - pull request promotion for GitHub Actions
//!
//! This library provides the pieces behind the `promote` binary: a git
//! credential lifecycle that installs and reliably removes tokens and SSH
//! keys, a pull request service that merges promotion PRs with bounded
//! retries, and release tagging.

pub mod cli;
pub mod core;
pub mod error;
pub mod github;

pub use error::{ActionError, Result};
