//! Core functionality for branch-promoter
//!
//! This module contains the local side of a run:
//! - Git command execution and config storage
//! - Credential provisioning and the auth lifecycle
//! - Repository context detection
//! - Release tagging
//! - Application configuration

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod git;
pub mod git_config;
pub mod release;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthLifecycleManager, AuthSettings, AuthState};
pub use cleanup::CleanupResult;
pub use config::Config;
pub use credentials::CredentialProvisioner;
pub use git::{GitCli, GitCommandManager, GitRepository};
pub use repository::RepositoryContext;
