//! Custom error types for branch-promoter
//!
//! User-facing messages for every way a run can fail. Cleanup problems are
//! deliberately absent: they are reported through
//! [`CleanupResult`](crate::core::cleanup::CleanupResult) instead.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the promoter
#[derive(Error, Debug)]
pub enum ActionError {
    /// A required runner value is missing
    #[error("{0}\n\n  → This tool is meant to run inside a GitHub Actions runner.")]
    Precondition(String),

    /// The auth placeholder was not found exactly once
    #[error(
        "Unable to replace auth placeholder in {}: expected exactly one occurrence, found {occurrences}.\n\n  → The git config may have been modified by another step.",
        path.display()
    )]
    Integrity {
        /// Config file that was inspected
        path: PathBuf,
        /// How many placeholders were found
        occurrences: usize,
    },

    /// Rate limiting or concurrent update on the remote
    #[error("GitHub is temporarily refusing the request: {0}")]
    TransientRemote(String),

    /// Content conflict between branches
    #[error("Merge conflict: {0}\n\n  → Resolve the conflict on the source branch and run again.")]
    MergeConflict(String),

    /// The merge retry loop ran out of attempts
    #[error("Pull request #{pr_number} could not be merged after {attempts} attempt(s).")]
    MergeRetriesExhausted {
        /// Pull request number
        pr_number: u64,
        /// Number of merge attempts made
        attempts: u32,
    },

    /// Branch not found on remote
    #[error("Branch '{0}' not found on remote.\n\n  → Push the branch before running the action.")]
    BranchNotFound(String),

    /// A spawned git command failed
    #[error("git {command} failed: {stderr}")]
    GitCommand {
        /// Arguments passed to git
        command: String,
        /// Trimmed standard error of the command
        stderr: String,
    },

    /// Local repository error from libgit2
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    /// GitHub API error
    #[error("GitHub API request failed: {0}")]
    GitHubApi(String),

    /// Invalid GitHub URL or repository slug
    #[error("Cannot parse repository from '{0}'\n\n  → Expected 'owner/repo' or a remote URL pointing at the GitHub server.")]
    InvalidRepository(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML configuration file is invalid
    #[error("Configuration file is invalid: {0}")]
    Toml(String),

    /// IO error
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Failed to parse response: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input from the workflow
    #[error("{0}")]
    InvalidInput(String),
}

impl From<toml::de::Error> for ActionError {
    fn from(err: toml::de::Error) -> Self {
        ActionError::Toml(err.to_string())
    }
}

impl From<octocrab::Error> for ActionError {
    fn from(err: octocrab::Error) -> Self {
        crate::github::error_handler::classify_github_error(err)
    }
}

impl From<url::ParseError> for ActionError {
    fn from(err: url::ParseError) -> Self {
        ActionError::Config(format!("invalid URL: {}", err))
    }
}

/// Result type alias using ActionError
pub type Result<T> = std::result::Result<T, ActionError>;
