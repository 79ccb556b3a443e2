//! Hosting capability used by the pull request service
//!
//! [`HostingApi`] is the seam between the merge protocol and GitHub. The
//! octocrab-backed implementation lives on [`GitHubClient`] and delegates to
//! the pull request and branch handlers.

use crate::error::Result;
use crate::github::branch::BranchHandler;
use crate::github::client::GitHubClient;
use crate::github::pull_request::{MergeMethod, PullRequestHandler};

/// The parts of a pull request the service cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestInfo {
    pub number: u64,
    pub html_url: String,
    pub head_ref: String,
    pub base_ref: String,
    pub head_sha: String,
    pub merged: bool,
    /// Set by GitHub once the PR is merged
    pub merge_commit_sha: Option<String>,
}

/// Result of one merge request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged; `sha` is the merge commit
    Merged { sha: String },
    /// Head and base do not merge cleanly
    Conflict(String),
    /// Rate limited, concurrently updated or temporarily rejected
    Transient(String),
}

/// How `head` relates to `base`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchComparison {
    Identical,
    /// `head` has commits `base` lacks, nothing else
    Ahead,
    /// `base` has commits `head` lacks, nothing else
    Behind,
    Diverged,
}

/// Result of merging one branch into another on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchMergeOutcome {
    /// New merge commit
    Merged(String),
    /// Nothing to merge
    UpToDate,
    Conflict,
}

/// Remote operations needed to open and merge promotion pull requests
#[allow(async_fn_in_trait)]
pub trait HostingApi {
    /// Open pull request from `head` into `base`, if any
    async fn find_open_pull(&self, head: &str, base: &str) -> Result<Option<PullRequestInfo>>;

    async fn create_pull(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestInfo>;

    async fn get_pull(&self, number: u64) -> Result<PullRequestInfo>;

    /// Request a merge; `sha` guards against merging a head that moved
    async fn merge_pull(
        &self,
        number: u64,
        method: MergeMethod,
        sha: Option<&str>,
    ) -> Result<MergeOutcome>;

    /// Merge the base branch into the pull request's head branch
    async fn update_pull_branch(&self, number: u64, expected_head_sha: &str) -> Result<()>;

    /// Tip of `branch`, or `None` when it does not exist
    async fn branch_sha(&self, branch: &str) -> Result<Option<String>>;

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<()>;

    /// Move `branch` to `sha`; rejected unless it is a fast-forward
    async fn fast_forward_branch(&self, branch: &str, sha: &str) -> Result<()>;

    async fn compare(&self, base: &str, head: &str) -> Result<BranchComparison>;

    /// Merge `head` into `base` with a merge commit
    async fn merge_branches(
        &self,
        base: &str,
        head: &str,
        message: &str,
    ) -> Result<BranchMergeOutcome>;
}

impl HostingApi for GitHubClient {
    async fn find_open_pull(&self, head: &str, base: &str) -> Result<Option<PullRequestInfo>> {
        PullRequestHandler::new(self).find_open(head, base).await
    }

    async fn create_pull(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestInfo> {
        PullRequestHandler::new(self)
            .create(head, base, title, body)
            .await
    }

    async fn get_pull(&self, number: u64) -> Result<PullRequestInfo> {
        PullRequestHandler::new(self).get(number).await
    }

    async fn merge_pull(
        &self,
        number: u64,
        method: MergeMethod,
        sha: Option<&str>,
    ) -> Result<MergeOutcome> {
        PullRequestHandler::new(self).merge(number, method, sha).await
    }

    async fn update_pull_branch(&self, number: u64, expected_head_sha: &str) -> Result<()> {
        PullRequestHandler::new(self)
            .update_branch(number, expected_head_sha)
            .await
    }

    async fn branch_sha(&self, branch: &str) -> Result<Option<String>> {
        BranchHandler::new(self).sha(branch).await
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<()> {
        BranchHandler::new(self).create(branch, sha).await
    }

    async fn fast_forward_branch(&self, branch: &str, sha: &str) -> Result<()> {
        BranchHandler::new(self).fast_forward(branch, sha).await
    }

    async fn compare(&self, base: &str, head: &str) -> Result<BranchComparison> {
        BranchHandler::new(self).compare(base, head).await
    }

    async fn merge_branches(
        &self,
        base: &str,
        head: &str,
        message: &str,
    ) -> Result<BranchMergeOutcome> {
        BranchHandler::new(self).merge(base, head, message).await
    }
}
