//! GitHub API integration module
//!
//! This module provides all GitHub-related functionality:
//! - The hosting capability and its octocrab implementation
//! - Pull request and branch operations
//! - Promotion pull requests and the merge retry loop
//! - Error classification

pub mod branch;
pub mod client;
pub mod error_handler;
pub mod hosting;
pub mod pull_request;
pub mod retry;
pub mod service;

pub use client::GitHubClient;
pub use error_handler::classify_github_error;
pub use hosting::{HostingApi, MergeOutcome, PullRequestInfo};
pub use pull_request::MergeMethod;
pub use retry::RetryPolicy;
pub use service::{PromotedPullRequest, PullRequestAction, PullRequestService};
