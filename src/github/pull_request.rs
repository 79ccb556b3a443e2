//! Pull request operations

use octocrab::models::pulls::PullRequest;
use octocrab::params::State;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ActionError, Result};
use crate::github::client::GitHubClient;
use crate::github::error_handler::{api_error_parts, classify_merge_failure};
use crate::github::hosting::{MergeOutcome, PullRequestInfo};

/// Merge method for pull requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MergeMethod {
    /// Create a merge commit
    #[default]
    Merge,
    /// Squash and merge
    Squash,
    /// Rebase and merge
    Rebase,
}

impl From<MergeMethod> for octocrab::params::pulls::MergeMethod {
    fn from(method: MergeMethod) -> Self {
        match method {
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        }
    }
}

impl From<PullRequest> for PullRequestInfo {
    fn from(pr: PullRequest) -> Self {
        Self {
            number: pr.number,
            html_url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
            head_ref: pr.head.ref_field.clone(),
            base_ref: pr.base.ref_field.clone(),
            head_sha: pr.head.sha.clone(),
            merged: pr.merged_at.is_some(),
            merge_commit_sha: pr.merged_at.and(pr.merge_commit_sha),
        }
    }
}

/// Pull request operations handler
pub struct PullRequestHandler<'a> {
    client: &'a GitHubClient,
}

impl<'a> PullRequestHandler<'a> {
    /// Create a new handler
    pub fn new(client: &'a GitHubClient) -> Self {
        Self { client }
    }

    /// First open pull request from `head` into `base`
    pub async fn find_open(&self, head: &str, base: &str) -> Result<Option<PullRequestInfo>> {
        let pulls_handler = self.client.pulls();
        let prs = pulls_handler
            .list()
            .state(State::Open)
            .head(format!("{}:{}", self.client.owner, head))
            .base(base)
            .per_page(1)
            .send()
            .await?;

        Ok(prs.items.into_iter().next().map(PullRequestInfo::from))
    }

    /// Get a specific pull request by number
    pub async fn get(&self, number: u64) -> Result<PullRequestInfo> {
        let pr = self.client.pulls().get(number).await?;
        Ok(pr.into())
    }

    /// Create a new pull request
    pub async fn create(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestInfo> {
        let pulls_handler = self.client.pulls();
        let pr = pulls_handler
            .create(title, head, base)
            .body(body)
            .send()
            .await?;
        Ok(pr.into())
    }

    /// Merge a pull request, classifying refusals instead of failing
    pub async fn merge(
        &self,
        number: u64,
        method: MergeMethod,
        sha: Option<&str>,
    ) -> Result<MergeOutcome> {
        let pulls_handler = self.client.pulls();
        let mut builder = pulls_handler
            .merge(number)
            .method(octocrab::params::pulls::MergeMethod::from(method));
        if let Some(sha) = sha {
            builder = builder.sha(sha);
        }

        match builder.send().await {
            Ok(merge) if merge.merged => Ok(MergeOutcome::Merged {
                sha: merge.sha.unwrap_or_default(),
            }),
            Ok(merge) => Ok(MergeOutcome::Transient(
                merge
                    .message
                    .unwrap_or_else(|| "merge was not performed".to_string()),
            )),
            Err(err) => {
                let Some((status, message)) = api_error_parts(&err) else {
                    return Err(err.into());
                };
                debug!(status, %message, "merge request refused");
                classify_merge_failure(&self.client.merge_settings, status, &message)
                    .ok_or_else(|| {
                        ActionError::GitHubApi(format!(
                            "merging #{} failed: {} ({})",
                            number, message, status
                        ))
                    })
            }
        }
    }

    /// Bring the pull request head up to date with its base
    pub async fn update_branch(&self, number: u64, expected_head_sha: &str) -> Result<()> {
        let route = format!("{}/pulls/{}/update-branch", self.client.repo_route(), number);

        #[derive(Serialize)]
        struct UpdateBranchRequest<'s> {
            expected_head_sha: &'s str,
        }

        #[derive(Deserialize)]
        struct UpdateBranchResponse {
            message: Option<String>,
        }

        let body = UpdateBranchRequest { expected_head_sha };
        let response: UpdateBranchResponse =
            self.client.octocrab().put(&route, Some(&body)).await?;
        debug!(number, message = ?response.message, "requested branch update");

        Ok(())
    }
}
