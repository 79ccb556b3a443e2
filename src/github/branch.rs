//! Branch operations

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ActionError, Result};
use crate::github::client::GitHubClient;
use crate::github::error_handler::api_error_parts;
use crate::github::hosting::{BranchComparison, BranchMergeOutcome};

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Comparison {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MergeCommit {
    sha: String,
}

/// Branch operations handler
pub struct BranchHandler<'a> {
    client: &'a GitHubClient,
}

impl<'a> BranchHandler<'a> {
    /// Create a new handler
    pub fn new(client: &'a GitHubClient) -> Self {
        Self { client }
    }

    /// Tip commit of a branch, `None` when the branch does not exist
    pub async fn sha(&self, name: &str) -> Result<Option<String>> {
        // GitHub API: GET /repos/{owner}/{repo}/git/ref/heads/{branch}
        let route = format!("{}/git/ref/heads/{}", self.client.repo_route(), name);

        match self.client.octocrab().get::<GitRef, _, _>(&route, None::<&()>).await {
            Ok(git_ref) => Ok(Some(git_ref.object.sha)),
            Err(err) if matches!(api_error_parts(&err), Some((404, _))) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Create a branch pointing at `sha`
    pub async fn create(&self, name: &str, sha: &str) -> Result<()> {
        let route = format!("{}/git/refs", self.client.repo_route());

        #[derive(Serialize)]
        struct CreateRefRequest {
            #[serde(rename = "ref")]
            ref_name: String,
            sha: String,
        }

        let body = CreateRefRequest {
            ref_name: format!("refs/heads/{}", name),
            sha: sha.to_string(),
        };
        let _: GitRef = self.client.octocrab().post(&route, Some(&body)).await?;
        debug!(branch = name, sha, "created branch");
        Ok(())
    }

    /// Move a branch forward; GitHub rejects non-fast-forward updates
    pub async fn fast_forward(&self, name: &str, sha: &str) -> Result<()> {
        let route = format!("{}/git/refs/heads/{}", self.client.repo_route(), name);

        #[derive(Serialize)]
        struct UpdateRefRequest<'s> {
            sha: &'s str,
            force: bool,
        }

        let body = UpdateRefRequest { sha, force: false };
        let _: GitRef = self.client.octocrab().patch(&route, Some(&body)).await?;
        debug!(branch = name, sha, "fast-forwarded branch");
        Ok(())
    }

    /// Compare `head` against `base`
    pub async fn compare(&self, base: &str, head: &str) -> Result<BranchComparison> {
        let route = format!("{}/compare/{}...{}", self.client.repo_route(), base, head);
        let comparison: Comparison = self.client.octocrab().get(&route, None::<&()>).await?;

        match comparison.status.as_str() {
            "identical" => Ok(BranchComparison::Identical),
            "ahead" => Ok(BranchComparison::Ahead),
            "behind" => Ok(BranchComparison::Behind),
            "diverged" => Ok(BranchComparison::Diverged),
            other => Err(ActionError::GitHubApi(format!(
                "unexpected comparison status '{}' for {}...{}",
                other, base, head
            ))),
        }
    }

    /// Merge `head` into `base` server-side
    pub async fn merge(&self, base: &str, head: &str, message: &str) -> Result<BranchMergeOutcome> {
        // POST /repos/{owner}/{repo}/merges answers 201, 204 (nothing to merge) or 409
        let route = format!("{}/merges", self.client.repo_route());

        #[derive(Serialize)]
        struct MergeRequest<'s> {
            base: &'s str,
            head: &'s str,
            commit_message: &'s str,
        }

        let body = MergeRequest {
            base,
            head,
            commit_message: message,
        };
        let octocrab = self.client.octocrab();
        let response = octocrab._post(route.as_str(), Some(&body)).await?;
        let status = response.status().as_u16();

        match status {
            201 => {
                let text = octocrab.body_to_string(response).await?;
                let commit: MergeCommit = serde_json::from_str(&text)?;
                Ok(BranchMergeOutcome::Merged(commit.sha))
            }
            204 => Ok(BranchMergeOutcome::UpToDate),
            409 => Ok(BranchMergeOutcome::Conflict),
            _ => {
                let text = octocrab.body_to_string(response).await.unwrap_or_default();
                Err(ActionError::GitHubApi(format!(
                    "merging {} into {} failed ({}): {}",
                    head, base, status, text
                )))
            }
        }
    }
}
