//! GitHub API client wrapper using octocrab

use octocrab::Octocrab;
use secrecy::{ExposeSecret, SecretString};

use crate::core::config::MergeSettings;
use crate::error::Result;

/// GitHub API client wrapper
pub struct GitHubClient {
    /// The octocrab instance
    inner: Octocrab,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Status classification for merge responses
    pub merge_settings: MergeSettings,
}

impl GitHubClient {
    /// Create a client for `owner/repo`
    ///
    /// `api_url` points at a GitHub Enterprise API (the runner's
    /// `GITHUB_API_URL`); github.com is used when absent.
    pub fn new(
        token: &SecretString,
        api_url: Option<&str>,
        owner: String,
        repo: String,
        merge_settings: MergeSettings,
    ) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.expose_secret().to_string());
        if let Some(url) = api_url.filter(|u| !u.is_empty()) {
            builder = builder.base_uri(url)?;
        }

        Ok(Self {
            inner: builder.build()?,
            owner,
            repo,
            merge_settings,
        })
    }

    /// Get the inner octocrab instance
    pub fn octocrab(&self) -> &Octocrab {
        &self.inner
    }

    /// Get pulls handler for this repository
    pub fn pulls(&self) -> octocrab::pulls::PullRequestHandler<'_> {
        self.inner.pulls(&self.owner, &self.repo)
    }

    /// Route prefix for raw REST calls
    pub fn repo_route(&self) -> String {
        format!("/repos/{}/{}", self.owner, self.repo)
    }
}
