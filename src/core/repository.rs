//! Repository context detection
//!
//! The runner exports `GITHUB_REPOSITORY`; outside a runner the slug is read
//! from the origin remote instead.

use std::path::Path;

use url::Url;

use crate::core::git::GitRepository;
use crate::error::{ActionError, Result};

/// Repository the action operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryContext {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
    /// GitHub server hosting the repository
    pub server_url: Url,
}

impl RepositoryContext {
    /// Resolve from an `owner/repo` slug, falling back to the origin remote
    pub fn detect(server_url: &Url, slug: Option<&str>, workdir: &Path) -> Result<Self> {
        let (owner, name) = match slug.filter(|s| !s.trim().is_empty()) {
            Some(slug) => parse_slug(slug)?,
            None => {
                let repo = GitRepository::discover(workdir)?;
                let remote_url = repo.remote_url("origin")?;
                parse_remote_url(&remote_url, server_url.host_str().unwrap_or("github.com"))?
            }
        };

        Ok(Self {
            owner,
            name,
            server_url: server_url.clone(),
        })
    }

    /// Get the full repository name (owner/name)
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

}

/// Parse `owner/repo`
pub fn parse_slug(slug: &str) -> Result<(String, String)> {
    match slug.trim().split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(ActionError::InvalidRepository(slug.to_string())),
    }
}

/// Parse a remote URL on `host` to extract owner and repository name
///
/// Supports both HTTPS and SSH URL formats:
/// - `https://github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
/// - `ssh://git@github.com/owner/repo.git`
pub fn parse_remote_url(url: &str, host: &str) -> Result<(String, String)> {
    // scp-like syntax: user@host:owner/repo.git
    if let Some((user_host, path)) = url.split_once(':') {
        if let Some((_, url_host)) = user_host.split_once('@') {
            if url_host == host && !path.starts_with("//") {
                return parse_owner_repo_path(path.trim_end_matches(".git"), url);
            }
        }
    }

    if let Ok(parsed) = Url::parse(url) {
        if parsed.host_str() == Some(host) {
            let path = parsed
                .path()
                .trim_start_matches('/')
                .trim_end_matches('/')
                .trim_end_matches(".git");
            return parse_owner_repo_path(path, url);
        }
    }

    Err(ActionError::InvalidRepository(url.to_string()))
}

fn parse_owner_repo_path(path: &str, original: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(ActionError::InvalidRepository(original.to_string())),
    }
}
