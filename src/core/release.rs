//! Release tagging
//!
//! Turns a version computed by semantic-release into an annotated
//! `v<version>` tag at the tip of the released branch, plus an optional
//! floating `v<major>` tag that always follows the newest stable release.

use git2::Oid;
use semver::Version;
use tracing::info;

use crate::core::git::GitRepository;
use crate::error::{ActionError, Result};

/// Tags prepared locally and ready to push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTags {
    /// Parsed release version
    pub version: Version,
    /// `v<version>`
    pub tag: String,
    /// `v<major>`, moved to the release commit
    pub floating_tag: Option<String>,
    /// Commit the tags point to
    pub target: Oid,
    /// False when the release tag already pointed at `target`
    pub created: bool,
}

impl ReleaseTags {
    /// Refspecs for `git push`; the floating tag is force-pushed
    pub fn refspecs(&self) -> Vec<String> {
        let mut refspecs = vec![format!("refs/tags/{0}:refs/tags/{0}", self.tag)];
        if let Some(floating) = &self.floating_tag {
            refspecs.push(format!("+refs/tags/{0}:refs/tags/{0}", floating));
        }
        refspecs
    }
}

/// Parse a version, accepting an optional leading `v`
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare).map_err(|e| {
        ActionError::InvalidInput(format!("'{}' is not a semantic version: {}", raw, e))
    })
}

/// Release tag for a version
pub fn release_tag_name(version: &Version) -> String {
    format!("v{}", version)
}

/// Floating major tag, only for stable releases
pub fn floating_tag_name(version: &Version) -> Option<String> {
    version.pre.is_empty().then(|| format!("v{}", version.major))
}

/// Create release tags in a local repository
pub struct ReleaseTagger<'a> {
    repo: &'a GitRepository,
}

impl<'a> ReleaseTagger<'a> {
    pub fn new(repo: &'a GitRepository) -> Self {
        Self { repo }
    }

    /// Tag the tip of `branch` (remote-tracking ref preferred)
    pub fn tag_branch(
        &self,
        branch: &str,
        remote: &str,
        version: &Version,
        floating: bool,
    ) -> Result<ReleaseTags> {
        let target = self.repo.branch_tip(branch, remote)?;
        let tag = release_tag_name(version);

        let created = match self.repo.tag_target(&tag)? {
            Some(existing) if existing == target => {
                info!("Tag {} already points at {}", tag, target);
                false
            }
            Some(existing) => {
                return Err(ActionError::InvalidInput(format!(
                    "Tag {} already exists at {}, refusing to move it to {} ({})",
                    tag, existing, target, branch
                )));
            }
            None => {
                self.repo
                    .create_annotated_tag(&tag, target, &format!("Release {}", tag), false)?;
                info!("Created tag {} at {}", tag, target);
                true
            }
        };

        let floating_tag = if floating {
            floating_tag_name(version)
        } else {
            None
        };
        if let Some(name) = &floating_tag {
            self.repo.create_annotated_tag(
                name,
                target,
                &format!("Latest {} release ({})", name, tag),
                true,
            )?;
            info!("Moved tag {} to {}", name, target);
        }

        Ok(ReleaseTags {
            version: version.clone(),
            tag,
            floating_tag,
            target,
            created,
        })
    }
}
