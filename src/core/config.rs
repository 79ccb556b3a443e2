//! Tunables loaded from TOML
//!
//! Everything here has a sensible default, so a missing file is not an error.
//! An explicitly requested file (`--config`) must exist.
//!
//! ```toml
//! [retry]
//! base_delay_ms = 2000
//! factor = 2.0
//! max_delay_ms = 60000
//!
//! [merge]
//! conflict_status_codes = [405]
//! transient_status_codes = [409, 429, 500, 502, 503, 504]
//!
//! [pull_request]
//! middle_branch_pattern = "{source}-via-{target}"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ActionError, Result};

/// Backoff between merge attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Multiplier applied per further attempt
    pub factor: f64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            factor: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

/// How merge API status codes are interpreted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    /// Statuses meaning the branches do not merge cleanly
    pub conflict_status_codes: Vec<u16>,
    /// Statuses worth retrying unchanged
    pub transient_status_codes: Vec<u16>,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            conflict_status_codes: vec![405],
            transient_status_codes: vec![409, 429, 500, 502, 503, 504],
        }
    }
}

/// Naming and text of created pull requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestSettings {
    /// Middle branch name; `{source}` and `{target}` are substituted
    pub middle_branch_pattern: String,
    /// Pull request title template
    pub title_template: String,
    /// Pull request body template
    pub body_template: String,
}

impl Default for PullRequestSettings {
    fn default() -> Self {
        Self {
            middle_branch_pattern: "{source}-via-{target}".to_string(),
            title_template: "Merge {source} into {target}".to_string(),
            body_template: "Automated promotion of `{source}` into `{target}`.".to_string(),
        }
    }
}

impl PullRequestSettings {
    /// Name of the middle branch for a source/target pair
    pub fn middle_branch(&self, source: &str, target: &str) -> String {
        render(&self.middle_branch_pattern, source, target)
    }

    /// Rendered pull request title
    pub fn title(&self, source: &str, target: &str) -> String {
        render(&self.title_template, source, target)
    }

    /// Rendered pull request body
    pub fn body(&self, source: &str, target: &str) -> String {
        render(&self.body_template, source, target)
    }
}

fn render(template: &str, source: &str, target: &str) -> String {
    template
        .replace("{source}", source)
        .replace("{target}", target)
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retry: RetrySettings,
    pub merge: MergeSettings,
    pub pull_request: PullRequestSettings,
}

impl Config {
    /// Load from `explicit` if given, else from the platform config dir
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_path() {
                Ok(path) if path.is_file() => Self::from_file(&path)?,
                _ => Config::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path).map_err(|e| {
            ActionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "branch-promoter", "branch-promoter")
            .ok_or_else(|| ActionError::Config("Could not determine config directory".into()))?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Reject values the retry loop and branch naming cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.retry.factor.is_finite() || self.retry.factor < 1.0 {
            return Err(ActionError::Config(format!(
                "retry.factor must be >= 1.0, got {}",
                self.retry.factor
            )));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ActionError::Config(
                "retry.max_delay_ms must not be smaller than retry.base_delay_ms".into(),
            ));
        }
        if !self.pull_request.middle_branch_pattern.contains("{source}") {
            return Err(ActionError::Config(
                "pull_request.middle_branch_pattern must contain {source}".into(),
            ));
        }
        if let Some(code) = self
            .merge
            .conflict_status_codes
            .iter()
            .find(|c| self.merge.transient_status_codes.contains(c))
        {
            return Err(ActionError::Config(format!(
                "status {} is listed as both conflict and transient",
                code
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.merge.conflict_status_codes, vec![405]);
        assert!(config.merge.transient_status_codes.contains(&409));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[retry]\nbase_delay_ms = 10\n\n[merge]\nconflict_status_codes = [405, 422]\n")
            .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.retry.base_delay_ms, 10);
        assert_eq!(config.retry.factor, 2.0);
        assert_eq!(config.merge.conflict_status_codes, vec![405, 422]);
        assert_eq!(config.pull_request, PullRequestSettings::default());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ActionError::Config(_)));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[retry\n").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(ActionError::Toml(_))));
    }

    #[test]
    fn test_overlapping_status_codes_rejected() {
        let mut config = Config::default();
        config.merge.conflict_status_codes.push(409);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_templates_render_branch_names() {
        let settings = PullRequestSettings::default();
        assert_eq!(settings.middle_branch("feature", "main"), "feature-via-main");
        assert_eq!(settings.title("feature", "main"), "Merge feature into main");
        assert!(settings.body("feature", "main").contains("`feature`"));
    }
}
