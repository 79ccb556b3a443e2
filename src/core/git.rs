//! Git command execution
//!
//! Two layers:
//! - [`GitCommandManager`]: the capability the auth lifecycle needs (config
//!   mutation, submodule iteration, child environment). [`GitCli`] implements
//!   it by spawning the system `git` binary so credentials configured here are
//!   the ones later git commands actually use.
//! - [`GitRepository`]: a git2 wrapper for reading refs and creating tags.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{Oid, Repository, Signature};
use tracing::debug;

use crate::core::environment::EnvironmentOverrideScope;
use crate::error::{ActionError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────────────────────────────────────

/// Git operations needed to install and remove credentials
#[cfg_attr(test, mockall::automock)]
pub trait GitCommandManager {
    /// Write `key = value` to the local (or global) config
    fn config(&self, key: &str, value: &str, global: bool, append: bool) -> Result<()>;

    /// Remove every value of `key`; false when git reported a failure
    fn try_config_unset(&self, key: &str, global: bool) -> bool;

    /// Whether `key` has at least one value
    fn config_exists(&self, key: &str, global: bool) -> bool;

    /// All `(key, value)` pairs whose key matches `pattern`
    fn config_get_regexp(&self, pattern: &str, global: bool) -> Result<Vec<(String, String)>>;

    /// Run a shell command inside every submodule, returning combined stdout
    fn submodule_foreach(&self, command: &str, recursive: bool) -> Result<String>;

    /// Override an environment variable for spawned git processes
    fn set_environment_variable(&mut self, name: &str, value: &str);

    /// Drop an override; spawned processes see the inherited value again
    fn remove_environment_variable(&mut self, name: &str);

    /// Repository working directory
    fn working_directory(&self) -> PathBuf;
}

// ─────────────────────────────────────────────────────────────────────────────
// System git
// ─────────────────────────────────────────────────────────────────────────────

/// [`GitCommandManager`] backed by the system `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    working_directory: PathBuf,
    env: EnvironmentOverrideScope,
}

impl GitCli {
    /// Run git inside `working_directory`
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            env: EnvironmentOverrideScope::new(),
        }
    }

    /// Overrides that every spawned git process receives
    pub fn environment(&self) -> &EnvironmentOverrideScope {
        &self.env
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.working_directory).args(args);
        self.env.apply(&mut cmd);
        cmd
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit code
    pub fn run(&self, args: &[&str]) -> Result<String> {
        debug!(command = %display_args(args), "running git");
        let output = self.command(args).output().map_err(|e| ActionError::GitCommand {
            command: display_args(args),
            stderr: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ActionError::GitCommand {
                command: display_args(args),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Run git and report only whether it exited successfully
    fn succeeds(&self, args: &[&str]) -> bool {
        debug!(command = %display_args(args), "probing git");
        self.command(args)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Push refspecs to a remote
    pub fn push(&self, remote: &str, refspecs: &[&str]) -> Result<()> {
        let mut args = vec!["push", remote];
        args.extend_from_slice(refspecs);
        self.run(&args)?;
        Ok(())
    }

    /// Fetch tags and a branch from a remote
    pub fn fetch_branch(&self, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, remote);
        self.run(&["fetch", "--tags", remote, &refspec])?;
        Ok(())
    }
}

fn scope_flag(global: bool) -> &'static str {
    if global {
        "--global"
    } else {
        "--local"
    }
}

fn display_args(args: &[&str]) -> String {
    args.join(" ")
}

impl GitCommandManager for GitCli {
    fn config(&self, key: &str, value: &str, global: bool, append: bool) -> Result<()> {
        let mut args = vec!["config", scope_flag(global)];
        if append {
            args.push("--add");
        }
        args.push(key);
        args.push(value);
        self.run(&args)?;
        Ok(())
    }

    fn try_config_unset(&self, key: &str, global: bool) -> bool {
        self.succeeds(&["config", scope_flag(global), "--unset-all", key])
    }

    fn config_exists(&self, key: &str, global: bool) -> bool {
        let pattern = regex::escape(key);
        self.succeeds(&[
            "config",
            scope_flag(global),
            "--name-only",
            "--get-regexp",
            &pattern,
        ])
    }

    fn config_get_regexp(&self, pattern: &str, global: bool) -> Result<Vec<(String, String)>> {
        let args = ["config", scope_flag(global), "--get-regexp", pattern];
        let output = self.command(&args).output()?;

        // Exit code 1 means no matching key
        if output.status.code() == Some(1) {
            return Ok(Vec::new());
        }
        if !output.status.success() {
            return Err(ActionError::GitCommand {
                command: display_args(&args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| match line.split_once(' ') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (line.to_string(), String::new()),
            })
            .collect())
    }

    fn submodule_foreach(&self, command: &str, recursive: bool) -> Result<String> {
        let mut args = vec!["submodule", "foreach"];
        if recursive {
            args.push("--recursive");
        }
        args.push(command);
        self.run(&args)
    }

    fn set_environment_variable(&mut self, name: &str, value: &str) {
        self.env.set(name, value);
    }

    fn remove_environment_variable(&mut self, name: &str) {
        self.env.restore(name);
    }

    fn working_directory(&self) -> PathBuf {
        self.working_directory.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// libgit2 repository access
// ─────────────────────────────────────────────────────────────────────────────

/// Wrapper for local repository reads and tag creation
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Discover a git repository from the given path
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::discover(path.as_ref()).map_err(|_| {
            ActionError::Precondition(format!(
                "{} is not inside a git repository",
                path.as_ref().display()
            ))
        })?;
        Ok(Self { repo })
    }

    /// Repository working directory
    pub fn root_dir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| ActionError::Precondition("repository is bare".to_string()))
    }

    /// Get the URL of a remote
    pub fn remote_url(&self, remote_name: &str) -> Result<String> {
        let remote = self.repo.find_remote(remote_name)?;
        remote
            .url()
            .map(|s| s.to_string())
            .ok_or_else(|| ActionError::Config(format!("remote '{}' has no URL", remote_name)))
    }

    /// Resolve a branch to its tip commit, preferring the remote-tracking ref
    pub fn branch_tip(&self, branch: &str, remote: &str) -> Result<Oid> {
        let candidates = [
            format!("refs/remotes/{}/{}", remote, branch),
            format!("refs/heads/{}", branch),
        ];
        for refname in &candidates {
            if let Ok(reference) = self.repo.find_reference(refname) {
                return Ok(reference.peel_to_commit()?.id());
            }
        }
        Err(ActionError::BranchNotFound(branch.to_string()))
    }

    /// Commit a tag points to, if the tag exists
    pub fn tag_target(&self, name: &str) -> Result<Option<Oid>> {
        let refname = format!("refs/tags/{}", name);
        match self.repo.find_reference(&refname) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create an annotated tag at `target`, replacing an existing one if `force`
    pub fn create_annotated_tag(
        &self,
        name: &str,
        target: Oid,
        message: &str,
        force: bool,
    ) -> Result<Oid> {
        let object = self.repo.find_object(target, None)?;
        let signature = self
            .repo
            .signature()
            .or_else(|_| Signature::now("github-actions[bot]", "github-actions[bot]@users.noreply.github.com"))?;

        Ok(self.repo.tag(name, &object, &signature, message, force)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo() -> (tempfile::TempDir, Repository, Oid) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let sig = Signature::now("test", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let commit_id = {
            let tree = repo.find_tree(tree_id).unwrap();
            repo.commit(Some("refs/heads/main"), &sig, &sig, "initial", &tree, &[])
                .unwrap()
        };
        (dir, repo, commit_id)
    }

    #[test]
    fn test_scope_flag() {
        assert_eq!(scope_flag(true), "--global");
        assert_eq!(scope_flag(false), "--local");
    }

    #[test]
    fn test_branch_tip_falls_back_to_local_branch() {
        let (dir, _repo, commit) = init_repo();
        let git = GitRepository::discover(dir.path()).unwrap();
        assert_eq!(git.branch_tip("main", "origin").unwrap(), commit);
        assert!(matches!(
            git.branch_tip("missing", "origin"),
            Err(ActionError::BranchNotFound(_))
        ));
    }

    #[test]
    fn test_create_and_read_annotated_tag() {
        let (dir, _repo, commit) = init_repo();
        let git = GitRepository::discover(dir.path()).unwrap();
        assert_eq!(git.tag_target("v1.0.0").unwrap(), None);

        git.create_annotated_tag("v1.0.0", commit, "Release v1.0.0", false)
            .unwrap();
        assert_eq!(git.tag_target("v1.0.0").unwrap(), Some(commit));
    }

    #[test]
    fn test_discover_outside_repository_is_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitRepository::discover(dir.path()),
            Err(ActionError::Precondition(_))
        ));
    }
}
