//! Git config as a key/value store
//!
//! [`GitConfigStore`] wraps a [`GitCommandManager`] and speaks in scopes and
//! entries rather than raw flags. It is the only path through which the auth
//! lifecycle touches config, which lets tests swap in a file-backed fake.

use std::fmt;

use crate::core::git::GitCommandManager;
use crate::error::Result;

/// Which config file an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    /// `.git/config` of the working repository
    Local,
    /// `$HOME/.gitconfig`, possibly a redirected temporary HOME
    Global,
}

impl ConfigScope {
    fn is_global(self) -> bool {
        matches!(self, ConfigScope::Global)
    }
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::Local => write!(f, "local"),
            ConfigScope::Global => write!(f, "global"),
        }
    }
}

/// A single config value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Dotted config key
    pub key: String,
    /// Value as stored
    pub value: String,
    /// File the entry lives in
    pub scope: ConfigScope,
}

/// A config change replayed inside every submodule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmoduleMutation {
    /// `git config --local [--add] key value`; failures propagate
    Set {
        key: String,
        value: String,
        append: bool,
    },
    /// Set a value, then print the config file path of each submodule
    /// (`file:<path>\tremote.origin.url` lines)
    SetReportingOrigin { key: String, value: String },
    /// Remove every value of key if present; failures are swallowed
    Unset { key: String },
}

impl SubmoduleMutation {
    /// Shell command executed by `git submodule foreach`
    pub fn to_shell(&self) -> String {
        match self {
            SubmoduleMutation::Set { key, value, append } => {
                let add = if *append { " --add" } else { "" };
                format!("git config --local{} '{}' '{}'", add, key, value)
            }
            SubmoduleMutation::SetReportingOrigin { key, value } => format!(
                "sh -c \"git config --local '{}' '{}' && git config --local --show-origin --name-only --get-regexp remote.origin.url\"",
                key, value
            ),
            SubmoduleMutation::Unset { key } => format!(
                "sh -c \"git config --local --name-only --get-regexp '{}' && git config --local --unset-all '{}' || :\"",
                regex::escape(key),
                key
            ),
        }
    }
}

/// Key/value view over git config files
pub struct GitConfigStore<G> {
    git: G,
}

impl<G: GitCommandManager> GitConfigStore<G> {
    /// Wrap a git capability
    pub fn new(git: G) -> Self {
        Self { git }
    }

    /// Underlying git capability
    pub fn git(&self) -> &G {
        &self.git
    }

    /// Mutable access for environment overrides
    pub fn git_mut(&mut self) -> &mut G {
        &mut self.git
    }

    /// Write a value; `append` adds another value for multi-valued keys
    pub fn set(&self, key: &str, value: &str, scope: ConfigScope, append: bool) -> Result<()> {
        self.git.config(key, value, scope.is_global(), append)
    }

    /// Remove all values of `key`; false when git refused
    pub fn unset(&self, key: &str, scope: ConfigScope) -> bool {
        self.git.try_config_unset(key, scope.is_global())
    }

    /// Whether `key` is set in the given scope
    pub fn exists(&self, key: &str, scope: ConfigScope) -> bool {
        self.git.config_exists(key, scope.is_global())
    }

    /// Entries whose key matches the regular expression `pattern`
    pub fn find_by_pattern(&self, pattern: &str, scope: ConfigScope) -> Result<Vec<ConfigEntry>> {
        Ok(self
            .git
            .config_get_regexp(pattern, scope.is_global())?
            .into_iter()
            .map(|(key, value)| ConfigEntry { key, value, scope })
            .collect())
    }

    /// Replay a mutation in every submodule and return the combined stdout
    pub fn apply_to_submodules(
        &self,
        mutation: &SubmoduleMutation,
        recursive: bool,
    ) -> Result<String> {
        self.git.submodule_foreach(&mutation.to_shell(), recursive)
    }
}
