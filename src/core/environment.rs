//! Environment variable overrides for spawned processes
//!
//! The promoter never mutates its own process environment. Variables such as
//! `HOME` and `GIT_SSH_COMMAND` are recorded here and applied to every git or
//! child process it spawns; dropping an override restores the inherited value.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::process::Command;

/// Named environment overrides layered on top of the inherited environment
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOverrideScope {
    /// `Some(value)` sets the variable, `None` hides the inherited one
    overrides: BTreeMap<String, Option<OsString>>,
}

impl EnvironmentOverrideScope {
    /// Create an empty scope (children see the inherited environment)
    pub fn new() -> Self {
        Self::default()
    }

    /// Override a variable for spawned processes
    pub fn set(&mut self, name: &str, value: impl Into<OsString>) {
        self.overrides.insert(name.to_string(), Some(value.into()));
    }

    /// Hide an inherited variable from spawned processes
    pub fn unset(&mut self, name: &str) {
        self.overrides.insert(name.to_string(), None);
    }

    /// Drop any override for `name`; children see the inherited value again
    pub fn restore(&mut self, name: &str) -> bool {
        self.overrides.remove(name).is_some()
    }

    /// Effective value of `name` as a child process would see it
    pub fn get(&self, name: &str) -> Option<OsString> {
        match self.overrides.get(name) {
            Some(value) => value.clone(),
            None => std::env::var_os(name),
        }
    }

    /// Apply all overrides to a command before it is spawned
    pub fn apply(&self, cmd: &mut Command) {
        for (name, value) in &self.overrides {
            match value {
                Some(v) => {
                    cmd.env(name, v);
                }
                None => {
                    cmd.env_remove(name);
                }
            }
        }
    }
}
