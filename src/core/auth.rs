//! Git authentication lifecycle
//!
//! Installs credentials into git config for the duration of a run and removes
//! them again. The token never travels through a process argument list: a
//! placeholder is written with `git config` and the real header is then
//! substituted directly in the config file.
//!
//! ```text
//! Unconfigured ──configure_auth──▶ SshConfigured? ──▶ TokenConfigured ──▶ Active
//!                                                                          │
//!                                                    cleanup / remove_auth ▼
//!                                                                        Removed
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::cleanup::CleanupResult;
use crate::core::credentials::{
    CredentialProvisioner, EphemeralFile, TemporaryHome, TOKEN_PLACEHOLDER,
};
use crate::core::git::GitCommandManager;
use crate::core::git_config::{ConfigScope, GitConfigStore, SubmoduleMutation};
use crate::error::{ActionError, Result};

/// Config key holding the SSH command
pub const SSH_COMMAND_KEY: &str = "core.sshCommand";

const GIT_SSH_COMMAND_ENV: &str = "GIT_SSH_COMMAND";
const HOME_ENV: &str = "HOME";

/// Extracts config file paths from `--show-origin` output
static SUBMODULE_CONFIG_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^file:([^\t]+)\tremote\.origin\.url")
        .expect("Invalid regex pattern for submodule config paths")
});

/// Inputs that decide which credentials get installed
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Server the token authenticates against (e.g. https://github.com)
    pub server_url: Url,
    /// Token used for HTTPS remotes
    pub token: SecretString,
    /// Optional SSH private key
    pub ssh_key: Option<SecretString>,
    /// Extra known-hosts entries
    pub ssh_known_hosts: Option<String>,
    /// Enforce host key checking
    pub ssh_strict: bool,
    /// User part of SSH remote URLs
    pub ssh_user: String,
    /// Keep credentials in the repository config for later steps
    pub persist_credentials: bool,
    /// Recurse into nested submodules
    pub nested_submodules: bool,
    /// Workflow organization id, adds an `org-<id>@github.com:` rewrite rule
    pub workflow_organization_id: Option<u64>,
    /// The user's real home directory
    pub user_home: PathBuf,
}

/// Where the lifecycle currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unconfigured,
    SshConfigured,
    TokenConfigured,
    Active,
    Removed,
}

/// Installs, reveals and removes git credentials
pub struct AuthLifecycleManager<G: GitCommandManager> {
    store: GitConfigStore<G>,
    provisioner: CredentialProvisioner,
    settings: AuthSettings,
    token_config_key: String,
    token_config_value: SecretString,
    insteadof_key: String,
    insteadof_values: Vec<String>,
    ssh_command: Option<String>,
    ssh_key_file: Option<EphemeralFile>,
    known_hosts_file: Option<EphemeralFile>,
    temporary_home: Option<TemporaryHome>,
    state: AuthState,
}

impl<G: GitCommandManager> AuthLifecycleManager<G> {
    /// Prepare credentials for `settings`; nothing is written yet
    pub fn new(git: G, provisioner: CredentialProvisioner, settings: AuthSettings) -> Self {
        let origin = settings.server_url.origin().ascii_serialization();
        let host = settings.server_url.host_str().unwrap_or("github.com");

        let token_config_key = format!("http.{}/.extraheader", origin);
        let token_config_value = provisioner.derive_basic_auth_header(&settings.token);

        let insteadof_key = format!("url.{}/.insteadOf", origin);
        let mut insteadof_values = vec![format!("{}@{}:", settings.ssh_user, host)];
        if let Some(org_id) = settings.workflow_organization_id {
            insteadof_values.push(format!("org-{}@github.com:", org_id));
        }

        Self {
            store: GitConfigStore::new(git),
            provisioner,
            settings,
            token_config_key,
            token_config_value,
            insteadof_key,
            insteadof_values,
            ssh_command: None,
            ssh_key_file: None,
            known_hosts_file: None,
            temporary_home: None,
            state: AuthState::Unconfigured,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Git capability, e.g. to reuse its environment overrides
    pub fn git(&self) -> &G {
        self.store.git()
    }

    /// `http.<origin>/.extraheader`
    pub fn token_config_key(&self) -> &str {
        &self.token_config_key
    }

    /// `url.<origin>/.insteadOf`
    pub fn insteadof_key(&self) -> &str {
        &self.insteadof_key
    }

    /// SSH remote prefixes rewritten to HTTPS
    pub fn insteadof_values(&self) -> &[String] {
        &self.insteadof_values
    }

    /// SSH command, when an SSH key is configured
    pub fn ssh_command(&self) -> Option<&str> {
        self.ssh_command.as_deref()
    }

    /// Temporary HOME, once global auth was configured
    pub fn temporary_home(&self) -> Option<&Path> {
        self.temporary_home.as_ref().map(|h| h.path())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configure
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove stale auth, then configure SSH (when a key is given) and the token
    pub fn configure_auth(&mut self) -> Result<()> {
        let stale = self.remove_auth();
        debug!(outcomes = stale.outcomes().len(), "removed stale auth");
        self.state = AuthState::Unconfigured;

        self.configure_ssh()?;
        self.configure_token(ConfigScope::Local)?;
        self.state = AuthState::TokenConfigured;

        debug!(state = ?self.state, "local credentials installed");
        self.state = AuthState::Active;
        Ok(())
    }

    /// Configure the token (and HTTPS rewrite rules) in a temporary global config
    pub fn configure_global_auth(&mut self) -> Result<()> {
        if self.temporary_home.is_none() {
            let home = self
                .provisioner
                .create_temporary_home(&self.settings.user_home)?;
            self.temporary_home = Some(home);
        }
        let home_path = self
            .temporary_home
            .as_ref()
            .map(|h| h.path().to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            "Temporarily overriding HOME='{}' before making global git config changes",
            home_path
        );
        self.store
            .git_mut()
            .set_environment_variable(HOME_ENV, &home_path);

        if let Err(e) = self.configure_global_token_and_rules() {
            info!("Encountered an error when attempting to configure token. Attempting unconfigure.");
            if !self.store.unset(&self.token_config_key, ConfigScope::Global) {
                warn!("Failed to remove '{}' from the global git config", self.token_config_key);
            }
            return Err(e);
        }
        Ok(())
    }

    fn configure_global_token_and_rules(&self) -> Result<()> {
        self.configure_token(ConfigScope::Global)?;

        if self.settings.ssh_key.is_none() {
            for value in &self.insteadof_values {
                self.store
                    .set(&self.insteadof_key, value, ConfigScope::Global, true)?;
            }
        }
        Ok(())
    }

    /// Propagate credentials into every submodule's local config
    pub fn configure_submodule_auth(&mut self) -> Result<()> {
        let mut previous = CleanupResult::new();
        self.remove_git_config(&self.insteadof_key, true, &mut previous);

        if !self.settings.persist_credentials {
            return Ok(());
        }

        let recursive = self.settings.nested_submodules;
        let output = self.store.apply_to_submodules(
            &SubmoduleMutation::SetReportingOrigin {
                key: self.token_config_key.clone(),
                value: TOKEN_PLACEHOLDER.to_string(),
            },
            recursive,
        )?;

        let working_directory = self.store.git().working_directory();
        for path in parse_submodule_config_paths(&output) {
            let path = if path.is_absolute() {
                path
            } else {
                working_directory.join(path)
            };
            self.replace_token_placeholder(&path)?;
        }

        if let Some(ssh_command) = &self.ssh_command {
            self.store.apply_to_submodules(
                &SubmoduleMutation::Set {
                    key: SSH_COMMAND_KEY.to_string(),
                    value: ssh_command.clone(),
                    append: false,
                },
                recursive,
            )?;
        } else {
            for value in &self.insteadof_values {
                self.store.apply_to_submodules(
                    &SubmoduleMutation::Set {
                        key: self.insteadof_key.clone(),
                        value: value.clone(),
                        append: true,
                    },
                    recursive,
                )?;
            }
        }
        Ok(())
    }

    fn configure_ssh(&mut self) -> Result<()> {
        let Some(ssh_key) = self.settings.ssh_key.clone() else {
            return Ok(());
        };

        let key_file = self.provisioner.provision_ssh_key(&ssh_key)?;
        let key_path = key_file.path().to_path_buf();
        self.ssh_key_file = Some(key_file);

        let user_known_hosts = self.settings.user_home.join(".ssh").join("known_hosts");
        let known_hosts = self.provisioner.provision_known_hosts(
            &user_known_hosts,
            self.settings.ssh_known_hosts.as_deref(),
        )?;
        let known_hosts_path = known_hosts.path().to_path_buf();
        self.known_hosts_file = Some(known_hosts);

        let ssh_command = build_ssh_command(&key_path, &known_hosts_path, self.settings.ssh_strict);
        info!("Temporarily overriding GIT_SSH_COMMAND={}", ssh_command);
        self.store
            .git_mut()
            .set_environment_variable(GIT_SSH_COMMAND_ENV, &ssh_command);

        if self.settings.persist_credentials {
            self.store
                .set(SSH_COMMAND_KEY, &ssh_command, ConfigScope::Local, false)?;
        }

        self.ssh_command = Some(ssh_command);
        self.state = AuthState::SshConfigured;
        Ok(())
    }

    fn configure_token(&self, scope: ConfigScope) -> Result<()> {
        let config_path = self.config_path(scope)?;

        self.store
            .set(&self.token_config_key, TOKEN_PLACEHOLDER, scope, false)?;
        self.replace_token_placeholder(&config_path)
    }

    fn config_path(&self, scope: ConfigScope) -> Result<PathBuf> {
        match scope {
            ConfigScope::Local => Ok(self
                .store
                .git()
                .working_directory()
                .join(".git")
                .join("config")),
            ConfigScope::Global => self
                .temporary_home
                .as_ref()
                .map(|h| h.git_config_path())
                .ok_or_else(|| {
                    ActionError::Precondition(
                        "global config requested before the temporary HOME exists".to_string(),
                    )
                }),
        }
    }

    /// Swap the single placeholder in `path` for the real auth header
    pub fn replace_token_placeholder(&self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let occurrences = content.matches(TOKEN_PLACEHOLDER).count();
        if occurrences != 1 {
            return Err(ActionError::Integrity {
                path: path.to_path_buf(),
                occurrences,
            });
        }

        let revealed = content.replacen(
            TOKEN_PLACEHOLDER,
            self.token_config_value.expose_secret(),
            1,
        );
        fs::write(path, revealed)?;
        debug!(path = %path.display(), "revealed auth header");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remove
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove SSH and token credentials from the local config and submodules
    pub fn remove_auth(&mut self) -> CleanupResult {
        let mut result = self.remove_ssh();
        result.extend(self.remove_token());
        self.state = AuthState::Removed;
        result
    }

    /// Restore HOME and delete the temporary HOME directory
    pub fn remove_global_config(&mut self) -> CleanupResult {
        let mut result = CleanupResult::new();
        if let Some(mut home) = self.temporary_home.take() {
            info!("Deleting temporary HOME '{}'", home.path().display());
            self.store.git_mut().remove_environment_variable(HOME_ENV);
            home.remove(&mut result);
        }
        result
    }

    /// Remove everything this manager installed
    pub fn cleanup(&mut self) -> CleanupResult {
        let mut result = self.remove_auth();
        result.extend(self.remove_global_config());
        result
    }

    fn remove_ssh(&mut self) -> CleanupResult {
        let mut result = CleanupResult::new();

        if let Some(mut key_file) = self.ssh_key_file.take() {
            key_file.remove(&mut result);
        }
        if let Some(mut known_hosts) = self.known_hosts_file.take() {
            known_hosts.remove(&mut result);
        }

        self.store
            .git_mut()
            .remove_environment_variable(GIT_SSH_COMMAND_ENV);
        self.ssh_command = None;

        self.remove_git_config(SSH_COMMAND_KEY, false, &mut result);
        result
    }

    fn remove_token(&mut self) -> CleanupResult {
        let mut result = CleanupResult::new();
        self.remove_git_config(&self.token_config_key, false, &mut result);
        result
    }

    fn remove_git_config(&self, key: &str, submodule_only: bool, result: &mut CleanupResult) {
        if !submodule_only {
            if !self.store.exists(key, ConfigScope::Local) {
                result.absent(key);
            } else if self.store.unset(key, ConfigScope::Local) {
                result.removed(key);
            } else {
                result.warning(key, "git config --unset-all failed");
            }
        }

        let mutation = SubmoduleMutation::Unset {
            key: key.to_string(),
        };
        if let Err(e) = self.store.apply_to_submodules(&mutation, true) {
            result.warning(format!("{} (submodules)", key), e.to_string());
        }
    }
}

impl<G: GitCommandManager> Drop for AuthLifecycleManager<G> {
    fn drop(&mut self) {
        let pending = !matches!(self.state, AuthState::Unconfigured | AuthState::Removed)
            || self.temporary_home.is_some();
        if pending {
            warn!("auth manager dropped without cleanup; removing credentials");
            self.cleanup();
        }
    }
}

/// `ssh` invocation pinned to the provisioned key and known-hosts file
pub fn build_ssh_command(key_path: &Path, known_hosts_path: &Path, strict: bool) -> String {
    let mut command = format!("\"ssh\" -i \"{}\"", key_path.display());
    if strict {
        command.push_str(" -o StrictHostKeyChecking=yes -o CheckHostIP=no");
    }
    command.push_str(&format!(
        " -o \"UserKnownHostsFile={}\"",
        known_hosts_path.display()
    ));
    command
}

/// Config file paths from `git config --show-origin` output
pub fn parse_submodule_config_paths(output: &str) -> Vec<PathBuf> {
    SUBMODULE_CONFIG_PATH
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| PathBuf::from(m.as_str()))
        .collect()
}
