//! Ephemeral credential material
//!
//! Everything written here lives under the runner temp directory and is
//! owned by an [`EphemeralFile`] or [`TemporaryHome`] handle that knows how to
//! remove it again:
//! - the HTTP basic-auth header derived from the token
//! - the SSH private key (owner-only permissions)
//! - a known-hosts file combining user, input and built-in host keys
//! - a temporary HOME holding a copy of the user's global git config

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::cleanup::CleanupResult;
use crate::error::{ActionError, Result};

/// Value written to config before the real header is revealed
pub const TOKEN_PLACEHOLDER: &str = "AUTHORIZATION: basic ***";

/// Host key always appended to the generated known-hosts file
pub const GITHUB_KNOWN_HOST: &str =
    "github.com ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";

const RUNNER_TEMP_ENV: &str = "RUNNER_TEMP";

// ─────────────────────────────────────────────────────────────────────────────
// Secret masking
// ─────────────────────────────────────────────────────────────────────────────

/// Registers values that must never appear in logs
pub trait SecretMasker {
    /// Mask `secret` in all subsequent output
    fn mask(&self, secret: &str);
}

/// Masks secrets through the `::add-mask::` workflow command
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowMasker;

impl SecretMasker for WorkflowMasker {
    fn mask(&self, secret: &str) {
        if !secret.is_empty() {
            println!("::add-mask::{}", secret);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ephemeral files
// ─────────────────────────────────────────────────────────────────────────────

/// A file whose owner guarantees eventual deletion
///
/// Call [`EphemeralFile::remove`] to get an explicit outcome; dropping an
/// unremoved handle deletes the file silently.
#[derive(Debug)]
pub struct EphemeralFile {
    path: PathBuf,
    removed: bool,
}

impl EphemeralFile {
    fn persist(temp: tempfile::NamedTempFile) -> Result<Self> {
        let (_, path) = temp.keep().map_err(std::io::Error::from)?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without directory
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Delete the file, recording what happened
    pub fn remove(&mut self, result: &mut CleanupResult) {
        let resource = self.path.display().to_string();
        if self.removed {
            result.absent(resource);
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                self.removed = true;
                result.removed(resource);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.removed = true;
                result.absent(resource);
            }
            Err(e) => result.warning(resource, e.to_string()),
        }
    }
}

impl Drop for EphemeralFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Temporary HOME directory used for global git config
#[derive(Debug)]
pub struct TemporaryHome {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl TemporaryHome {
    /// Directory to use as HOME
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Global config file inside the temporary HOME
    pub fn git_config_path(&self) -> PathBuf {
        self.path.join(".gitconfig")
    }

    /// Delete the directory tree, recording what happened
    pub fn remove(&mut self, result: &mut CleanupResult) {
        let resource = self.path.display().to_string();
        match self.dir.take() {
            Some(dir) => match dir.close() {
                Ok(()) => result.removed(resource),
                Err(e) => result.warning(resource, e.to_string()),
            },
            None => result.absent(resource),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provisioner
// ─────────────────────────────────────────────────────────────────────────────

/// Creates credential artifacts under the runner temp directory
pub struct CredentialProvisioner {
    runner_temp: PathBuf,
    masker: Box<dyn SecretMasker>,
}

impl CredentialProvisioner {
    /// Provisioner rooted at an explicit temp directory
    pub fn new(runner_temp: impl Into<PathBuf>, masker: Box<dyn SecretMasker>) -> Self {
        Self {
            runner_temp: runner_temp.into(),
            masker,
        }
    }

    /// Provisioner rooted at `$RUNNER_TEMP`
    pub fn from_env(masker: Box<dyn SecretMasker>) -> Result<Self> {
        match std::env::var_os(RUNNER_TEMP_ENV) {
            Some(dir) if !dir.is_empty() => Ok(Self::new(dir, masker)),
            _ => Err(ActionError::Precondition(format!(
                "{} is not defined",
                RUNNER_TEMP_ENV
            ))),
        }
    }

    /// `AUTHORIZATION: basic base64(x-access-token:<token>)`, masked before use
    pub fn derive_basic_auth_header(&self, token: &SecretString) -> SecretString {
        let encoded = BASE64.encode(format!("x-access-token:{}", token.expose_secret()));
        self.masker.mask(&encoded);
        SecretString::from(format!("AUTHORIZATION: basic {}", encoded))
    }

    /// Write an SSH private key readable only by the current user
    pub fn provision_ssh_key(&self, raw_key: &SecretString) -> Result<EphemeralFile> {
        let mut temp = tempfile::Builder::new()
            .prefix("ssh_key_")
            .tempfile_in(&self.runner_temp)?;
        temp.write_all(raw_key.expose_secret().trim().as_bytes())?;
        temp.write_all(b"\n")?;
        temp.flush()?;

        let file = EphemeralFile::persist(temp)?;
        restrict_to_current_user(file.path())?;
        info!(path = %file.path().display(), "wrote SSH key");
        Ok(file)
    }

    /// Build a known-hosts file from the user's file, extra input hosts and
    /// the built-in github.com key
    pub fn provision_known_hosts(
        &self,
        user_known_hosts: &Path,
        extra_hosts: Option<&str>,
    ) -> Result<EphemeralFile> {
        let existing = match fs::read_to_string(user_known_hosts) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let content = compose_known_hosts(user_known_hosts, existing.as_deref(), extra_hosts);

        let mut temp = tempfile::Builder::new()
            .prefix("ssh_")
            .suffix("_known_hosts")
            .tempfile_in(&self.runner_temp)?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;

        let file = EphemeralFile::persist(temp)?;
        debug!(path = %file.path().display(), "wrote known hosts");
        Ok(file)
    }

    /// Create a temporary HOME, copying `<user_home>/.gitconfig` when present
    pub fn create_temporary_home(&self, user_home: &Path) -> Result<TemporaryHome> {
        let dir = tempfile::Builder::new()
            .prefix("home_")
            .tempdir_in(&self.runner_temp)?;
        let path = dir.path().to_path_buf();

        let user_config = user_home.join(".gitconfig");
        if user_config.is_file() {
            let target = path.join(".gitconfig");
            info!(
                "Copying '{}' to '{}'",
                user_config.display(),
                target.display()
            );
            fs::copy(&user_config, &target)?;
        }

        info!(path = %path.display(), "created temporary HOME");
        Ok(TemporaryHome {
            dir: Some(dir),
            path,
        })
    }
}

/// Known-hosts content: user section, input section, built-in entry
pub fn compose_known_hosts(
    user_known_hosts: &Path,
    existing: Option<&str>,
    extra_hosts: Option<&str>,
) -> String {
    let mut known_hosts = String::new();

    if let Some(existing) = existing.filter(|s| !s.trim().is_empty()) {
        let source = user_known_hosts.display();
        known_hosts.push_str(&format!(
            "# Begin from {}\n{}\n# End from {}\n",
            source,
            existing.trim_end(),
            source
        ));
    }

    if let Some(extra) = extra_hosts.filter(|s| !s.trim().is_empty()) {
        known_hosts.push_str(&format!(
            "# Begin from input known hosts\n{}\n# End from input known hosts\n",
            extra.trim_end()
        ));
    }

    known_hosts.push_str(&format!(
        "# Begin implicitly added github.com\n{}\n# End implicitly added github.com\n",
        GITHUB_KNOWN_HOST
    ));
    known_hosts
}

#[cfg(unix)]
fn restrict_to_current_user(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(windows)]
fn restrict_to_current_user(path: &Path) -> Result<()> {
    use std::process::Command;

    let domain = std::env::var("USERDOMAIN").unwrap_or_default();
    let user = std::env::var("USERNAME").unwrap_or_default();
    let grant = format!("{}\\{}:F", domain, user);
    let target = path.display().to_string();

    for args in [
        vec![target.as_str(), "/grant:r", grant.as_str()],
        vec![target.as_str(), "/inheritance:r"],
    ] {
        let output = Command::new("icacls").args(&args).output()?;
        if !output.status.success() {
            return Err(ActionError::Precondition(format!(
                "icacls {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
    }
    Ok(())
}
