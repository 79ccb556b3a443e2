//! Git credential setup shared by commands that talk to remotes

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use secrecy::SecretString;
use tracing::info;
use url::Url;

use crate::cli::commands::GitAuthArgs;
use crate::core::auth::{AuthLifecycleManager, AuthSettings};
use crate::core::credentials::{CredentialProvisioner, WorkflowMasker};
use crate::core::git::GitCli;
use crate::error::{ActionError, Result};

/// Translate command-line arguments into auth settings
pub fn auth_settings(args: &GitAuthArgs, user_home: PathBuf) -> Result<AuthSettings> {
    if args.token.trim().is_empty() {
        return Err(ActionError::InvalidInput("A token is required (--token or INPUT_TOKEN)".into()));
    }

    Ok(AuthSettings {
        server_url: Url::parse(&args.server_url)?,
        token: SecretString::from(args.token.clone()),
        ssh_key: args
            .ssh_key
            .as_ref()
            .filter(|k| !k.trim().is_empty())
            .map(|k| SecretString::from(k.clone())),
        ssh_known_hosts: args.ssh_known_hosts.clone(),
        ssh_strict: args.ssh_strict,
        ssh_user: args.ssh_user.clone(),
        persist_credentials: args.persist_credentials,
        nested_submodules: args.nested_submodules,
        workflow_organization_id: args.workflow_organization_id,
        user_home,
    })
}

fn user_home() -> Result<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| ActionError::Precondition("Could not determine the home directory".into()))
}

/// Configure credentials, run `f`, then remove the credentials again
///
/// Cleanup runs whether configuration or `f` failed; its warnings never
/// replace the original error.
pub fn with_git_auth<T, F>(args: &GitAuthArgs, workdir: &Path, f: F) -> Result<T>
where
    F: FnOnce(&GitCli) -> Result<T>,
{
    let settings = auth_settings(args, user_home()?)?;
    let provisioner = CredentialProvisioner::from_env(Box::new(WorkflowMasker))?;
    let mut manager = AuthLifecycleManager::new(GitCli::new(workdir), provisioner, settings);

    let result = configure(&mut manager, args).and_then(|_| f(manager.git()));

    let cleanup = manager.cleanup();
    if cleanup.is_clean() {
        info!("Removed git credentials");
    }
    result
}

fn configure(manager: &mut AuthLifecycleManager<GitCli>, args: &GitAuthArgs) -> Result<()> {
    info!("Configuring git credentials");
    manager.configure_auth()?;
    if args.global_auth {
        manager.configure_global_auth()?;
    }
    if args.submodules {
        manager.configure_submodule_auth()?;
    }
    Ok(())
}
