//! Authenticated command execution

use std::process::Command;

use tracing::info;

use crate::cli::auth::with_git_auth;
use crate::cli::commands::ExecArgs;
use crate::core::git::GitRepository;
use crate::error::{ActionError, Result};

/// Run the command with credentials configured; returns its exit code
pub fn handle_exec(args: ExecArgs) -> Result<i32> {
    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| ActionError::InvalidInput("No command given after `--`".into()))?;
    let workdir = GitRepository::discover(&args.auth.path)?.root_dir()?;

    with_git_auth(&args.auth, &workdir, |git| {
        let mut command = Command::new(program);
        command.args(rest).current_dir(&args.auth.path);
        git.environment().apply(&mut command);

        info!("Running {}", args.command.join(" "));
        let status = command.status().map_err(|e| {
            ActionError::InvalidInput(format!("Failed to start '{}': {}", program, e))
        })?;

        // Killed by a signal
        Ok(status.code().unwrap_or(1))
    })
}
