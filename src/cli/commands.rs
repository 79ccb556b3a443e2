//! CLI command definitions using clap
//!
//! Defines the command structure for the `promote` tool. Every flag falls
//! back to the environment variable GitHub Actions exports for the matching
//! action input (`INPUT_<NAME>`) or runner value (`GITHUB_*`).

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::github::MergeMethod;

/// promote - branch promotion for GitHub Actions
///
/// Opens pull requests between branches, merges them with bounded retries,
/// and tags releases with short-lived git credentials.
#[derive(Parser, Debug)]
#[command(name = "promote", version, about, long_about = None)]
pub struct Cli {
    /// TOML file with retry, merge and naming settings
    #[arg(long, global = true, env = "PROMOTE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a promotion pull request and optionally merge it
    Pr(PrArgs),

    /// Tag a branch with a semantic-release version and push the tag
    Tag(TagArgs),

    /// Run a command with git credentials configured
    Exec(ExecArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Access to the GitHub API
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// Token used for API calls
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Repository as owner/name (defaults to the origin remote)
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// GitHub server URL
    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
    pub server_url: String,

    /// REST API URL for GitHub Enterprise Server
    #[arg(long, env = "GITHUB_API_URL")]
    pub api_url: Option<String>,
}

/// Git credentials to install for the duration of a command
#[derive(Args, Debug, Clone)]
pub struct GitAuthArgs {
    /// Token written to the git config as an HTTP auth header
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    pub token: String,

    /// GitHub server URL the token is valid for
    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
    pub server_url: String,

    /// SSH private key; when set, SSH is used instead of HTTPS rewrites
    #[arg(long, env = "INPUT_SSH_KEY", hide_env_values = true)]
    pub ssh_key: Option<String>,

    /// Additional known-hosts entries
    #[arg(long, env = "INPUT_SSH_KNOWN_HOSTS")]
    pub ssh_known_hosts: Option<String>,

    /// Enforce strict host key checking
    #[arg(long, env = "INPUT_SSH_STRICT", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub ssh_strict: bool,

    /// User of SSH remote URLs
    #[arg(long, env = "INPUT_SSH_USER", default_value = "git")]
    pub ssh_user: String,

    /// Keep credentials in the local git config while the command runs
    #[arg(long, env = "INPUT_PERSIST_CREDENTIALS", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub persist_credentials: bool,

    /// Also configure credentials in submodules
    #[arg(long, env = "INPUT_SUBMODULES", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub submodules: bool,

    /// Recurse into nested submodules
    #[arg(long, env = "INPUT_NESTED_SUBMODULES", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub nested_submodules: bool,

    /// Configure credentials in a temporary global git config as well
    #[arg(long, env = "INPUT_GLOBAL_AUTH", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub global_auth: bool,

    /// Workflow organization id for the `org-<id>@github.com:` rewrite
    #[arg(long, env = "INPUT_WORKFLOW_ORGANIZATION_ID")]
    pub workflow_organization_id: Option<u64>,

    /// Repository working directory
    #[arg(long, env = "INPUT_PATH", default_value = ".")]
    pub path: PathBuf,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

/// Pull request promotion
#[derive(Args, Debug)]
pub struct PrArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    /// Branch with the changes
    #[arg(long, env = "INPUT_SOURCE_BRANCH")]
    pub source: String,

    /// Branch receiving the changes
    #[arg(long, env = "INPUT_TARGET_BRANCH")]
    pub target: String,

    /// Route the pull request through `<source>-via-<target>`
    #[arg(long, env = "INPUT_REQUIRE_MIDDLE_BRANCH", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub require_middle_branch: bool,

    /// Merge the pull request after creating it
    #[arg(long, env = "INPUT_AUTO_MERGE", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub auto_merge: bool,

    /// Merge attempts before giving up (0 still attempts once)
    #[arg(long, env = "INPUT_MAX_MERGE_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// How the pull request is merged
    #[arg(long, env = "INPUT_MERGE_METHOD", value_enum, default_value_t = MergeMethod::Merge)]
    pub merge_method: MergeMethod,
}

/// Release tagging
#[derive(Args, Debug)]
pub struct TagArgs {
    #[command(flatten)]
    pub auth: GitAuthArgs,

    /// Branch whose tip is tagged
    #[arg(long, env = "INPUT_BRANCH")]
    pub branch: String,

    /// Version computed by semantic-release (with or without leading `v`)
    #[arg(long = "release-version", env = "INPUT_VERSION")]
    pub release_version: String,

    /// Move the `v<major>` tag along with stable releases
    #[arg(long, env = "INPUT_FLOATING_TAG", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub floating_tag: bool,

    /// Remote to fetch from and push to
    #[arg(long, default_value = "origin")]
    pub remote: String,

    /// Create the tags locally without pushing
    #[arg(long)]
    pub no_push: bool,
}

/// Authenticated command execution
#[derive(Args, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub auth: GitAuthArgs,

    /// Command and arguments, after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}
