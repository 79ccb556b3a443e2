//! Pull request promotion command handler

use secrecy::SecretString;
use tracing::info;
use url::Url;

use crate::cli::commands::PrArgs;
use crate::cli::outputs::ActionOutputs;
use crate::core::config::Config;
use crate::core::repository::RepositoryContext;
use crate::error::Result;
use crate::github::{GitHubClient, PullRequestService, RetryPolicy};

/// Create the promotion pull request and merge it when requested
pub async fn handle_pr(args: PrArgs, config: &Config) -> Result<()> {
    let token = SecretString::from(args.api.token.clone());
    let server_url = Url::parse(&args.api.server_url)?;
    let workdir = std::env::current_dir()?;
    let repo_ctx = RepositoryContext::detect(&server_url, args.api.repository.as_deref(), &workdir)?;

    let client = GitHubClient::new(
        &token,
        args.api.api_url.as_deref(),
        repo_ctx.owner.clone(),
        repo_ctx.name.clone(),
        config.merge.clone(),
    )?;
    let retry = RetryPolicy::new(args.max_retries, &config.retry);
    let mut service = PullRequestService::new(
        &client,
        config.pull_request.clone(),
        retry,
        args.merge_method,
    );

    info!(
        "Promoting {} into {} in {}",
        args.source,
        args.target,
        repo_ctx.full_name()
    );
    let pr = service
        .create_pull_request(&args.source, &args.target, args.require_middle_branch)
        .await?;
    println!("✓ Pull request #{} {}: {}", pr.number, pr.action, pr.html_url);

    if !args.auto_merge {
        return ActionOutputs::for_pull_request(&pr).write();
    }

    match service
        .merge_pull_request_with_retries(&pr, &args.source, &args.target)
        .await
    {
        Ok(merged) => {
            println!("✓ Merged pull request #{} ({})", merged.number, merged.head_sha);
            ActionOutputs::for_pull_request(&merged).write()
        }
        Err(e) => {
            // The PR exists even though it could not be merged
            ActionOutputs::for_pull_request(&pr).write()?;
            Err(e)
        }
    }
}
