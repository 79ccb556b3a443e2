//! promote - branch promotion for GitHub Actions
//!
//! Opens and merges promotion pull requests, tags releases and runs commands
//! with temporary git credentials.
//!
//! Available as the `promote` command.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use branch_promoter::cli::commands::{Cli, Commands};
use branch_promoter::cli::outputs::error_annotation;
use branch_promoter::cli::{exec, pr, tag};
use branch_promoter::core::config::Config;
use branch_promoter::error::{ActionError, Result};

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            handle_error(&e);
            std::process::exit(1);
        }
    }
}

/// Report a terminal error to the user and the workflow log
fn handle_error(e: &ActionError) {
    eprintln!("Error: {}", e);
    println!("{}", error_annotation(&e.to_string()));
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Pr(args) => pr::handle_pr(args, &config).await.map(|_| 0),
        Commands::Tag(args) => tag::handle_tag(args).map(|_| 0),
        Commands::Exec(args) => exec::handle_exec(args),
    }
}
