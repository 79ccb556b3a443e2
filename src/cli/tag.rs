//! Release tag command handler

use tracing::info;

use crate::cli::auth::with_git_auth;
use crate::cli::commands::TagArgs;
use crate::cli::outputs::ActionOutputs;
use crate::core::git::GitRepository;
use crate::core::release::{parse_version, ReleaseTagger};
use crate::error::Result;

/// Tag the released branch and push the tags with temporary credentials
pub fn handle_tag(args: TagArgs) -> Result<()> {
    let version = parse_version(&args.release_version)?;
    let repo = GitRepository::discover(&args.auth.path)?;
    let workdir = repo.root_dir()?;

    let tags = with_git_auth(&args.auth, &workdir, |git| {
        git.fetch_branch(&args.remote, &args.branch)?;

        let tags = ReleaseTagger::new(&repo).tag_branch(
            &args.branch,
            &args.remote,
            &version,
            args.floating_tag,
        )?;

        if args.no_push {
            info!("Skipping push of {}", tags.tag);
        } else {
            let refspecs = tags.refspecs();
            let refspecs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
            git.push(&args.remote, &refspecs)?;
        }
        Ok(tags)
    })?;

    if tags.created {
        println!("✓ Tagged {} at {}", tags.tag, tags.target);
    } else {
        println!("✓ {} already points at {}", tags.tag, tags.target);
    }

    let mut outputs = ActionOutputs::new();
    outputs.set("release-tag", &tags.tag);
    outputs.set("release-tag-created", tags.created);
    outputs.set("release-sha", tags.target);
    if let Some(floating) = &tags.floating_tag {
        outputs.set("release-floating-tag", floating);
    }
    outputs.write()
}
