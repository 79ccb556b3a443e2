//! Promotion pull requests and the merge retry protocol
//!
//! A promotion moves the commits of a source branch into a target branch
//! through a pull request. With a middle branch the PR head is
//! `<source>-via-<target>` (configurable), kept in sync server-side so
//! conflicts with a moving target are resolved without touching the source
//! branch. The middle branch is only ever fast-forwarded or merged into.
//!
//! ```text
//! attempt n:  catch middle branch up with target (n > 1)
//!                 │
//!             get_pull ─ merged? ──▶ done
//!                 │
//!             merge_pull ─ Merged ──▶ done
//!                 ├─ Transient ──▶ back off
//!                 └─ Conflict ──▶ resync middle branch / update PR branch, back off
//! after max(N, 1) attempts ──▶ MergeRetriesExhausted
//! ```

use std::fmt;

use tracing::{info, warn};

use crate::core::config::PullRequestSettings;
use crate::error::{ActionError, Result};
use crate::github::hosting::{BranchComparison, BranchMergeOutcome, HostingApi, MergeOutcome};
use crate::github::pull_request::MergeMethod;
use crate::github::retry::RetryPolicy;

/// How the pull request was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestAction {
    Created,
    /// An open PR existed and its middle branch received new commits
    Updated,
    /// An open PR existed and nothing changed
    Found,
}

impl PullRequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestAction::Created => "created",
            PullRequestAction::Updated => "updated",
            PullRequestAction::Found => "found",
        }
    }
}

impl fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A promotion pull request and what happened to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedPullRequest {
    pub number: u64,
    pub html_url: String,
    /// Head commit of the PR while open; the merge commit once `merged`
    ///
    /// A PR found already merged reports GitHub's `merge_commit_sha`, falling
    /// back to its head only when GitHub does not provide one.
    pub head_sha: String,
    pub action: PullRequestAction,
    pub created: bool,
    pub merged: bool,
    /// Middle branch used as PR head, if any
    pub middle_branch: Option<String>,
}

/// Outcome of a single merge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Merged,
    Conflict,
    RateLimited,
    TransientError,
}

/// One pass through the merge loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeAttempt {
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    pub middle_branch_used: bool,
}

/// Creates promotion pull requests and merges them
pub struct PullRequestService<'a, H: HostingApi> {
    hosting: &'a H,
    settings: PullRequestSettings,
    retry: RetryPolicy,
    method: MergeMethod,
    attempts: Vec<MergeAttempt>,
}

impl<'a, H: HostingApi> PullRequestService<'a, H> {
    pub fn new(
        hosting: &'a H,
        settings: PullRequestSettings,
        retry: RetryPolicy,
        method: MergeMethod,
    ) -> Self {
        Self {
            hosting,
            settings,
            retry,
            method,
            attempts: Vec::new(),
        }
    }

    /// Attempts made by the last merge loop
    pub fn attempts(&self) -> &[MergeAttempt] {
        &self.attempts
    }

    /// Open (or find) the pull request promoting `source` into `target`
    pub async fn create_pull_request(
        &self,
        source: &str,
        target: &str,
        require_middle_branch: bool,
    ) -> Result<PromotedPullRequest> {
        if source == target {
            return Err(ActionError::InvalidInput(format!(
                "source and target branch are both '{}'",
                source
            )));
        }

        let (head, middle_branch, changed) = if require_middle_branch {
            let middle = self.settings.middle_branch(source, target);
            if middle == source || middle == target {
                return Err(ActionError::InvalidInput(format!(
                    "middle branch name '{}' collides with source or target",
                    middle
                )));
            }
            let changed = self.sync_middle_branch(&middle, source, target).await?;
            (middle.clone(), Some(middle), changed)
        } else {
            if self.hosting.branch_sha(source).await?.is_none() {
                return Err(ActionError::BranchNotFound(source.to_string()));
            }
            (source.to_string(), None, false)
        };

        if let Some(existing) = self.hosting.find_open_pull(&head, target).await? {
            let (action, head_sha) = if changed {
                let refreshed = self.hosting.get_pull(existing.number).await?;
                (PullRequestAction::Updated, refreshed.head_sha)
            } else {
                (PullRequestAction::Found, existing.head_sha)
            };
            info!(number = existing.number, %action, "using open pull request {}", existing.html_url);
            return Ok(PromotedPullRequest {
                number: existing.number,
                html_url: existing.html_url,
                head_sha,
                action,
                created: false,
                merged: false,
                middle_branch,
            });
        }

        let pr = self
            .hosting
            .create_pull(
                &head,
                target,
                &self.settings.title(source, target),
                &self.settings.body(source, target),
            )
            .await?;
        info!(number = pr.number, "created pull request {}", pr.html_url);

        Ok(PromotedPullRequest {
            number: pr.number,
            html_url: pr.html_url,
            head_sha: pr.head_sha,
            action: PullRequestAction::Created,
            created: true,
            merged: false,
            middle_branch,
        })
    }

    /// Bring `middle` up to date with `target`, then merge `source` into it
    ///
    /// Returns whether the middle branch moved.
    pub async fn sync_middle_branch(&self, middle: &str, source: &str, target: &str) -> Result<bool> {
        let target_sha = self
            .hosting
            .branch_sha(target)
            .await?
            .ok_or_else(|| ActionError::BranchNotFound(target.to_string()))?;
        if self.hosting.branch_sha(source).await?.is_none() {
            return Err(ActionError::BranchNotFound(source.to_string()));
        }

        let mut changed = match self.hosting.branch_sha(middle).await? {
            None => {
                info!("Creating middle branch {} from {}", middle, target);
                self.hosting.create_branch(middle, &target_sha).await?;
                true
            }
            Some(_) => self.catch_up_with_target(middle, target, &target_sha).await?,
        };

        changed |= self.merge_into(middle, source).await?;
        Ok(changed)
    }

    /// Fast-forward `middle` to `target` when behind, merge `target` in when diverged
    async fn catch_up_with_target(&self, middle: &str, target: &str, target_sha: &str) -> Result<bool> {
        match self.hosting.compare(target, middle).await? {
            BranchComparison::Behind => {
                info!("Fast-forwarding {} to {} ({})", middle, target, target_sha);
                self.hosting.fast_forward_branch(middle, target_sha).await?;
                Ok(true)
            }
            BranchComparison::Diverged => self.merge_into(middle, target).await,
            BranchComparison::Ahead | BranchComparison::Identical => Ok(false),
        }
    }

    /// Bring the middle branch level with a target that moved since the last attempt
    async fn refresh_middle_branch(&self, middle: &str, target: &str) -> Result<()> {
        let target_sha = self
            .hosting
            .branch_sha(target)
            .await?
            .ok_or_else(|| ActionError::BranchNotFound(target.to_string()))?;
        match self.catch_up_with_target(middle, target, &target_sha).await {
            Ok(_) => Ok(()),
            Err(ActionError::MergeConflict(message)) | Err(ActionError::TransientRemote(message)) => {
                warn!("Could not bring {} up to date with {}: {}", middle, target, message);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn merge_into(&self, base: &str, head: &str) -> Result<bool> {
        let message = format!("Merge {} into {}", head, base);
        match self.hosting.merge_branches(base, head, &message).await? {
            BranchMergeOutcome::Merged(sha) => {
                info!("Merged {} into {} ({})", head, base, sha);
                Ok(true)
            }
            BranchMergeOutcome::UpToDate => Ok(false),
            BranchMergeOutcome::Conflict => Err(ActionError::MergeConflict(format!(
                "{} cannot be merged into {}",
                head, base
            ))),
        }
    }

    /// Merge `pr`, retrying transient refusals and resolving conflicts
    pub async fn merge_pull_request_with_retries(
        &mut self,
        pr: &PromotedPullRequest,
        source: &str,
        target: &str,
    ) -> Result<PromotedPullRequest> {
        self.attempts.clear();
        let middle_branch_used = pr.middle_branch.is_some();

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                if let Some(middle) = &pr.middle_branch {
                    self.refresh_middle_branch(middle, target).await?;
                }
            }

            let current = match self.hosting.get_pull(pr.number).await {
                Ok(current) => current,
                Err(ActionError::TransientRemote(message)) => {
                    self.record(attempt, AttemptOutcome::RateLimited, middle_branch_used, &message);
                    self.back_off(attempt).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if current.merged {
                info!(number = pr.number, "pull request is already merged");
                return Ok(PromotedPullRequest {
                    head_sha: current.merge_commit_sha.unwrap_or(current.head_sha),
                    merged: true,
                    ..pr.clone()
                });
            }

            let outcome = match self
                .hosting
                .merge_pull(pr.number, self.method, Some(&current.head_sha))
                .await
            {
                Ok(outcome) => outcome,
                Err(ActionError::TransientRemote(message)) => MergeOutcome::Transient(message),
                Err(e) => return Err(e),
            };

            match outcome {
                MergeOutcome::Merged { sha } => {
                    self.record(attempt, AttemptOutcome::Merged, middle_branch_used, &sha);
                    return Ok(PromotedPullRequest {
                        head_sha: sha,
                        merged: true,
                        ..pr.clone()
                    });
                }
                MergeOutcome::Transient(message) => {
                    let kind = if message.to_ascii_lowercase().contains("rate limit") {
                        AttemptOutcome::RateLimited
                    } else {
                        AttemptOutcome::TransientError
                    };
                    self.record(attempt, kind, middle_branch_used, &message);
                }
                MergeOutcome::Conflict(message) => {
                    self.record(attempt, AttemptOutcome::Conflict, middle_branch_used, &message);
                    self.resolve_conflict(pr, &current.head_sha, source, target)
                        .await?;
                }
            }

            self.back_off(attempt).await;
        }

        Err(ActionError::MergeRetriesExhausted {
            pr_number: pr.number,
            attempts: self.retry.max_attempts,
        })
    }

    async fn resolve_conflict(
        &self,
        pr: &PromotedPullRequest,
        head_sha: &str,
        source: &str,
        target: &str,
    ) -> Result<()> {
        match &pr.middle_branch {
            Some(middle) => match self.sync_middle_branch(middle, source, target).await {
                Ok(_) => Ok(()),
                Err(ActionError::MergeConflict(message)) | Err(ActionError::TransientRemote(message)) => {
                    warn!("Could not resynchronize {}: {}", middle, message);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            None => {
                if let Err(e) = self.hosting.update_pull_branch(pr.number, head_sha).await {
                    warn!("Could not update pull request #{} from {}: {}", pr.number, target, e);
                }
                Ok(())
            }
        }
    }

    fn record(&mut self, attempt: u32, outcome: AttemptOutcome, middle_branch_used: bool, detail: &str) {
        let entry = MergeAttempt {
            attempt_number: attempt,
            outcome,
            middle_branch_used,
        };
        match outcome {
            AttemptOutcome::Merged => info!(
                attempt = entry.attempt_number,
                middle_branch_used, "merge attempt succeeded: {}", detail
            ),
            _ => warn!(
                attempt = entry.attempt_number,
                max_attempts = self.retry.max_attempts,
                outcome = ?entry.outcome,
                middle_branch_used,
                "merge attempt failed: {}",
                detail
            ),
        }
        self.attempts.push(entry);
    }

    async fn back_off(&self, attempt: u32) {
        if self.retry.has_next(attempt) {
            let delay = self.retry.delay_after(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::hosting::PullRequestInfo;
    use std::cell::RefCell;
    use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

    /// In-memory GitHub: commits are identified by their ancestry sets
    #[derive(Default)]
    struct State {
        ancestry: HashMap<String, BTreeSet<String>>,
        branches: HashMap<String, String>,
        pulls: Vec<(PullRequestInfo, bool)>,
        merge_script: VecDeque<MergeOutcome>,
        /// Commit pushed to a branch right after the next scripted merge outcome
        advance_after_script: Option<(String, String)>,
        branch_conflicts: HashSet<(String, String)>,
        merge_calls: u32,
        fast_forwards: Vec<(String, String)>,
        next_commit: u32,
    }

    #[derive(Default)]
    struct FakeHosting {
        state: RefCell<State>,
    }

    impl FakeHosting {
        /// `history` lists commits oldest first, separated by spaces
        fn with_branches(branches: &[(&str, &str)]) -> Self {
            let fake = FakeHosting::default();
            for (name, history) in branches {
                let mut state = fake.state.borrow_mut();
                let mut seen = BTreeSet::new();
                for commit in history.split_whitespace() {
                    seen.insert(commit.to_string());
                    state.ancestry.insert(commit.to_string(), seen.clone());
                }
                let tip = history.split_whitespace().last().unwrap().to_string();
                state.branches.insert(name.to_string(), tip);
            }
            fake
        }

        fn history(&self, branch: &str) -> BTreeSet<String> {
            let state = self.state.borrow();
            state.ancestry[&state.branches[branch]].clone()
        }

        fn commit_on(&self, branch: &str, commit: &str) {
            let mut state = self.state.borrow_mut();
            let mut history = state.ancestry[&state.branches[branch]].clone();
            history.insert(commit.to_string());
            state.ancestry.insert(commit.to_string(), history);
            state.branches.insert(branch.to_string(), commit.to_string());
        }

        fn head_sha(state: &State, branch: &str) -> String {
            state.branches.get(branch).cloned().unwrap_or_default()
        }
    }

    impl HostingApi for FakeHosting {
        async fn find_open_pull(&self, head: &str, base: &str) -> Result<Option<PullRequestInfo>> {
            let state = self.state.borrow();
            Ok(state
                .pulls
                .iter()
                .find(|(pr, _)| pr.head_ref == head && pr.base_ref == base && !pr.merged)
                .map(|(pr, _)| PullRequestInfo {
                    head_sha: Self::head_sha(&state, head),
                    ..pr.clone()
                }))
        }

        async fn create_pull(&self, head: &str, base: &str, _title: &str, _body: &str) -> Result<PullRequestInfo> {
            let mut state = self.state.borrow_mut();
            let number = state.pulls.len() as u64 + 1;
            let pr = PullRequestInfo {
                number,
                html_url: format!("https://github.com/o/r/pull/{}", number),
                head_ref: head.to_string(),
                base_ref: base.to_string(),
                head_sha: Self::head_sha(&state, head),
                merged: false,
                merge_commit_sha: None,
            };
            state.pulls.push((pr.clone(), false));
            Ok(pr)
        }

        async fn get_pull(&self, number: u64) -> Result<PullRequestInfo> {
            let state = self.state.borrow();
            let (pr, _) = &state.pulls[number as usize - 1];
            Ok(PullRequestInfo {
                head_sha: Self::head_sha(&state, &pr.head_ref),
                ..pr.clone()
            })
        }

        async fn merge_pull(&self, number: u64, _method: MergeMethod, _sha: Option<&str>) -> Result<MergeOutcome> {
            self.state.borrow_mut().merge_calls += 1;
            let scripted = self.state.borrow_mut().merge_script.pop_front();
            if let Some(outcome) = scripted {
                let advance = self.state.borrow_mut().advance_after_script.take();
                if let Some((branch, commit)) = advance {
                    self.commit_on(&branch, &commit);
                }
                return Ok(outcome);
            }

            let (head, base) = {
                let state = self.state.borrow();
                let (pr, _) = &state.pulls[number as usize - 1];
                (pr.head_ref.clone(), pr.base_ref.clone())
            };
            let outcome = self.merge_branches(&base, &head, "merge pr").await?;
            let BranchMergeOutcome::Merged(sha) = outcome else {
                return Ok(MergeOutcome::Conflict("not mergeable".to_string()));
            };
            let mut state = self.state.borrow_mut();
            let pr = &mut state.pulls[number as usize - 1].0;
            pr.merged = true;
            pr.merge_commit_sha = Some(sha.clone());
            Ok(MergeOutcome::Merged { sha })
        }

        async fn update_pull_branch(&self, number: u64, _expected_head_sha: &str) -> Result<()> {
            let (head, base) = {
                let state = self.state.borrow();
                let (pr, _) = &state.pulls[number as usize - 1];
                (pr.head_ref.clone(), pr.base_ref.clone())
            };
            self.state.borrow_mut().pulls[number as usize - 1].1 = true;
            self.merge_branches(&head, &base, "update").await.map(|_| ())
        }

        async fn branch_sha(&self, branch: &str) -> Result<Option<String>> {
            Ok(self.state.borrow().branches.get(branch).cloned())
        }

        async fn create_branch(&self, branch: &str, sha: &str) -> Result<()> {
            self.state
                .borrow_mut()
                .branches
                .insert(branch.to_string(), sha.to_string());
            Ok(())
        }

        async fn fast_forward_branch(&self, branch: &str, sha: &str) -> Result<()> {
            let mut state = self.state.borrow_mut();
            let current = &state.ancestry[&state.branches[branch]];
            if !current.is_subset(&state.ancestry[sha]) {
                return Err(ActionError::GitHubApi("Update is not a fast forward".to_string()));
            }
            state.branches.insert(branch.to_string(), sha.to_string());
            state.fast_forwards.push((branch.to_string(), sha.to_string()));
            Ok(())
        }

        async fn compare(&self, base: &str, head: &str) -> Result<BranchComparison> {
            let base = self.history(base);
            let head = self.history(head);
            Ok(if base == head {
                BranchComparison::Identical
            } else if head.is_subset(&base) {
                BranchComparison::Behind
            } else if base.is_subset(&head) {
                BranchComparison::Ahead
            } else {
                BranchComparison::Diverged
            })
        }

        async fn merge_branches(&self, base: &str, head: &str, _message: &str) -> Result<BranchMergeOutcome> {
            let base_history = self.history(base);
            let head_history = self.history(head);
            if head_history.is_subset(&base_history) {
                return Ok(BranchMergeOutcome::UpToDate);
            }
            let mut state = self.state.borrow_mut();
            if state
                .branch_conflicts
                .contains(&(base.to_string(), head.to_string()))
            {
                return Ok(BranchMergeOutcome::Conflict);
            }
            state.next_commit += 1;
            let sha = format!("merge{}", state.next_commit);
            let mut merged: BTreeSet<String> = base_history.union(&head_history).cloned().collect();
            merged.insert(sha.clone());
            state.ancestry.insert(sha.clone(), merged);
            state.branches.insert(base.to_string(), sha.clone());
            Ok(BranchMergeOutcome::Merged(sha))
        }
    }

    fn service(hosting: &FakeHosting, max_retries: u32) -> PullRequestService<'_, FakeHosting> {
        PullRequestService::new(
            hosting,
            PullRequestSettings::default(),
            RetryPolicy::immediate(max_retries),
            MergeMethod::Merge,
        )
    }

    fn feature_and_main() -> FakeHosting {
        FakeHosting::with_branches(&[("main", "m1"), ("feature", "m1 f1")])
    }

    #[tokio::test]
    async fn test_direct_pull_request_is_created() {
        let hosting = feature_and_main();
        let pr = service(&hosting, 3)
            .create_pull_request("feature", "main", false)
            .await
            .unwrap();

        assert_eq!(pr.action, PullRequestAction::Created);
        assert!(pr.created);
        assert_eq!(pr.middle_branch, None);
        assert_eq!(pr.head_sha, "f1");
        assert!(!hosting.state.borrow().branches.contains_key("feature-via-main"));
    }

    #[tokio::test]
    async fn test_middle_branch_is_created_and_used_as_head() {
        let hosting = feature_and_main();
        let pr = service(&hosting, 3)
            .create_pull_request("feature", "main", true)
            .await
            .unwrap();

        assert_eq!(pr.action, PullRequestAction::Created);
        assert_eq!(pr.middle_branch.as_deref(), Some("feature-via-main"));
        let pulls = &hosting.state.borrow().pulls;
        assert_eq!(pulls[0].0.head_ref, "feature-via-main");
        assert!(hosting.history("feature-via-main").contains("f1"));
    }

    #[tokio::test]
    async fn test_existing_pull_request_found_then_updated() {
        let hosting = feature_and_main();
        let svc = service(&hosting, 3);
        svc.create_pull_request("feature", "main", true).await.unwrap();

        let again = svc.create_pull_request("feature", "main", true).await.unwrap();
        assert_eq!(again.action, PullRequestAction::Found);
        assert!(!again.created);

        hosting.commit_on("feature", "f2");
        let updated = svc.create_pull_request("feature", "main", true).await.unwrap();
        assert_eq!(updated.action, PullRequestAction::Updated);
        assert_eq!(updated.number, again.number);
        assert_ne!(updated.head_sha, again.head_sha);
    }

    #[tokio::test]
    async fn test_already_merged_returns_without_merge_calls() {
        let hosting = feature_and_main();
        let mut svc = service(&hosting, 3);
        let pr = svc.create_pull_request("feature", "main", false).await.unwrap();
        {
            let mut state = hosting.state.borrow_mut();
            let merged_pr = &mut state.pulls[0].0;
            merged_pr.merged = true;
            merged_pr.merge_commit_sha = Some("merge-by-someone-else".to_string());
        }

        let merged = svc
            .merge_pull_request_with_retries(&pr, "feature", "main")
            .await
            .unwrap();
        assert!(merged.merged);
        assert_eq!(merged.head_sha, "merge-by-someone-else");
        assert_eq!(hosting.state.borrow().merge_calls, 0);
        assert!(svc.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_conflict_exhausts_exactly_n_attempts() {
        for (max_retries, expected) in [(3u32, 3u32), (1, 1), (0, 1)] {
            let hosting = feature_and_main();
            hosting.state.borrow_mut().merge_script =
                (0..10).map(|_| MergeOutcome::Conflict("not mergeable".into())).collect();
            let mut svc = service(&hosting, max_retries);
            let pr = svc.create_pull_request("feature", "main", false).await.unwrap();

            let err = svc
                .merge_pull_request_with_retries(&pr, "feature", "main")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ActionError::MergeRetriesExhausted { pr_number: 1, attempts } if attempts == expected
            ));
            assert_eq!(hosting.state.borrow().merge_calls, expected);
            assert_eq!(svc.attempts().len(), expected as usize);
            assert!(svc
                .attempts()
                .iter()
                .all(|a| a.outcome == AttemptOutcome::Conflict && !a.middle_branch_used));
            // without a middle branch the host is asked to update the PR branch
            assert!(hosting.state.borrow().pulls[0].1);
        }
    }

    #[tokio::test]
    async fn test_transient_then_merged() {
        let hosting = feature_and_main();
        hosting.state.borrow_mut().merge_script = VecDeque::from(vec![
            MergeOutcome::Transient("API rate limit exceeded (403)".into()),
            MergeOutcome::Transient("Head branch was modified (409)".into()),
        ]);
        let mut svc = service(&hosting, 5);
        let pr = svc.create_pull_request("feature", "main", false).await.unwrap();

        let merged = svc
            .merge_pull_request_with_retries(&pr, "feature", "main")
            .await
            .unwrap();
        assert!(merged.merged);
        assert_eq!(merged.head_sha, hosting.state.borrow().branches["main"]);
        let outcomes: Vec<_> = svc.attempts().iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::RateLimited,
                AttemptOutcome::TransientError,
                AttemptOutcome::Merged
            ]
        );
    }

    #[tokio::test]
    async fn test_conflict_resyncs_middle_branch_with_advanced_target() {
        let hosting = feature_and_main();
        {
            let mut state = hosting.state.borrow_mut();
            state.merge_script = VecDeque::from(vec![MergeOutcome::Conflict("not mergeable".into())]);
            state.advance_after_script = Some(("main".to_string(), "m2".to_string()));
        }
        let mut svc = service(&hosting, 3);
        let pr = svc.create_pull_request("feature", "main", true).await.unwrap();

        let merged = svc
            .merge_pull_request_with_retries(&pr, "feature", "main")
            .await
            .unwrap();
        assert!(merged.merged);
        assert_eq!(svc.attempts().len(), 2);
        assert!(svc.attempts()[0].middle_branch_used);

        let middle = hosting.history("feature-via-main");
        assert!(middle.contains("m2") && middle.contains("f1"));
        assert!(hosting.history("main").contains("f1"));
    }

    #[tokio::test]
    async fn test_transient_then_target_advances_refreshes_middle_branch() {
        let hosting = feature_and_main();
        {
            let mut state = hosting.state.borrow_mut();
            state.merge_script =
                VecDeque::from(vec![MergeOutcome::Transient("Head branch was modified (409)".into())]);
            state.advance_after_script = Some(("main".to_string(), "m2".to_string()));
        }
        let mut svc = service(&hosting, 3);
        let pr = svc.create_pull_request("feature", "main", true).await.unwrap();

        let merged = svc
            .merge_pull_request_with_retries(&pr, "feature", "main")
            .await
            .unwrap();
        assert!(merged.merged);
        let outcomes: Vec<_> = svc.attempts().iter().map(|a| a.outcome).collect();
        assert_eq!(outcomes, vec![AttemptOutcome::TransientError, AttemptOutcome::Merged]);

        let middle = hosting.history("feature-via-main");
        assert!(middle.contains("m2") && middle.contains("f1"));
        assert!(hosting.history("main").contains("f1"));
    }

    #[tokio::test]
    async fn test_middle_branch_fast_forwarded_when_behind_between_attempts() {
        // middle branch created from main, source already contained in it
        let hosting = FakeHosting::with_branches(&[("main", "m1"), ("feature", "m1")]);
        {
            let mut state = hosting.state.borrow_mut();
            state.merge_script = VecDeque::from(vec![
                MergeOutcome::Transient("API rate limit exceeded (403)".into()),
                MergeOutcome::Merged { sha: "merge-pr".into() },
            ]);
            state.advance_after_script = Some(("main".to_string(), "m2".to_string()));
        }
        let mut svc = service(&hosting, 3);
        let pr = svc.create_pull_request("feature", "main", true).await.unwrap();

        let merged = svc
            .merge_pull_request_with_retries(&pr, "feature", "main")
            .await
            .unwrap();
        assert_eq!(merged.head_sha, "merge-pr");
        assert_eq!(
            hosting.state.borrow().fast_forwards,
            vec![("feature-via-main".to_string(), "m2".to_string())]
        );
        assert_eq!(svc.attempts()[0].outcome, AttemptOutcome::RateLimited);
    }

    #[tokio::test]
    async fn test_permanent_conflict_with_middle_branch_exhausts_exactly_n_attempts() {
        for (max_retries, expected) in [(3u32, 3u32), (1, 1), (0, 1)] {
            let hosting = feature_and_main();
            hosting.state.borrow_mut().merge_script =
                (0..10).map(|_| MergeOutcome::Conflict("not mergeable".into())).collect();
            let mut svc = service(&hosting, max_retries);
            let pr = svc.create_pull_request("feature", "main", true).await.unwrap();

            let err = svc
                .merge_pull_request_with_retries(&pr, "feature", "main")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ActionError::MergeRetriesExhausted { pr_number: 1, attempts } if attempts == expected
            ));
            assert_eq!(hosting.state.borrow().merge_calls, expected);
            assert!(svc
                .attempts()
                .iter()
                .all(|a| a.outcome == AttemptOutcome::Conflict && a.middle_branch_used));
            // the middle branch is never rewritten, only the PR head moves forward
            assert!(hosting.history("feature-via-main").contains("f1"));
            assert!(!hosting.state.borrow().pulls[0].1);
        }
    }

    #[tokio::test]
    async fn test_middle_branch_behind_target_is_fast_forwarded() {
        let hosting = FakeHosting::with_branches(&[
            ("main", "m1 m2"),
            ("feature", "m1 f1"),
            ("feature-via-main", "m1"),
        ]);
        let svc = service(&hosting, 1);

        let changed = svc
            .sync_middle_branch("feature-via-main", "feature", "main")
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(
            hosting.state.borrow().fast_forwards,
            vec![("feature-via-main".to_string(), "m2".to_string())]
        );
        let middle = hosting.history("feature-via-main");
        assert!(middle.contains("m2") && middle.contains("f1"));
    }

    #[tokio::test]
    async fn test_middle_branch_conflict_with_source_is_reported() {
        let hosting = feature_and_main();
        hosting
            .state
            .borrow_mut()
            .branch_conflicts
            .insert(("feature-via-main".to_string(), "feature".to_string()));

        let err = service(&hosting, 1)
            .create_pull_request("feature", "main", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::MergeConflict(_)));
    }

    #[tokio::test]
    async fn test_missing_source_branch() {
        let hosting = FakeHosting::with_branches(&[("main", "m1")]);
        let err = service(&hosting, 1)
            .create_pull_request("feature", "main", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::BranchNotFound(b) if b == "feature"));
    }

    #[tokio::test]
    async fn test_same_source_and_target_rejected() {
        let hosting = feature_and_main();
        assert!(matches!(
            service(&hosting, 1).create_pull_request("main", "main", false).await,
            Err(ActionError::InvalidInput(_))
        ));
    }
}
