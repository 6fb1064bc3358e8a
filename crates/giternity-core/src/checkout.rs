use crate::cancel::CancelToken;
use crate::model::{ActionResult, MirrorKey, PlannedAction};
use crate::paths::checkout_path;
use anyhow::Context;
use git2::{FetchOptions, Oid, Repository, StatusOptions, build::CheckoutBuilder, build::RepoBuilder};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Cloned,
    FastForwarded,
    UpToDate,
    Dirty,
    Diverged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResult {
    pub key: MirrorKey,
    pub path: PathBuf,
    pub outcome: Option<CheckoutOutcome>,
    pub error: Option<String>,
}

/// Refreshes the working-tree checkout of every key whose transfer completed
/// this run. Each key is independent.
pub fn sync_checkouts(
    plan: &[PlannedAction],
    results: &[ActionResult],
    checkout_root: &Path,
    cancel: &CancelToken,
) -> Vec<CheckoutResult> {
    let mut checkouts = Vec::new();
    for (action, result) in plan.iter().zip(results) {
        if !result.transferred {
            continue;
        }
        if cancel.is_cancelled() {
            debug!("run cancelled; skipping remaining checkouts");
            break;
        }
        let path = checkout_path(checkout_root, &action.key);
        match sync_checkout(&action.target_path, &path) {
            Ok(outcome) => {
                debug!(key = %action.key, outcome = ?outcome, "checkout synced");
                checkouts.push(CheckoutResult {
                    key: action.key.clone(),
                    path,
                    outcome: Some(outcome),
                    error: None,
                });
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(key = %action.key, path = %path.display(), error = %message, "checkout failed");
                checkouts.push(CheckoutResult {
                    key: action.key.clone(),
                    path,
                    outcome: None,
                    error: Some(message),
                });
            }
        }
    }
    checkouts
}

/// Clones `mirror` into `checkout`, or fetches and fast-forwards an existing
/// clean checkout onto the branch the mirror's `HEAD` names.
pub fn sync_checkout(mirror: &Path, checkout: &Path) -> anyhow::Result<CheckoutOutcome> {
    let source = mirror
        .to_str()
        .with_context(|| format!("mirror path {} is not valid UTF-8", mirror.display()))?;
    if !checkout.exists() {
        if let Some(parent) = checkout.parent() {
            fs::create_dir_all(parent).context("create checkout directory")?;
        }
        info!(path = %checkout.display(), "cloning checkout");
        RepoBuilder::new()
            .fetch_options(FetchOptions::new())
            .clone(source, checkout)
            .context("clone checkout")?;
        return Ok(CheckoutOutcome::Cloned);
    }

    let repo = Repository::open(checkout).context("open checkout")?;
    if !is_working_tree_clean(&repo)? {
        warn!(path = %checkout.display(), "working tree dirty; skipping checkout");
        return Ok(CheckoutOutcome::Dirty);
    }

    ensure_origin_remote(&repo, source)?;
    fetch_origin(&repo)?;
    let Some(branch) = mirror_head_branch(mirror)? else {
        debug!(path = %mirror.display(), "mirror has no HEAD branch");
        return Ok(CheckoutOutcome::UpToDate);
    };
    fast_forward_branch(&repo, &branch)
}

fn mirror_head_branch(mirror: &Path) -> anyhow::Result<Option<String>> {
    let repo = Repository::open_bare(mirror).context("open mirror")?;
    let head = repo.find_reference("HEAD").context("read mirror HEAD")?;
    Ok(head
        .symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .map(str::to_string))
}

fn is_working_tree_clean(repo: &Repository) -> anyhow::Result<bool> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut options)).context("status checkout")?;
    Ok(statuses.is_empty())
}

fn ensure_origin_remote(repo: &Repository, remote_url: &str) -> anyhow::Result<()> {
    match repo.find_remote("origin") {
        Ok(remote) => {
            if remote.url() != Some(remote_url) {
                repo.remote_set_url("origin", remote_url)
                    .context("update origin remote url")?;
            }
        }
        Err(_) => {
            repo.remote("origin", remote_url)
                .context("create origin remote")?;
        }
    }
    Ok(())
}

fn fetch_origin(repo: &Repository) -> anyhow::Result<()> {
    let mut remote = repo.find_remote("origin").context("find origin remote")?;
    let mut fo = FetchOptions::new();
    fo.prune(git2::FetchPrune::On);
    remote
        .fetch(&[] as &[&str], Some(&mut fo), None)
        .context("fetch origin")?;
    Ok(())
}

fn fast_forward_branch(repo: &Repository, branch: &str) -> anyhow::Result<CheckoutOutcome> {
    let local_ref = format!("refs/heads/{branch}");
    let remote_ref = format!("refs/remotes/origin/{branch}");

    let remote_oid = match repo.refname_to_id(&remote_ref) {
        Ok(oid) => oid,
        Err(_) => {
            warn!(remote_ref = %remote_ref, "branch missing on mirror; skipping");
            return Ok(CheckoutOutcome::Diverged);
        }
    };

    let local_oid = match repo.refname_to_id(&local_ref) {
        Ok(oid) => oid,
        Err(_) => {
            debug!(branch = %branch, "branch missing locally; creating it");
            create_local_branch(repo, branch, remote_oid)?;
            return Ok(CheckoutOutcome::FastForwarded);
        }
    };

    let (ahead, behind) = repo
        .graph_ahead_behind(local_oid, remote_oid)
        .context("compare local and mirror")?;
    if ahead > 0 {
        warn!(branch = %branch, ahead, behind, "checkout has local commits; skipping");
        return Ok(CheckoutOutcome::Diverged);
    }
    if behind == 0 {
        return Ok(CheckoutOutcome::UpToDate);
    }

    let mut reference = repo
        .find_reference(&local_ref)
        .with_context(|| format!("find local ref {local_ref}"))?;
    reference
        .set_target(remote_oid, "fast-forward")
        .context("set local ref target")?;
    if is_head_on(repo, branch) {
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        repo.checkout_head(Some(&mut checkout))
            .context("checkout head")?;
    }
    Ok(CheckoutOutcome::FastForwarded)
}

fn create_local_branch(repo: &Repository, branch: &str, target: Oid) -> anyhow::Result<()> {
    let commit = repo.find_commit(target).context("find mirror commit")?;
    repo.branch(branch, &commit, false)
        .context("create local branch")?;
    Ok(())
}

fn is_head_on(repo: &Repository, branch: &str) -> bool {
    repo.head()
        .map(|head| head.is_branch() && head.shorthand() == Some(branch))
        .unwrap_or(false)
}
