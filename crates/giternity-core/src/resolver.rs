use crate::config::{MirrorConfig, RepoEntry, SourceEntry};
use crate::error::{ConfigurationError, ResolutionError};
use crate::model::{SourceKind, SourceSpec};
use crate::provider::RepoLister;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["https", "http", "ssh", "git", "file"];

#[derive(Debug, Default)]
pub struct Resolution {
    pub sources: Vec<SourceSpec>,
    pub failures: Vec<ResolutionError>,
}

impl Resolution {
    /// Lowercased names of owners whose listing failed.
    pub fn unresolved_owners(&self) -> BTreeSet<String> {
        self.failures
            .iter()
            .map(|failure| failure.owner.to_ascii_lowercase())
            .collect()
    }
}

/// Expands the configured sources into concrete repositories.
///
/// Single repositories are validated before any remote call, so a malformed
/// entry fails the run without touching the network. Owner listing failures
/// are collected per owner and never stop the siblings.
pub async fn resolve_sources(
    config: &MirrorConfig,
    lister: &dyn RepoLister,
) -> Result<Resolution, ConfigurationError> {
    for entry in &config.sources {
        if let SourceEntry::Repo(repo) = entry {
            validate_repo_entry(repo)?;
        }
    }

    let mut resolution = Resolution::default();
    let mut queried: HashSet<String> = HashSet::new();
    let mut seen: HashSet<(String, SourceKind, String)> = HashSet::new();

    for entry in &config.sources {
        match entry {
            SourceEntry::Owner(owner) => {
                if !queried.insert(owner.to_ascii_lowercase()) {
                    debug!(owner = %owner, "owner listed twice; already resolved");
                    continue;
                }
                match lister.list_repositories(owner).await {
                    Ok(listing) => {
                        let mut kept = 0usize;
                        for repo in listing.repos {
                            if repo.fork && !config.include_forks {
                                debug!(owner = %owner, repo = %repo.name, "skipping fork");
                                continue;
                            }
                            let repo_owner = if repo.owner.is_empty() {
                                owner.clone()
                            } else {
                                repo.owner
                            };
                            if let Err(reason) = validate_name(&repo_owner)
                                .and_then(|_| validate_name(&repo.name))
                            {
                                warn!(
                                    owner = %owner,
                                    repo = %repo.name,
                                    reason = %reason,
                                    "skipping listed repository with unusable name"
                                );
                                continue;
                            }
                            let source = SourceSpec {
                                owner: repo_owner,
                                kind: listing.kind,
                                name: repo.name,
                                clone_url: repo.clone_url,
                                description: repo.description,
                                homepage: repo.homepage,
                            };
                            if push_unique(&mut resolution.sources, &mut seen, source) {
                                kept += 1;
                            }
                        }
                        info!(owner = %owner, kind = %listing.kind, repos = kept, "resolved owner");
                    }
                    Err(source) => {
                        warn!(owner = %owner, error = %source, "owner listing failed");
                        resolution.failures.push(ResolutionError {
                            owner: owner.clone(),
                            source,
                        });
                    }
                }
            }
            SourceEntry::Repo(repo) => {
                let source = resolve_single(config, lister, repo).await;
                push_unique(&mut resolution.sources, &mut seen, source);
            }
        }
    }

    Ok(resolution)
}

async fn resolve_single(
    config: &MirrorConfig,
    lister: &dyn RepoLister,
    repo: &RepoEntry,
) -> SourceSpec {
    let mut source = SourceSpec {
        owner: repo.owner.clone(),
        kind: SourceKind::SingleRepo,
        name: repo.name.clone(),
        clone_url: repo.url.clone().unwrap_or_else(|| {
            format!("{}/{}/{}.git", config.github.web_url, repo.owner, repo.name)
        }),
        description: repo.description.clone(),
        homepage: repo.homepage.clone(),
    };
    if repo.url.is_some() {
        return source;
    }
    match lister.describe_repository(&repo.owner, &repo.name).await {
        Ok(Some(remote)) => {
            if source.description.is_none() {
                source.description = remote.description;
            }
            if source.homepage.is_none() {
                source.homepage = remote.homepage;
            }
        }
        Ok(None) => {}
        Err(err) => {
            warn!(repo = %repo.label(), error = %err, "repository metadata unavailable");
        }
    }
    source
}

fn push_unique(
    sources: &mut Vec<SourceSpec>,
    seen: &mut HashSet<(String, SourceKind, String)>,
    source: SourceSpec,
) -> bool {
    let identity = (
        source.key().to_string(),
        source.kind,
        source.clone_url.clone(),
    );
    if !seen.insert(identity) {
        debug!(key = %source.key(), "collapsing duplicate source");
        return false;
    }
    sources.push(source);
    true
}

fn validate_repo_entry(repo: &RepoEntry) -> Result<(), ConfigurationError> {
    let malformed = |reason: String| ConfigurationError::MalformedRepo {
        entry: repo.label(),
        reason,
    };
    validate_name(&repo.owner).map_err(|reason| malformed(format!("owner {reason}")))?;
    validate_name(&repo.name).map_err(|reason| malformed(format!("name {reason}")))?;
    if let Some(url) = repo.url.as_deref() {
        validate_clone_url(url).map_err(|reason| malformed(format!("url {reason}")))?;
    }
    Ok(())
}

/// An owner or repository name that is safe to use as a path component and
/// as a command argument.
pub fn validate_name(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("cannot be empty".into());
    }
    if value.contains("..") {
        return Err("cannot contain '..'".into());
    }
    if value.contains('/') || value.contains('\\') {
        return Err("cannot contain path separators".into());
    }
    if value.starts_with('-') {
        return Err("cannot start with '-'".into());
    }
    if value.chars().any(char::is_control) {
        return Err("cannot contain control characters".into());
    }
    Ok(())
}

pub fn validate_clone_url(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("cannot be empty".into());
    }
    if value.starts_with('-') {
        return Err("cannot start with '-'".into());
    }
    if value.chars().any(char::is_control) {
        return Err("cannot contain control characters".into());
    }
    if Path::new(value).is_absolute() {
        return Ok(());
    }
    match Url::parse(value) {
        Ok(url) if ALLOWED_SCHEMES.contains(&url.scheme()) => Ok(()),
        Ok(url) => Err(format!("has unsupported scheme {}", url.scheme())),
        Err(_) if is_scp_like(value) => Ok(()),
        Err(err) => Err(format!("is not a clone address: {err}")),
    }
}

/// `user@host:path`, as accepted by ssh transports.
fn is_scp_like(value: &str) -> bool {
    let Some((authority, path)) = value.split_once(':') else {
        return false;
    };
    let Some((user, host)) = authority.split_once('@') else {
        return false;
    };
    !user.is_empty() && !host.is_empty() && !authority.contains('/') && !path.is_empty()
}
