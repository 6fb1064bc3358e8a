use crate::error::ConfigurationError;
use crate::model::{ActionKind, LocalEntry, MirrorKey, PlannedAction, SourceSpec};
use crate::paths::mirror_path;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct PlanOptions {
    pub report_orphans: bool,
    /// Lowercased owners whose listing failed this run. Their directories are
    /// left out of the plan instead of being reported as orphans.
    pub unresolved_owners: BTreeSet<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            report_orphans: true,
            unresolved_owners: BTreeSet::new(),
        }
    }
}

/// Diffs resolved sources against the inspected mirror root.
///
/// Sources come first in input order (Create, Update or Conflict), then
/// unclaimed directories as Orphans in key order. The same inputs always give
/// the same plan.
pub fn build_plan(
    sources: &[SourceSpec],
    state: &[LocalEntry],
    root: &Path,
    suffix: &str,
    options: &PlanOptions,
) -> Result<Vec<PlannedAction>, ConfigurationError> {
    check_unique_keys(sources)?;

    let by_path: HashMap<&Path, &LocalEntry> = state
        .iter()
        .map(|entry| (entry.path.as_path(), entry))
        .collect();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut planned_keys: HashSet<String> = HashSet::new();
    let mut plan = Vec::with_capacity(sources.len());

    for source in sources {
        let key = source.key();
        let target_path = mirror_path(root, &key, suffix);
        let kind = match by_path.get(target_path.as_path()) {
            Some(entry) if entry.is_valid_mirror => ActionKind::Update,
            Some(_) => ActionKind::Conflict,
            None => ActionKind::Create,
        };
        claimed.insert(target_path.clone());
        planned_keys.insert(key.as_str().to_ascii_lowercase());
        plan.push(PlannedAction {
            key,
            kind,
            target_path,
            clone_url: Some(source.clone_url.clone()),
            description: source.description.clone(),
            homepage: source.homepage.clone(),
        });
    }

    if options.report_orphans {
        for entry in state {
            if claimed.contains(&entry.path) {
                continue;
            }
            if options
                .unresolved_owners
                .contains(&entry.key.owner().to_ascii_lowercase())
            {
                continue;
            }
            let key = orphan_key(entry);
            if !planned_keys.insert(key.as_str().to_ascii_lowercase()) {
                warn!(
                    key = %key,
                    path = %entry.path.display(),
                    "directory shadows a planned mirror key; leaving it out of the plan"
                );
                continue;
            }
            plan.push(PlannedAction {
                key,
                kind: ActionKind::Orphan,
                target_path: entry.path.clone(),
                clone_url: None,
                description: None,
                homepage: None,
            });
        }
    }

    Ok(plan)
}

/// Orphans keep the raw directory name, suffix included.
fn orphan_key(entry: &LocalEntry) -> MirrorKey {
    match entry.path.file_name().and_then(|name| name.to_str()) {
        Some(dir_name) => MirrorKey::new(entry.key.owner(), dir_name),
        None => entry.key.clone(),
    }
}

/// Owner and repository names are case-insensitive on the remote, so keys
/// that differ only in case collide.
fn check_unique_keys(sources: &[SourceSpec]) -> Result<(), ConfigurationError> {
    let mut seen: HashMap<String, &SourceSpec> = HashMap::new();
    for source in sources {
        let key = source.key();
        let folded = key.as_str().to_ascii_lowercase();
        if let Some(first) = seen.get(&folded) {
            return Err(ConfigurationError::DuplicateKey {
                key,
                first: describe_source(first),
                second: describe_source(source),
            });
        }
        seen.insert(folded, source);
    }
    Ok(())
}

fn describe_source(source: &SourceSpec) -> String {
    format!("{} ({})", source.clone_url, source.kind)
}
