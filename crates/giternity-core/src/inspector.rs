use crate::error::InspectionError;
use crate::model::LocalEntry;
use crate::paths::key_from_dir;
use std::fs::{self, DirEntry};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Walks `root/<owner>/<name>` and classifies every directory found.
///
/// A missing root is an empty mirror set. Only an unreadable root is an
/// error; unreadable owner directories are logged and skipped.
pub fn inspect_mirror_root(root: &Path, suffix: &str) -> Result<Vec<LocalEntry>, InspectionError> {
    let owners = match fs::read_dir(root) {
        Ok(owners) => owners,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(root = %root.display(), "mirror root missing; treating as empty");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(InspectionError {
                path: root.to_path_buf(),
                source,
            });
        }
    };

    let mut entries = Vec::new();
    for owner in owners {
        let owner = match owner {
            Ok(owner) => owner,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let Some(owner_name) = visible_dir_name(&owner) else {
            continue;
        };
        let repos = match fs::read_dir(owner.path()) {
            Ok(repos) => repos,
            Err(err) => {
                warn!(
                    path = %owner.path().display(),
                    error = %err,
                    "skipping unreadable owner directory"
                );
                continue;
            }
        };
        for repo in repos {
            let repo = match repo {
                Ok(repo) => repo,
                Err(err) => {
                    warn!(owner = %owner_name, error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let Some(dir_name) = visible_dir_name(&repo) else {
                continue;
            };
            let path = repo.path();
            entries.push(LocalEntry {
                key: key_from_dir(&owner_name, &dir_name, suffix),
                is_valid_mirror: is_bare_mirror(&path),
                path,
            });
        }
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.path.cmp(&b.path)));
    debug!(root = %root.display(), entries = entries.len(), "inspected mirror root");
    Ok(entries)
}

/// Bare repository markers: `HEAD`, `objects/` and `refs/`.
pub fn is_bare_mirror(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}

fn visible_dir_name(entry: &DirEntry) -> Option<String> {
    let name = entry.file_name().into_string().ok()?;
    if name.starts_with('.') || !entry.path().is_dir() {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_bare_mirror;
    use tempfile::TempDir;

    #[test]
    fn missing_root_is_empty_state() {
        let tmp = TempDir::new().unwrap();
        let entries = inspect_mirror_root(&tmp.path().join("absent"), "").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn root_that_is_a_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("file");
        fs::write(&root, "not a dir").unwrap();
        assert!(inspect_mirror_root(&root, "").is_err());
    }

    #[test]
    fn classifies_valid_and_invalid_directories() {
        let tmp = TempDir::new().unwrap();
        fake_bare_mirror(&tmp.path().join("acme").join("a"));
        fs::create_dir_all(tmp.path().join("junk").join("old")).unwrap();
        fs::write(tmp.path().join("junk").join("notes.txt"), "x").unwrap();
        fs::create_dir_all(tmp.path().join(".cache").join("hidden")).unwrap();

        let entries = inspect_mirror_root(tmp.path(), "").unwrap();
        let summary: Vec<(&str, bool)> = entries
            .iter()
            .map(|entry| (entry.key.as_str(), entry.is_valid_mirror))
            .collect();
        assert_eq!(summary, vec![("acme/a", true), ("junk/old", false)]);
        assert_eq!(entries[0].path, tmp.path().join("acme").join("a"));
    }

    #[test]
    fn strips_suffix_from_keys() {
        let tmp = TempDir::new().unwrap();
        fake_bare_mirror(&tmp.path().join("acme").join("a.git"));
        let entries = inspect_mirror_root(tmp.path(), ".git").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.as_str(), "acme/a");
        assert!(entries[0].is_valid_mirror);
    }

    #[test]
    fn entries_are_sorted_by_key() {
        let tmp = TempDir::new().unwrap();
        for key in ["zeta/z", "acme/b", "acme/a"] {
            fs::create_dir_all(tmp.path().join(key)).unwrap();
        }
        let keys: Vec<String> = inspect_mirror_root(tmp.path(), "")
            .unwrap()
            .into_iter()
            .map(|entry| entry.key.to_string())
            .collect();
        assert_eq!(keys, vec!["acme/a", "acme/b", "zeta/z"]);
    }
}
