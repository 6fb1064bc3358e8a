use crate::model::MirrorKey;
use std::path::{Path, PathBuf};

pub fn mirror_path(root: &Path, key: &MirrorKey, suffix: &str) -> PathBuf {
    root.join(key.owner()).join(format!("{}{suffix}", key.name()))
}

pub fn checkout_path(root: &Path, key: &MirrorKey) -> PathBuf {
    root.join(key.owner()).join(key.name())
}

/// Inverse of [`mirror_path`] for a directory found at `root/owner/dir_name`.
pub fn key_from_dir(owner: &str, dir_name: &str, suffix: &str) -> MirrorKey {
    let name = if suffix.is_empty() {
        dir_name
    } else {
        match dir_name.strip_suffix(suffix) {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => dir_name,
        }
    };
    MirrorKey::new(owner, name)
}
