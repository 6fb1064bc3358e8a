use crate::error::MetadataError;
use crate::model::PlannedAction;
use git2::Repository;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use time::{OffsetDateTime, UtcOffset, format_description};
use tracing::{debug, info};

pub const AGEFILE_PATH: &str = "info/web/last-modified";
pub const DESCRIPTION_FILE: &str = "description";
pub const CGITRC_FILE: &str = "cgitrc";
pub const DEFAULT_DESCRIPTION: &str = "Mysterious Project";

const AGEFILE_FORMAT: &str =
    "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]";

/// What the writer derived for one mirror.
#[derive(Clone, Debug, PartialEq)]
pub struct WrittenMetadata {
    pub last_modified: Option<OffsetDateTime>,
    pub description: Option<String>,
}

/// Writes the cgit sidecar files of a freshly transferred mirror.
#[derive(Clone, Debug, Default)]
pub struct MetadataWriter {
    cgit_url: Option<String>,
}

impl MetadataWriter {
    pub fn new(cgit_url: Option<String>) -> Self {
        Self { cgit_url }
    }

    pub fn write(&self, action: &PlannedAction) -> Result<WrittenMetadata, MetadataError> {
        let path = action.target_path.as_path();
        let last_modified = last_modified(path)?;
        match last_modified {
            Some(timestamp) => {
                write_if_changed(&path.join(AGEFILE_PATH), &format_agefile(timestamp)?)?;
            }
            None => debug!(key = %action.key, "mirror has no commits; skipping agefile"),
        }

        let description = action
            .description
            .as_deref()
            .map(single_line)
            .filter(|text| !text.is_empty());
        if let Some(text) = description.as_deref() {
            write_if_changed(&path.join(DESCRIPTION_FILE), &format!("{text}\n"))?;
        }

        let cgitrc = render_cgitrc(
            self.cgit_url.as_deref(),
            action.key.as_str(),
            action.key.name(),
            action.clone_url.as_deref().unwrap_or_default(),
            description.as_deref(),
            action.homepage.as_deref(),
        );
        let changed = write_if_changed(&path.join(CGITRC_FILE), &cgitrc)?;
        if changed {
            info!(key = %action.key, "updated cgit metadata");
        }

        Ok(WrittenMetadata {
            last_modified,
            description,
        })
    }
}

/// Most recent author date over every ref that peels to a commit, in the
/// author's own offset. `None` for a repository without commits.
pub fn last_modified(path: &Path) -> Result<Option<OffsetDateTime>, MetadataError> {
    let repo = Repository::open_bare(path).map_err(|source| MetadataError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut latest: Option<git2::Time> = None;
    for reference in repo.references()? {
        let reference = reference?;
        let Ok(commit) = reference.peel_to_commit() else {
            continue;
        };
        let when = commit.author().when();
        if latest.is_none_or(|current| when.seconds() > current.seconds()) {
            latest = Some(when);
        }
    }
    latest.map(to_offset_datetime).transpose()
}

fn to_offset_datetime(when: git2::Time) -> Result<OffsetDateTime, MetadataError> {
    let offset = UtcOffset::from_whole_seconds(when.offset_minutes() * 60)
        .map_err(|err| MetadataError::Timestamp(err.to_string()))?;
    let timestamp = OffsetDateTime::from_unix_timestamp(when.seconds())
        .map_err(|err| MetadataError::Timestamp(err.to_string()))?;
    Ok(timestamp.to_offset(offset))
}

/// cgit agefile contents: git's iso8601 date plus a newline.
pub fn format_agefile(timestamp: OffsetDateTime) -> Result<String, MetadataError> {
    let format = format_description::parse(AGEFILE_FORMAT)
        .map_err(|err| MetadataError::Timestamp(err.to_string()))?;
    let text = timestamp
        .format(&format)
        .map_err(|err| MetadataError::Timestamp(err.to_string()))?;
    Ok(format!("{text}\n"))
}

/// Repo-level cgitrc. The key order is fixed so an unchanged mirror renders
/// byte-identical contents.
pub fn render_cgitrc(
    cgit_url: Option<&str>,
    full_name: &str,
    name: &str,
    clone_url: &str,
    description: Option<&str>,
    homepage: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(homepage) = homepage.map(single_line).filter(|value| !value.is_empty()) {
        out.push_str(&format!("homepage={homepage}\n"));
    }
    match cgit_url {
        Some(base) => out.push_str(&format!("clone-url={base}{full_name} {clone_url}\n")),
        None => out.push_str(&format!("clone-url={clone_url}\n")),
    }
    let desc = description
        .map(single_line)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
    out.push_str(&format!("desc={desc}\n"));
    out.push_str(&format!("name={name}\n"));
    out
}

/// Returns whether the file was written. Identical content leaves the file,
/// and its mtime, alone.
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool, MetadataError> {
    let write_error = |source: std::io::Error| MetadataError::Write {
        path: path.to_path_buf(),
        source,
    };
    match fs::read(path) {
        Ok(existing) if existing == contents.as_bytes() => return Ok(false),
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(write_error(err)),
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, contents).map_err(write_error)?;
    Ok(true)
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::git_mirror::GitMirror;
    use crate::model::{ActionKind, MirrorKey};
    use crate::test_support::{commit_file, file_url, upstream_repo};
    use crate::transfer::MirrorTransfer;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn action(path: PathBuf, description: Option<&str>) -> PlannedAction {
        PlannedAction {
            key: MirrorKey::new("acme", "a"),
            kind: ActionKind::Update,
            target_path: path,
            clone_url: Some("https://github.com/acme/a.git".into()),
            description: description.map(str::to_string),
            homepage: None,
        }
    }

    #[test]
    fn agefile_uses_git_iso8601_with_author_offset() {
        let offset = UtcOffset::from_hms(1, 0, 0).unwrap();
        let timestamp = OffsetDateTime::from_unix_timestamp(1_700_000_000)
            .unwrap()
            .to_offset(offset);
        assert_eq!(
            format_agefile(timestamp).unwrap(),
            "2023-11-14 23:13:20 +0100\n"
        );
        let negative = OffsetDateTime::from_unix_timestamp(1_700_000_000)
            .unwrap()
            .to_offset(UtcOffset::from_hms(-3, -30, 0).unwrap());
        assert_eq!(
            format_agefile(negative).unwrap(),
            "2023-11-14 18:43:20 -0330\n"
        );
    }

    #[test]
    fn cgitrc_lists_homepage_clone_url_desc_and_name() {
        let rendered = render_cgitrc(
            Some("https://git.example.com/"),
            "acme/a",
            "a",
            "https://github.com/acme/a.git",
            Some("Widgets\nand more"),
            Some("https://acme.example.com"),
        );
        assert_eq!(
            rendered,
            "homepage=https://acme.example.com\n\
             clone-url=https://git.example.com/acme/a https://github.com/acme/a.git\n\
             desc=Widgetsand more\n\
             name=a\n"
        );
    }

    #[test]
    fn cgitrc_defaults_description() {
        let rendered = render_cgitrc(None, "acme/a", "a", "https://x/a.git", None, None);
        assert_eq!(
            rendered,
            "clone-url=https://x/a.git\ndesc=Mysterious Project\nname=a\n"
        );
    }

    #[test]
    fn empty_repository_gets_no_agefile() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a");
        Repository::init_bare(&path).unwrap();
        let written = MetadataWriter::new(None)
            .write(&action(path.clone(), None))
            .unwrap();
        assert!(written.last_modified.is_none());
        assert!(!path.join(AGEFILE_PATH).exists());
        assert!(path.join(CGITRC_FILE).is_file());
    }

    #[test]
    fn writes_metadata_and_noop_fetch_keeps_it_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let upstream_path = tmp.path().join("upstream");
        let upstream = upstream_repo(&upstream_path, 1_700_000_000);
        let path = tmp.path().join("mirror");
        let transfer = GitMirror::new(None);
        let cancel = CancelToken::new();
        transfer
            .mirror_clone(&file_url(&upstream_path), &path, &cancel)
            .unwrap();

        let writer = MetadataWriter::new(None);
        let planned = action(path.clone(), Some("Widgets"));
        let written = writer.write(&planned).unwrap();
        assert_eq!(written.description.as_deref(), Some("Widgets"));
        let agefile = path.join(AGEFILE_PATH);
        let first = fs::read(&agefile).unwrap();
        assert_eq!(first, b"2023-11-14 23:13:20 +0100\n");
        assert_eq!(
            fs::read_to_string(path.join(DESCRIPTION_FILE)).unwrap(),
            "Widgets\n"
        );
        let mtime = fs::metadata(&agefile).unwrap().modified().unwrap();

        transfer.mirror_fetch(&path, &cancel).unwrap();
        writer.write(&planned).unwrap();
        assert_eq!(fs::read(&agefile).unwrap(), first);
        assert_eq!(fs::metadata(&agefile).unwrap().modified().unwrap(), mtime);

        commit_file(&upstream, "NEWS", "more\n", 1_700_086_400);
        transfer.mirror_fetch(&path, &cancel).unwrap();
        writer.write(&planned).unwrap();
        assert_eq!(
            fs::read_to_string(&agefile).unwrap(),
            "2023-11-15 23:13:20 +0100\n"
        );
    }

    #[test]
    fn write_if_changed_reports_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("file");
        assert!(write_if_changed(&path, "one\n").unwrap());
        assert!(!write_if_changed(&path, "one\n").unwrap());
        assert!(write_if_changed(&path, "two\n").unwrap());
    }

    #[test]
    fn missing_mirror_is_an_open_error() {
        let tmp = TempDir::new().unwrap();
        let err = MetadataWriter::new(None)
            .write(&action(tmp.path().join("absent"), None))
            .unwrap_err();
        assert!(matches!(err, MetadataError::Open { .. }));
    }
}
