use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    User,
    Organization,
    SingleRepo,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::User => "user",
            SourceKind::Organization => "organization",
            SourceKind::SingleRepo => "single_repo",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join key between configured sources and directories under the mirror
/// root, always `owner/name`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MirrorKey(String);

impl MirrorKey {
    pub fn new(owner: &str, name: &str) -> Self {
        Self(format!("{owner}/{name}"))
    }

    pub fn owner(&self) -> &str {
        self.0
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or(self.0.as_str())
    }

    pub fn name(&self) -> &str {
        self.0
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SourceSpec {
    pub owner: String,
    pub kind: SourceKind,
    pub name: String,
    pub clone_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

impl SourceSpec {
    pub fn key(&self) -> MirrorKey {
        MirrorKey::new(&self.owner, &self.name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LocalEntry {
    pub key: MirrorKey,
    pub path: PathBuf,
    pub is_valid_mirror: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Orphan,
    /// The target directory exists but is not a bare mirror.
    Conflict,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Orphan => "orphan",
            ActionKind::Conflict => "conflict",
        }
    }

    pub fn transfers(&self) -> bool {
        matches!(self, ActionKind::Create | ActionKind::Update)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PlannedAction {
    pub key: MirrorKey,
    pub kind: ActionKind,
    pub target_path: PathBuf,
    pub clone_url: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionResult {
    pub key: MirrorKey,
    pub kind: ActionKind,
    pub succeeded: bool,
    /// The clone or fetch completed, even if metadata failed afterwards.
    pub transferred: bool,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    pub description: Option<String>,
}

impl ActionResult {
    pub fn success(action: &PlannedAction) -> Self {
        Self {
            key: action.key.clone(),
            kind: action.kind,
            succeeded: true,
            transferred: false,
            error: None,
            last_modified: None,
            description: None,
        }
    }

    pub fn failure(action: &PlannedAction, transferred: bool, error: impl Into<String>) -> Self {
        Self {
            key: action.key.clone(),
            kind: action.kind,
            succeeded: false,
            transferred,
            error: Some(error.into()),
            last_modified: None,
            description: None,
        }
    }
}

/// One repository as reported by a remote listing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteRepo {
    pub owner: String,
    pub name: String,
    pub clone_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub fork: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnerListing {
    pub kind: SourceKind,
    pub repos: Vec<RemoteRepo>,
}

/// HTTP credentials for one host. Only offered to `https` remotes on `host`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepoAuth {
    pub username: String,
    pub token: String,
    pub host: String,
}
