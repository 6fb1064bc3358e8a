use crate::error::ConfigurationError;
use crate::model::RepoAuth;
use crate::resolver::validate_name;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/giternity.toml";
pub const DEFAULT_GIT_DATA_PATH: &str = "/srv/git/";
const TOKEN_USERNAME: &str = "x-access-token";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_WEB_URL: &str = "https://github.com";
pub const DEFAULT_JOBS: usize = 4;
pub const LOCK_FILE_NAME: &str = ".giternity.lock";

/// The configuration file as written by the operator.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub git_data_path: Option<PathBuf>,
    pub checkout_path: Option<PathBuf>,
    #[serde(default)]
    pub checkout_suffix: String,
    pub cgit_url: Option<String>,
    pub jobs: Option<usize>,
    #[serde(default)]
    pub include_forks: bool,
    pub report_orphans: Option<bool>,
    #[serde(default)]
    pub transfer: TransferKind,
    pub lock_path: Option<PathBuf>,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default, rename = "mirror")]
    pub mirrors: Vec<MirrorSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubSection {
    #[serde(default)]
    pub repositories: Vec<String>,
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorSection {
    pub owner: String,
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferKind {
    #[default]
    Libgit2,
    GitCli,
}

/// Validated configuration. The engine only ever sees this.
#[derive(Clone, Debug)]
pub struct MirrorConfig {
    pub root: PathBuf,
    pub checkout_path: Option<PathBuf>,
    pub checkout_suffix: String,
    pub cgit_url: Option<String>,
    pub jobs: usize,
    pub include_forks: bool,
    pub report_orphans: bool,
    pub transfer: TransferKind,
    pub lock_path: PathBuf,
    pub github: GitHubSettings,
    pub sources: Vec<SourceEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GitHubSettings {
    pub api_url: String,
    pub web_url: String,
    pub token: Option<String>,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            web_url: DEFAULT_GITHUB_WEB_URL.to_string(),
            token: None,
        }
    }
}

impl GitHubSettings {
    /// Credentials for clones from `web_url`. `None` without a token or when
    /// `web_url` names no host.
    pub fn repo_auth(&self) -> Option<RepoAuth> {
        let token = self.token.clone()?;
        let web_url = url::Url::parse(&self.web_url).ok()?;
        Some(RepoAuth {
            username: TOKEN_USERNAME.to_string(),
            token,
            host: web_url.host_str()?.to_string(),
        })
    }
}

/// One configured source, kept in configuration order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceEntry {
    Owner(String),
    Repo(RepoEntry),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepoEntry {
    pub owner: String,
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
}

impl RepoEntry {
    pub fn label(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(data)?)
    }

    /// `env_token` is the token found in the environment; a token in the
    /// file takes precedence.
    pub fn validate(self, env_token: Option<String>) -> Result<MirrorConfig, ConfigurationError> {
        let root = self
            .git_data_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GIT_DATA_PATH));
        if root.as_os_str().is_empty() {
            return Err(ConfigurationError::Invalid(
                "git_data_path must not be empty".into(),
            ));
        }
        if let Some(checkout) = self.checkout_path.as_ref() {
            if checkout.as_os_str().is_empty() {
                return Err(ConfigurationError::Invalid(
                    "checkout_path must not be empty".into(),
                ));
            }
            if same_dir(checkout, &root) {
                return Err(ConfigurationError::Invalid(
                    "checkout_path must differ from git_data_path".into(),
                ));
            }
        }
        let jobs = self.jobs.unwrap_or(DEFAULT_JOBS);
        if jobs == 0 {
            return Err(ConfigurationError::Invalid("jobs must be at least 1".into()));
        }
        if self.checkout_suffix.contains('/') || self.checkout_suffix.contains('\\') {
            return Err(ConfigurationError::Invalid(
                "checkout_suffix must not contain path separators".into(),
            ));
        }

        let mut sources = Vec::new();
        for entry in self.github.repositories {
            sources.push(split_repository_entry(&entry)?);
        }
        for mirror in self.mirrors {
            sources.push(SourceEntry::Repo(RepoEntry {
                owner: mirror.owner,
                name: mirror.name,
                url: mirror.url,
                description: mirror.description,
                homepage: mirror.homepage,
            }));
        }

        let token = self
            .github
            .token
            .filter(|token| !token.trim().is_empty())
            .or(env_token.filter(|token| !token.trim().is_empty()));
        let github = GitHubSettings {
            api_url: trim_url(self.github.api_url.as_deref(), DEFAULT_GITHUB_API_URL),
            web_url: trim_url(self.github.web_url.as_deref(), DEFAULT_GITHUB_WEB_URL),
            token,
        };
        let lock_path = self
            .lock_path
            .unwrap_or_else(|| root.join(LOCK_FILE_NAME));

        Ok(MirrorConfig {
            root,
            checkout_path: self.checkout_path,
            checkout_suffix: self.checkout_suffix,
            cgit_url: self.cgit_url.filter(|url| !url.is_empty()),
            jobs,
            include_forks: self.include_forks,
            report_orphans: self.report_orphans.unwrap_or(true),
            transfer: self.transfer,
            lock_path,
            github,
            sources,
        })
    }
}

impl MirrorConfig {
    /// A config with only a mirror root, for callers that build sources
    /// programmatically.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            lock_path: root.join(LOCK_FILE_NAME),
            root,
            checkout_path: None,
            checkout_suffix: String::new(),
            cgit_url: None,
            jobs: DEFAULT_JOBS,
            include_forks: false,
            report_orphans: true,
            transfer: TransferKind::default(),
            github: GitHubSettings::default(),
            sources: Vec::new(),
        }
    }
}

/// `owner` is an owner to expand, `owner/name` a single repository.
fn split_repository_entry(entry: &str) -> Result<SourceEntry, ConfigurationError> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Err(ConfigurationError::MalformedRepo {
            entry: entry.to_string(),
            reason: "empty repository entry".into(),
        });
    }
    match entry.split_once('/') {
        None => {
            validate_name(entry).map_err(|reason| ConfigurationError::MalformedRepo {
                entry: entry.to_string(),
                reason: format!("owner {reason}"),
            })?;
            Ok(SourceEntry::Owner(entry.to_string()))
        }
        Some((owner, name)) => Ok(SourceEntry::Repo(RepoEntry {
            owner: owner.to_string(),
            name: name.to_string(),
            ..RepoEntry::default()
        })),
    }
}

fn trim_url(value: Option<&str>, default: &str) -> String {
    value
        .map(|url| url.trim().trim_end_matches('/'))
        .filter(|url| !url.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let a = a.components().collect::<PathBuf>();
    let b = b.components().collect::<PathBuf>();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
git_data_path = "/srv/git/"
checkout_path = "/srv/checkout/"
cgit_url = "https://git.example.com/"
checkout_suffix = ".git"
jobs = 2

[github]
repositories = ["acme", "extra/x"]

[[mirror]]
owner = "tools"
name = "thing"
url = "https://gitlab.com/tools/thing.git"
description = "A thing"
"#;

    #[test]
    fn parses_and_splits_sources_in_order() {
        let config = AppConfig::parse(SAMPLE).unwrap().validate(None).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/git/"));
        assert_eq!(config.checkout_suffix, ".git");
        assert_eq!(config.jobs, 2);
        assert_eq!(config.lock_path, PathBuf::from("/srv/git/.giternity.lock"));
        assert_eq!(
            config.sources,
            vec![
                SourceEntry::Owner("acme".into()),
                SourceEntry::Repo(RepoEntry {
                    owner: "extra".into(),
                    name: "x".into(),
                    ..RepoEntry::default()
                }),
                SourceEntry::Repo(RepoEntry {
                    owner: "tools".into(),
                    name: "thing".into(),
                    url: Some("https://gitlab.com/tools/thing.git".into()),
                    description: Some("A thing".into()),
                    homepage: None,
                }),
            ]
        );
    }

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = AppConfig::parse("").unwrap().validate(None).unwrap();
        assert_eq!(config.root, PathBuf::from(DEFAULT_GIT_DATA_PATH));
        assert_eq!(config.jobs, DEFAULT_JOBS);
        assert!(config.report_orphans);
        assert_eq!(config.transfer, TransferKind::Libgit2);
        assert_eq!(config.github, GitHubSettings::default());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = AppConfig::parse("git_dta_path = \"/srv\"").unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn rejects_zero_jobs() {
        let err = AppConfig::parse("jobs = 0")
            .unwrap()
            .validate(None)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn rejects_checkout_path_equal_to_root() {
        let config = AppConfig::parse(
            "git_data_path = \"/srv/git\"\ncheckout_path = \"/srv/git/\"",
        )
        .unwrap();
        assert!(config.validate(None).is_err());
    }

    #[test]
    fn file_token_wins_over_environment() {
        let config = AppConfig::parse("[github]\ntoken = \"from-file\"")
            .unwrap()
            .validate(Some("from-env".into()))
            .unwrap();
        assert_eq!(config.github.token.as_deref(), Some("from-file"));

        let config = AppConfig::parse("")
            .unwrap()
            .validate(Some("from-env".into()))
            .unwrap();
        assert_eq!(config.github.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn parses_git_cli_transfer_and_trims_api_url() {
        let config = AppConfig::parse(
            "transfer = \"git-cli\"\n[github]\napi_url = \"https://ghe.example.com/api/v3/\"",
        )
        .unwrap()
        .validate(None)
        .unwrap();
        assert_eq!(config.transfer, TransferKind::GitCli);
        assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn empty_repository_entry_is_malformed() {
        let err = AppConfig::parse("[github]\nrepositories = [\" \"]")
            .unwrap()
            .validate(None)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedRepo { .. }));
    }

    #[test]
    fn unsafe_owner_entry_is_malformed() {
        for owner in ["..", "-x", "a\\b"] {
            let raw = format!("[github]\nrepositories = [{owner:?}]");
            let err = AppConfig::parse(&raw)
                .unwrap()
                .validate(None)
                .unwrap_err();
            match err {
                ConfigurationError::MalformedRepo { entry, reason } => {
                    assert_eq!(entry, owner);
                    assert!(reason.starts_with("owner "), "{reason}");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn token_is_scoped_to_the_web_host() {
        let config = AppConfig::parse(
            "[github]\ntoken = \"t\"\nweb_url = \"https://ghe.example.com/\"",
        )
        .unwrap()
        .validate(None)
        .unwrap();
        let auth = config.github.repo_auth().unwrap();
        assert_eq!(auth.host, "ghe.example.com");
        assert_eq!(auth.token, "t");
        assert_eq!(auth.username, "x-access-token");

        assert!(GitHubSettings::default().repo_auth().is_none());
    }
}
