use crate::model::MirrorKey;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a [`crate::provider::RepoLister`].
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("owner not found: {0}")]
    NotFound(String),
    #[error("rate limited by remote api")]
    RateLimited,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An owner could not be expanded. Fatal to that owner only.
#[derive(Debug, Error)]
#[error("resolve owner {owner}: {source}")]
pub struct ResolutionError {
    pub owner: String,
    #[source]
    pub source: ListingError,
}

/// The configured sources cannot form a valid plan. Fatal to the run.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("duplicate mirror key {key}: {first} collides with {second}")]
    DuplicateKey {
        key: MirrorKey,
        first: String,
        second: String,
    },
    #[error("malformed repository entry {entry}: {reason}")]
    MalformedRepo { entry: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
#[error("read mirror root {path}: {source}")]
pub struct InspectionError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("mirror clone of {url} failed: {message}")]
    Clone { url: String, message: String },
    #[error("mirror fetch of {path} failed: {message}")]
    Fetch { path: PathBuf, message: String },
    #[error("transfer cancelled")]
    Cancelled,
    #[error("transfer io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("open mirror {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },
    #[error("read mirror refs: {0}")]
    Refs(#[from] git2::Error),
    #[error("invalid commit timestamp: {0}")]
    Timestamp(String),
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that stop a run before any action executes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Inspection(#[from] InspectionError),
    #[error("executor task failed: {0}")]
    Join(String),
}
