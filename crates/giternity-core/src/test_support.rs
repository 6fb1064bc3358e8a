use crate::cancel::CancelToken;
use crate::error::{ListingError, TransferError};
use crate::inspector::is_bare_mirror;
use crate::model::{OwnerListing, RemoteRepo, SourceKind};
use crate::provider::{ProviderFuture, RepoLister};
use crate::transfer::MirrorTransfer;
use git2::{Oid, Repository, Signature, Time};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Directory carrying only the bare repository markers.
pub(crate) fn fake_bare_mirror(path: &Path) {
    fs::create_dir_all(path.join("objects")).unwrap();
    fs::create_dir_all(path.join("refs")).unwrap();
    fs::write(path.join("HEAD"), "ref: refs/heads/main\n").unwrap();
}

/// Non-bare repository with one commit on `main`, authored at `when`
/// (seconds since the epoch, +0100).
pub(crate) fn upstream_repo(path: &Path, when: i64) -> Repository {
    let repo = Repository::init(path).unwrap();
    repo.set_head("refs/heads/main").unwrap();
    commit_file(&repo, "README", "hello\n", when);
    repo
}

pub(crate) fn commit_file(repo: &Repository, name: &str, contents: &str, when: i64) -> Oid {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(name), contents).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::new("tester", "tester@example.com", &Time::new(when, 60)).unwrap();
    let parent = repo
        .head()
        .ok()
        .and_then(|head| head.target())
        .map(|oid| repo.find_commit(oid).unwrap());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parents)
        .unwrap()
}

pub(crate) fn file_url(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn remote(owner: &str, name: &str) -> RemoteRepo {
    RemoteRepo {
        owner: owner.into(),
        name: name.into(),
        clone_url: format!("https://github.com/{owner}/{name}.git"),
        description: None,
        homepage: None,
        fork: false,
    }
}

pub(crate) enum FakeOwner {
    Listing(OwnerListing),
    NotFound,
    RateLimited,
}

/// In-memory lister. Unknown owners are NotFound.
#[derive(Default)]
pub(crate) struct FakeLister {
    owners: HashMap<String, FakeOwner>,
    described: HashMap<String, RemoteRepo>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeLister {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_owner(mut self, owner: &str, kind: SourceKind, repos: Vec<RemoteRepo>) -> Self {
        self.owners
            .insert(owner.to_string(), FakeOwner::Listing(OwnerListing { kind, repos }));
        self
    }

    pub(crate) fn with_failure(mut self, owner: &str, failure: FakeOwner) -> Self {
        self.owners.insert(owner.to_string(), failure);
        self
    }

    pub(crate) fn with_description(mut self, repo: RemoteRepo) -> Self {
        self.described
            .insert(format!("{}/{}", repo.owner, repo.name), repo);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RepoLister for FakeLister {
    fn list_repositories<'a>(&'a self, owner: &'a str) -> ProviderFuture<'a, OwnerListing> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(owner.to_string());
            match self.owners.get(owner) {
                Some(FakeOwner::Listing(listing)) => Ok(listing.clone()),
                Some(FakeOwner::RateLimited) => Err(ListingError::RateLimited),
                Some(FakeOwner::NotFound) | None => Err(ListingError::NotFound(owner.to_string())),
            }
        })
    }

    fn describe_repository<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
    ) -> ProviderFuture<'a, Option<RemoteRepo>> {
        Box::pin(async move { Ok(self.described.get(&format!("{owner}/{name}")).cloned()) })
    }
}

/// Transfer that creates empty bare repositories instead of talking to a
/// remote. URLs and paths registered as failing return an error.
#[derive(Default)]
pub(crate) struct FakeTransfer {
    failing_urls: HashSet<String>,
    failing_paths: HashSet<PathBuf>,
    pub(crate) clones: Mutex<Vec<String>>,
    pub(crate) fetches: Mutex<Vec<PathBuf>>,
}

impl FakeTransfer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_url(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub(crate) fn failing_path(mut self, path: &Path) -> Self {
        self.failing_paths.insert(path.to_path_buf());
        self
    }

    pub(crate) fn clone_count(&self) -> usize {
        self.clones.lock().unwrap().len()
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

impl MirrorTransfer for FakeTransfer {
    fn mirror_clone(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        self.clones.lock().unwrap().push(url.to_string());
        if self.failing_urls.contains(url) {
            return Err(TransferError::Clone {
                url: url.to_string(),
                message: "remote hung up".into(),
            });
        }
        Repository::init_bare(dest).map_err(|err| TransferError::Clone {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(())
    }

    fn mirror_fetch(&self, path: &Path, cancel: &CancelToken) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        self.fetches.lock().unwrap().push(path.to_path_buf());
        if self.failing_paths.contains(path) || !is_bare_mirror(path) {
            return Err(TransferError::Fetch {
                path: path.to_path_buf(),
                message: "remote hung up".into(),
            });
        }
        Ok(())
    }
}
