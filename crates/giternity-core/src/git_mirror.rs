use crate::cancel::CancelToken;
use crate::error::TransferError;
use crate::model::RepoAuth;
use crate::transfer::MirrorTransfer;
use git2::{
    AutotagOption, Cred, CredentialType, FetchOptions, FetchPrune, Remote, RemoteCallbacks,
    Repository,
};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

/// Every ref on the remote, force-updated onto the same name locally.
pub const MIRROR_REFSPEC: &str = "+refs/*:refs/*";
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Mirror transfer through libgit2. Equivalent to `git clone --mirror` and
/// `git remote update --prune`.
#[derive(Clone, Debug, Default)]
pub struct GitMirror {
    auth: Option<RepoAuth>,
}

impl GitMirror {
    pub fn new(auth: Option<RepoAuth>) -> Self {
        Self { auth }
    }

    fn clone_into(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), git2::Error> {
        let repo = Repository::init_bare(dest)?;
        let mut remote = repo.remote_with_fetch("origin", url, MIRROR_REFSPEC)?;
        repo.config()?.set_bool("remote.origin.mirror", true)?;
        self.fetch_remote(&mut remote, cancel)?;
        point_head_at_default_branch(&repo, &remote)
    }

    fn fetch_remote(&self, remote: &mut Remote<'_>, cancel: &CancelToken) -> Result<(), git2::Error> {
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(self.auth.as_ref(), cancel));
        fo.prune(FetchPrune::On);
        fo.download_tags(AutotagOption::All);
        fo.update_fetchhead(false);
        remote.fetch(&[] as &[&str], Some(&mut fo), None)
    }
}

impl MirrorTransfer for GitMirror {
    fn mirror_clone(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let created = !dest.exists();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(url = %url, path = %dest.display(), "cloning mirror");
        match self.clone_into(url, dest, cancel) {
            Ok(()) => Ok(()),
            Err(err) => {
                if created && let Err(cleanup) = fs::remove_dir_all(dest) {
                    warn!(path = %dest.display(), error = %cleanup, "failed to remove partial clone");
                }
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                Err(TransferError::Clone {
                    url: url.to_string(),
                    message: err.message().to_string(),
                })
            }
        }
    }

    fn mirror_fetch(&self, path: &Path, cancel: &CancelToken) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let fetch_error = |err: git2::Error| TransferError::Fetch {
            path: path.to_path_buf(),
            message: err.message().to_string(),
        };
        debug!(path = %path.display(), "fetching mirror");
        let repo = Repository::open_bare(path).map_err(fetch_error)?;
        let mut remote = repo.find_remote("origin").map_err(fetch_error)?;
        match self.fetch_remote(&mut remote, cancel) {
            Ok(()) => Ok(()),
            Err(_) if cancel.is_cancelled() => Err(TransferError::Cancelled),
            Err(err) => Err(fetch_error(err)),
        }
    }
}

/// Points `HEAD` at the branch the remote advertises as default, falling back
/// to `main` or `master` when the remote does not say. An empty remote keeps
/// the unborn `HEAD` from init.
fn point_head_at_default_branch(repo: &Repository, remote: &Remote<'_>) -> Result<(), git2::Error> {
    let advertised = remote
        .default_branch()
        .ok()
        .and_then(|buf| buf.as_str().map(str::to_string));
    let target = advertised
        .filter(|name| repo.find_reference(name).is_ok())
        .or_else(|| {
            ["refs/heads/main", "refs/heads/master"]
                .into_iter()
                .find(|name| repo.find_reference(name).is_ok())
                .map(str::to_string)
        });
    match target {
        Some(name) => {
            debug!(head = %name, "setting mirror HEAD");
            repo.set_head(&name)
        }
        None => Ok(()),
    }
}

fn remote_callbacks<'a>(auth: Option<&'a RepoAuth>, cancel: &'a CancelToken) -> RemoteCallbacks<'a> {
    let mut attempts = 0u32;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("credentials rejected"));
        }
        if let Some(auth) = auth
            && allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
            && token_allowed(auth, url)
        {
            let username = if auth.username.is_empty() {
                username_from_url.unwrap_or("git")
            } else {
                auth.username.as_str()
            };
            return Cred::userpass_plaintext(username, &auth.token);
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }
        debug!(url = %url, "no credentials for remote");
        Err(git2::Error::from_str("no credentials available for remote"))
    });
    callbacks.transfer_progress(move |_| !cancel.is_cancelled());
    callbacks
}

/// The token only goes to `https` remotes on the host it was issued for.
fn token_allowed(auth: &RepoAuth, url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            parsed.scheme() == "https"
                && parsed
                    .host_str()
                    .is_some_and(|host| host.eq_ignore_ascii_case(&auth.host))
        }
        Err(_) => false,
    }
}
