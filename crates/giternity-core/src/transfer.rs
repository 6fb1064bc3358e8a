use crate::cancel::CancelToken;
use crate::config::TransferKind;
use crate::error::TransferError;
use crate::git_cli::GitCliMirror;
use crate::git_mirror::GitMirror;
use crate::model::RepoAuth;
use std::path::Path;
use std::sync::Arc;

/// The clone/fetch primitive the executor drives. Both operations must be
/// safe to repeat: fetching a mirror that is already current is a no-op.
pub trait MirrorTransfer: Send + Sync {
    fn mirror_clone(&self, url: &str, dest: &Path, cancel: &CancelToken)
    -> Result<(), TransferError>;
    fn mirror_fetch(&self, path: &Path, cancel: &CancelToken) -> Result<(), TransferError>;
}

pub fn transfer_for(kind: TransferKind, auth: Option<RepoAuth>) -> Arc<dyn MirrorTransfer> {
    match kind {
        TransferKind::Libgit2 => Arc::new(GitMirror::new(auth)),
        TransferKind::GitCli => Arc::new(GitCliMirror::new()),
    }
}
