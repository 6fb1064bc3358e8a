use crate::cancel::CancelToken;
use crate::error::TransferError;
use crate::transfer::MirrorTransfer;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::{debug, info, warn};

/// Mirror transfer through the `git` executable.
///
/// Commands run with prompts disabled, hooks disabled and stdin closed. A
/// command already running is allowed to finish when the run is cancelled.
#[derive(Clone, Debug)]
pub struct GitCliMirror {
    git_path: String,
}

impl Default for GitCliMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCliMirror {
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    pub fn with_git_path(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl MirrorTransfer for GitCliMirror {
    fn mirror_clone(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let created = !dest.exists();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(url = %url, path = %dest.display(), "cloning mirror with git");
        let output = self
            .command()
            .args(["clone", "--mirror", "--quiet", "--"])
            .arg(url)
            .arg(dest)
            .output()?;
        if !output.status.success() {
            if created && let Err(cleanup) = fs::remove_dir_all(dest) {
                debug!(path = %dest.display(), error = %cleanup, "no partial clone to remove");
            }
            return Err(TransferError::Clone {
                url: url.to_string(),
                message: stderr_message(&output),
            });
        }
        Ok(())
    }

    fn mirror_fetch(&self, path: &Path, cancel: &CancelToken) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        debug!(path = %path.display(), "fetching mirror with git");
        let output = self
            .command()
            .arg("-C")
            .arg(path)
            .args(["remote", "update", "--prune"])
            .output()?;
        if !output.status.success() {
            let message = stderr_message(&output);
            warn!(path = %path.display(), error = %message, "git remote update failed");
            return Err(TransferError::Fetch {
                path: path.to_path_buf(),
                message,
            });
        }
        Ok(())
    }
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        format!("git exited with {}", output.status)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_git_binary_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let git = GitCliMirror::with_git_path(tmp.path().join("no-git").to_string_lossy());
        let err = git
            .mirror_fetch(tmp.path(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[test]
    fn cancelled_token_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let dest = tmp.path().join("mirror");
        let err = GitCliMirror::new()
            .mirror_clone("https://example.invalid/a.git", &dest, &cancel)
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(!dest.exists());
    }
}
