//! Best-effort git integration (§4.10). Mutations performed by the orchestrator
//! are never rolled back when a commit fails; failures are surfaced through the
//! return value, not propagated as errors.

use std::path::Path;

use tracing::{info, warn};

use crate::error::EngineResult;
use crate::store::StateStore;

const ENGINE_STATE_LAST_TRACKED_COMMIT: &str = "vcs.last_tracked_commit";

#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub success: bool,
    pub hash: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UndoOutcome {
    pub success: bool,
    pub message: String,
    pub undone_commit: Option<String>,
}

pub struct VcsOps;

impl VcsOps {
    pub async fn is_repo(vault: &Path) -> bool {
        vault.join(".git").exists()
    }

    /// Stages `note_path` and commits with `{message_prefix} {note_path}`.
    /// Never returns `Err`: failures are reported through `CommitOutcome.error`.
    pub async fn commit(vault: &Path, note_path: &str, message_prefix: &str) -> CommitOutcome {
        if !Self::is_repo(vault).await {
            return CommitOutcome {
                success: false,
                hash: None,
                error: Some("vault is not a git repository".to_string()),
            };
        }

        if vault.join(".git").join("index.lock").exists() {
            warn!("git commit skipped: index.lock present");
            return CommitOutcome {
                success: false,
                hash: None,
                error: Some("git index is locked".to_string()),
            };
        }

        let add = tokio::process::Command::new("git")
            .args(["add", "--", note_path])
            .current_dir(vault)
            .output()
            .await;

        if let Err(e) = add {
            warn!(error = %e, "git add failed");
            return CommitOutcome {
                success: false,
                hash: None,
                error: Some(e.to_string()),
            };
        }

        let diff = tokio::process::Command::new("git")
            .args(["diff", "--cached", "--quiet", "--", note_path])
            .current_dir(vault)
            .status()
            .await;

        match diff {
            Ok(status) if status.success() => {
                return CommitOutcome {
                    success: false,
                    hash: None,
                    error: Some("nothing to commit".to_string()),
                };
            }
            Err(e) => {
                warn!(error = %e, "git diff --cached failed");
                return CommitOutcome {
                    success: false,
                    hash: None,
                    error: Some(e.to_string()),
                };
            }
            _ => {}
        }

        let message = format!("{message_prefix} {note_path}");
        let commit = tokio::process::Command::new("git")
            .args(["commit", "-m", &message])
            .env("GIT_AUTHOR_NAME", "Flywheel")
            .env("GIT_AUTHOR_EMAIL", "flywheel@localhost")
            .env("GIT_COMMITTER_NAME", "Flywheel")
            .env("GIT_COMMITTER_EMAIL", "flywheel@localhost")
            .current_dir(vault)
            .output()
            .await;

        match commit {
            Ok(out) if out.status.success() => {
                let hash = Self::last_commit(vault).await.map(|c| c.hash);
                info!(note_path, "git commit succeeded");
                CommitOutcome {
                    success: true,
                    hash,
                    error: None,
                }
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                warn!(error = %stderr, "git commit failed");
                CommitOutcome {
                    success: false,
                    hash: None,
                    error: Some(stderr),
                }
            }
            Err(e) => {
                warn!(error = %e, "git commit subprocess failed to launch");
                CommitOutcome {
                    success: false,
                    hash: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn last_commit(vault: &Path) -> Option<CommitInfo> {
        if !Self::is_repo(vault).await {
            return None;
        }
        let out = tokio::process::Command::new("git")
            .args(["log", "-1", "--format=%H%x1f%s%x1f%ct"])
            .current_dir(vault)
            .output()
            .await
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if stdout.is_empty() {
            return None;
        }
        let mut parts = stdout.splitn(3, '\u{1f}');
        let hash = parts.next()?.to_string();
        let message = parts.next()?.to_string();
        let timestamp: i64 = parts.next()?.parse().ok()?;
        Some(CommitInfo { hash, message, timestamp })
    }

    /// Reverts HEAD via `git revert --no-edit`; fails when no commits exist.
    pub async fn undo_last(vault: &Path) -> UndoOutcome {
        if !Self::is_repo(vault).await {
            return UndoOutcome {
                success: false,
                message: "vault is not a git repository".to_string(),
                undone_commit: None,
            };
        }

        let undone = Self::last_commit(vault).await;

        let out = tokio::process::Command::new("git")
            .args(["revert", "HEAD", "--no-edit"])
            .env("GIT_AUTHOR_NAME", "Flywheel")
            .env("GIT_AUTHOR_EMAIL", "flywheel@localhost")
            .env("GIT_COMMITTER_NAME", "Flywheel")
            .env("GIT_COMMITTER_EMAIL", "flywheel@localhost")
            .current_dir(vault)
            .output()
            .await;

        match out {
            Ok(out) if out.status.success() => {
                info!("git revert succeeded");
                UndoOutcome {
                    success: true,
                    message: "last commit reverted".to_string(),
                    undone_commit: undone.map(|c| c.hash),
                }
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                warn!(error = %stderr, "git revert failed");
                UndoOutcome {
                    success: false,
                    message: stderr,
                    undone_commit: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "git revert subprocess failed to launch");
                UndoOutcome {
                    success: false,
                    message: e.to_string(),
                    undone_commit: None,
                }
            }
        }
    }

    /// Advances only when `commit` succeeded and its message carried the
    /// engine's configured prefix; external commits never move this pointer.
    pub fn record_tracked_commit_if_own(store: &StateStore, outcome: &CommitOutcome, message_prefix: &str, note_path: &str, now_ms: i64) -> EngineResult<()> {
        if !outcome.success {
            return Ok(());
        }
        let Some(hash) = &outcome.hash else { return Ok(()) };
        let message = format!("{message_prefix} {note_path}");
        if !message.starts_with(message_prefix) {
            return Ok(());
        }
        store.set_engine_state(ENGINE_STATE_LAST_TRACKED_COMMIT, hash, now_ms)
    }

    pub fn last_tracked_commit(store: &StateStore) -> EngineResult<Option<String>> {
        store.get_engine_state(ENGINE_STATE_LAST_TRACKED_COMMIT)
    }

    pub fn clear_tracking(store: &StateStore) -> EngineResult<()> {
        store.clear_engine_state(ENGINE_STATE_LAST_TRACKED_COMMIT)
    }
}
