use anyhow::{anyhow, Result};
use git2::{BranchType, Repository, WorktreeAddOptions, WorktreePruneOptions};
use std::path::{Path, PathBuf};

use super::branches::validate_branch_name;
use super::repository::{get_commit_hash, has_uncommitted_changes};

/// One entry of the underlying `git worktree list` view.
#[derive(Debug, Clone)]
pub struct GitWorktree {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head: Option<String>,
}

/// Check out `branch` into a new worktree at `worktree_path`. A branch
/// that already exists is reused (resuming a feature); otherwise it is
/// created from `base_branch`.
pub fn create_worktree(
    repo_path: &Path,
    branch_name: &str,
    worktree_path: &Path,
    base_branch: &str,
) -> Result<()> {
    validate_branch_name(branch_name)?;

    if worktree_path.exists() {
        return Err(anyhow!(
            "Worktree path already exists: {}",
            worktree_path.display()
        ));
    }
    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let repo = Repository::open(repo_path)?;

    let branch_ref = match repo.find_branch(branch_name, BranchType::Local) {
        Ok(existing) => {
            log::info!("Reusing existing branch: {branch_name}");
            existing.into_reference()
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            let base_commit_hash = get_commit_hash(repo_path, base_branch).map_err(|e| {
                anyhow!("Base branch '{base_branch}' does not exist in the repository: {e}")
            })?;
            log::info!("Creating branch {branch_name} from {base_commit_hash} ({base_branch})");

            let base_oid = git2::Oid::from_str(&base_commit_hash)?;
            let base_commit = repo.find_commit(base_oid)?;
            repo.branch(branch_name, &base_commit, false)?.into_reference()
        }
        Err(e) => return Err(anyhow!("Failed to look up branch {branch_name}: {e}")),
    };

    let mut opts = WorktreeAddOptions::new();
    opts.reference(Some(&branch_ref));

    repo.worktree(
        worktree_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(branch_name),
        worktree_path,
        Some(&opts),
    )?;

    log::info!("Created worktree at: {}", worktree_path.display());
    Ok(())
}

/// Remove the worktree at `worktree_path` and prune its git registration.
/// Refuses to delete a dirty worktree unless `force` is set.
pub fn remove_worktree(repo_path: &Path, worktree_path: &Path, force: bool) -> Result<()> {
    if !force && worktree_path.exists() {
        match has_uncommitted_changes(worktree_path) {
            Ok(true) => {
                return Err(anyhow!(
                    "Worktree has uncommitted changes: {} (use force to remove anyway)",
                    worktree_path.display()
                ));
            }
            Ok(false) => {}
            Err(e) => log::warn!("Could not check worktree status, proceeding: {e}"),
        }
    }

    let repo = Repository::open(repo_path)?;

    // Handle path canonicalization differences (macOS /private prefix)
    let canonical_target = worktree_path
        .canonicalize()
        .unwrap_or_else(|_| worktree_path.to_path_buf());

    let worktrees = repo.worktrees()?;
    for wt_name in worktrees.iter().flatten() {
        if let Ok(wt) = repo.find_worktree(wt_name) {
            let wt_path = wt.path();
            let canonical_wt = wt_path
                .canonicalize()
                .unwrap_or_else(|_| wt_path.to_path_buf());
            if canonical_wt == canonical_target || wt_path == worktree_path {
                // Remove the directory first; pruning requires it gone
                if worktree_path.exists() {
                    std::fs::remove_dir_all(worktree_path)
                        .map_err(|e| anyhow!("Failed to remove worktree directory: {e}"))?;
                }
                if let Err(e) = wt.prune(Some(&mut WorktreePruneOptions::new())) {
                    log::warn!("Failed to prune worktree from git registry: {e}");
                }
                return Ok(());
            }
        }
    }

    // Not registered as a worktree; only the stray directory remains
    if worktree_path.exists() {
        std::fs::remove_dir_all(worktree_path)?;
        Ok(())
    } else {
        Err(anyhow!("Worktree not found: {:?}", worktree_path))
    }
}

/// List all checkouts known to the repository, main working directory
/// included, with each one's branch and HEAD commit where resolvable.
pub fn list_worktrees(repo_path: &Path) -> Result<Vec<GitWorktree>> {
    let repo = Repository::open(repo_path)?;
    let mut entries = Vec::new();

    if let Some(workdir) = repo.workdir() {
        entries.push(describe_checkout(workdir.to_path_buf()));
    }

    let worktrees = repo.worktrees()?;
    for wt_name in worktrees.iter().flatten() {
        if let Ok(wt) = repo.find_worktree(wt_name) {
            entries.push(describe_checkout(wt.path().to_path_buf()));
        }
    }

    Ok(entries)
}

fn describe_checkout(path: PathBuf) -> GitWorktree {
    let (branch, head) = match Repository::open(&path) {
        Ok(repo) => match repo.head() {
            Ok(head_ref) => (
                head_ref.shorthand().map(|s| s.to_string()),
                head_ref.target().map(|oid| oid.to_string()),
            ),
            Err(_) => (None, None),
        },
        Err(_) => (None, None),
    };
    GitWorktree { path, branch, head }
}

/// Prune worktree registrations whose directories have vanished.
pub fn prune_worktrees(repo_path: &Path) -> Result<()> {
    let repo = Repository::open(repo_path)?;
    let worktrees = repo.worktrees()?;

    for wt_name in worktrees.iter().flatten() {
        if let Ok(wt) = repo.find_worktree(wt_name) {
            if wt.validate().is_err() {
                wt.prune(Some(&mut WorktreePruneOptions::new()))?;
            }
        }
    }

    Ok(())
}
