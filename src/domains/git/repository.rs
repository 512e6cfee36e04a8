use anyhow::{anyhow, Result};
use git2::Repository;
use std::path::Path;

pub fn get_commit_hash(repo_path: &Path, reference: &str) -> Result<String> {
    let repo = Repository::open(repo_path)?;

    // Prefer local branch, fall back to origin/<reference>
    let candidates = [
        format!("refs/heads/{reference}"),
        format!("refs/remotes/origin/{reference}"),
    ];

    for name in &candidates {
        if let Ok(git_ref) = repo.find_reference(name) {
            if let Some(oid) = git_ref.target() {
                return Ok(oid.to_string());
            }
        }
    }

    // Allow raw revspecs (tags, commit ids)
    let obj = repo
        .revparse_single(reference)
        .map_err(|e| anyhow!("Reference '{reference}' not found: {e}"))?;
    Ok(obj.id().to_string())
}

pub fn get_current_branch(repo_path: &Path) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    let head = repo.head()?;
    head.shorthand()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("HEAD is not a named branch"))
}

pub fn repository_has_commits(repo_path: &Path) -> Result<bool> {
    let repo = Repository::open(repo_path)?;
    let result = match repo.head() {
        Ok(head) => Ok(head.target().is_some()),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(false),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        Err(e) => Err(anyhow!("Failed to read HEAD: {e}")),
    };
    result
}

pub fn has_uncommitted_changes(worktree_path: &Path) -> Result<bool> {
    let repo = Repository::open(worktree_path)?;
    let mut options = git2::StatusOptions::new();
    options.include_untracked(true);
    let statuses = repo.statuses(Some(&mut options))?;
    Ok(!statuses.is_empty())
}
