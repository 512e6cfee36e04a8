use anyhow::{anyhow, Result};
use git2::{BranchType, Repository};
use std::path::Path;

pub fn branch_exists(repo_path: &Path, branch_name: &str) -> Result<bool> {
    let repo = Repository::open(repo_path)?;

    let result = match repo.find_branch(branch_name, BranchType::Local) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        // Treat corrupted branches as non-existent
        Err(e)
            if e.code() == git2::ErrorCode::InvalidSpec
                || e.code() == git2::ErrorCode::GenericError =>
        {
            Ok(false)
        }
        Err(e) => Err(anyhow!("Error checking branch existence: {e}")),
    };
    result
}

pub fn delete_branch(repo_path: &Path, branch_name: &str) -> Result<()> {
    let repo = Repository::open(repo_path)?;

    let mut branch = repo
        .find_branch(branch_name, BranchType::Local)
        .map_err(|e| anyhow!("Failed to delete branch {branch_name}: {e}"))?;

    branch
        .delete()
        .map_err(|e| anyhow!("Failed to delete branch {branch_name}: {e}"))?;

    Ok(())
}

pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("Branch name cannot be empty"));
    }
    if name.contains("..") || name.contains('\0') || name.contains('\\') {
        return Err(anyhow!("Invalid branch name"));
    }
    if name.starts_with('/') || name.ends_with('/') || name.ends_with(".lock") {
        return Err(anyhow!("Invalid branch name"));
    }
    // Basic character whitelist (matches common git rules without being overly strict)
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.');
    if !name.chars().all(allowed) {
        return Err(anyhow!("Branch name contains invalid characters"));
    }
    Ok(())
}

/// Directory name for a branch's worktree: path separators and dots
/// collapse to hyphens so every branch maps to a single flat directory.
pub fn sanitize_branch_for_path(branch: &str) -> String {
    branch
        .chars()
        .map(|c| if matches!(c, '/' | '.' | ':') { '-' } else { c })
        .collect()
}
