use std::path::Path;

use super::executor::{HookPhase, HookResult, HookStatus};

/// Link configured files from the main repo into a fresh worktree. Runs
/// as a pre-phase step before the user's on-create hooks. A destination
/// that already exists is left untouched and reported — worktree-local
/// edits must never be clobbered silently.
pub fn link_shared_files(
    main_repo: &Path,
    worktree_path: &Path,
    links: &[std::path::PathBuf],
) -> Vec<HookResult> {
    let mut results = Vec::with_capacity(links.len());

    for rel in links {
        let source = main_repo.join(rel);
        let dest = worktree_path.join(rel);
        let label = format!("symlink {}", rel.display());

        // symlink_metadata also catches dangling symlinks at the destination
        if dest.symlink_metadata().is_ok() {
            log::warn!(
                "Symlink destination already exists, leaving untouched: {}",
                dest.display()
            );
            results.push(entry(
                label,
                HookStatus::Warning,
                format!("destination exists, left untouched: {}", dest.display()),
            ));
            continue;
        }

        if !source.exists() {
            log::debug!("Symlink source missing in main repo: {}", source.display());
            results.push(entry(
                label,
                HookStatus::Warning,
                format!("source missing in main repo: {}", source.display()),
            ));
            continue;
        }

        let outcome = dest
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| create_symlink(&source, &dest));
        match outcome {
            Ok(()) => {
                log::info!("Linked {} -> {}", dest.display(), source.display());
                results.push(entry(label, HookStatus::Success, String::new()));
            }
            Err(e) => {
                log::warn!("Failed to link {}: {e}", dest.display());
                results.push(entry(label, HookStatus::Failed, e.to_string()));
            }
        }
    }

    results
}

#[cfg(target_family = "unix")]
fn create_symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(target_family = "windows")]
fn create_symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, dest)
    } else {
        std::os::windows::fs::symlink_file(source, dest)
    }
}

fn entry(command: String, status: HookStatus, stderr: String) -> HookResult {
    HookResult {
        command,
        phase: HookPhase::OnCreate,
        status,
        exit_code: None,
        stdout: String::new(),
        stderr,
        duration_ms: 0,
    }
}
