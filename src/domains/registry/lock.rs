use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

static TRANSITION_LOCKS: Lazy<DashMap<String, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

/// At-most-one in-flight lifecycle transition per worktree identity.
/// Fails fast instead of queueing — the caller surfaces a conflict and
/// retries.
pub fn try_acquire(repo_path: &Path, branch: &str) -> Option<OwnedMutexGuard<()>> {
    let key = format!("{}::{branch}", repo_path.display());
    let entry = TRANSITION_LOCKS
        .entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(())));
    let lock = entry.value().clone();

    lock.try_lock_owned().ok()
}
