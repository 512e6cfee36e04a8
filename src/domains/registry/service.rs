use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use uuid::Uuid;

use super::database::Database;
use super::db_worktrees::WorktreeMethods;
use super::entity::{LifecycleState, Worktree};
use super::lock;
use crate::domains::config::ProjectConfig;
use crate::domains::git;
use crate::domains::lifecycle::{
    link_shared_files, run_phase, HookContext, HookPhase, HookResult, HookStatus,
};
use crate::domains::session::SessionOrchestrator;
use crate::domains::tracker::{IssueEnricher, SystemCommandRunner};

#[derive(Debug)]
pub enum RegistryError {
    InvalidBranch { branch: String, reason: String },
    AlreadyExists { branch: String },
    NotFound { branch: String },
    /// Another transition is already in flight for this identity. The
    /// caller must retry; requests are never queued.
    ConcurrencyConflict { branch: String },
    GitOperationFailed { operation: String, source: anyhow::Error },
    CleanupHooksFailed { branch: String },
    Database(anyhow::Error),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::InvalidBranch { branch, reason } => {
                write!(f, "Invalid branch name {branch:?}: {reason}")
            }
            RegistryError::AlreadyExists { branch } => {
                write!(f, "A worktree for branch '{branch}' already exists")
            }
            RegistryError::NotFound { branch } => {
                write!(f, "No worktree registered for branch '{branch}'")
            }
            RegistryError::ConcurrencyConflict { branch } => {
                write!(f, "Another operation is already running for branch '{branch}'")
            }
            RegistryError::GitOperationFailed { operation, source } => {
                write!(f, "Git {operation} failed: {source}")
            }
            RegistryError::CleanupHooksFailed { branch } => write!(
                f,
                "Cleanup hooks failed for branch '{branch}'; worktree kept (use --force to remove anyway)"
            ),
            RegistryError::Database(err) => write!(f, "Registry database error: {err}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::GitOperationFailed { source, .. } => Some(source.as_ref()),
            RegistryError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for RegistryError {
    fn from(value: anyhow::Error) -> Self {
        RegistryError::Database(value)
    }
}

#[derive(Debug, Default, Clone)]
pub struct CreateOptions {
    /// Base branch to create from; defaults to the project base branch.
    pub base_branch: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct RemoveOptions {
    /// Proceed past cleanup hook failures and uncommitted changes.
    pub force: bool,
    /// Also delete the local branch after the worktree is gone.
    pub delete_branch: bool,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub adopted: Vec<String>,
    pub orphaned: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.adopted.is_empty() && self.orphaned.is_empty()
    }
}

/// Source of truth for known worktrees. Reconciles configuration
/// against the actual git state and drives external side effects
/// (branch creation, symlinking, hooks, sessions) in a recoverable
/// order, folding outcomes back into registry metadata.
pub struct WorktreeRegistry {
    db: Database,
    config: ProjectConfig,
    sessions: SessionOrchestrator,
    enricher: IssueEnricher,
}

impl WorktreeRegistry {
    pub fn new(db: Database, config: ProjectConfig) -> Self {
        log::debug!(
            "Creating WorktreeRegistry for {} ({})",
            config.project.name,
            config.project.main_repo.display()
        );
        let sessions = SessionOrchestrator::from_config(&config);
        let enricher = IssueEnricher::from_config(&config);
        Self { db, config, sessions, enricher }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionOrchestrator {
        &self.sessions
    }

    pub fn enricher(&self) -> &IssueEnricher {
        &self.enricher
    }

    fn repo_path(&self) -> &Path {
        &self.config.project.main_repo
    }

    fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.config.lifecycle.hook_timeout_secs)
    }

    /// Deterministic worktree path: always a direct descendant of the
    /// configured base directory.
    pub fn worktree_path_for(&self, branch: &str) -> PathBuf {
        self.config
            .worktree_base
            .join(git::sanitize_branch_for_path(branch))
    }

    fn hook_context(&self, worktree: &Worktree) -> HookContext {
        HookContext {
            worktree_path: worktree.path.clone(),
            branch: worktree.branch.clone(),
            project: self.config.project.name.clone(),
            issue_reference: worktree.issue_reference.clone(),
        }
    }

    fn transition(&self, worktree: &mut Worktree, state: LifecycleState) -> Result<(), RegistryError> {
        log::debug!(
            "Worktree '{}': {} -> {}",
            worktree.branch,
            worktree.state.as_str(),
            state.as_str()
        );
        worktree.state = state;
        worktree.updated_at = Utc::now();
        self.db.update_worktree_state(&worktree.id, state)?;
        Ok(())
    }

    pub async fn create(
        &self,
        branch: &str,
        options: CreateOptions,
    ) -> Result<Worktree, RegistryError> {
        let _guard = lock::try_acquire(self.repo_path(), branch).ok_or_else(|| {
            RegistryError::ConcurrencyConflict { branch: branch.to_string() }
        })?;

        git::validate_branch_name(branch).map_err(|e| RegistryError::InvalidBranch {
            branch: branch.to_string(),
            reason: e.to_string(),
        })?;

        if self.db.try_get_worktree(self.repo_path(), branch)?.is_some() {
            return Err(RegistryError::AlreadyExists { branch: branch.to_string() });
        }

        match git::repository_has_commits(self.repo_path()) {
            Ok(true) => {}
            Ok(false) => {
                return Err(RegistryError::GitOperationFailed {
                    operation: "worktree add".into(),
                    source: anyhow!("repository has no commits; create an initial commit first"),
                });
            }
            Err(e) => {
                return Err(RegistryError::GitOperationFailed {
                    operation: "worktree add".into(),
                    source: e,
                });
            }
        }

        log::info!(
            "Creating worktree for branch '{branch}' in project '{}'",
            self.config.project.name
        );

        let now = Utc::now();
        let mut worktree = Worktree {
            id: Uuid::new_v4().to_string(),
            branch: branch.to_string(),
            path: self.worktree_path_for(branch),
            state: LifecycleState::Requested,
            created_at: now,
            updated_at: now,
            issue_reference: None,
            session: None,
            last_error: None,
        };
        self.db.upsert_worktree(self.repo_path(), &worktree)?;

        let base = options
            .base_branch
            .unwrap_or_else(|| self.config.project.base_branch.clone());
        if let Err(e) = git::create_worktree(self.repo_path(), branch, &worktree.path, &base) {
            // No dangling entry on git failure: the record is discarded
            let _ = self.db.delete_worktree(&worktree.id);
            return Err(RegistryError::GitOperationFailed {
                operation: "worktree add".into(),
                source: e,
            });
        }
        self.transition(&mut worktree, LifecycleState::GitCreated)?;

        // Best-effort enrichment, resolved before hooks so they see the
        // issue reference in their environment.
        if let Some(reference) = self.enricher.annotate(branch, &SystemCommandRunner) {
            log::info!("Linked '{branch}' to {reference}");
            self.db.set_worktree_issue(&worktree.id, &reference)?;
            worktree.issue_reference = Some(reference);
        }

        self.transition(&mut worktree, LifecycleState::HooksRunning)?;
        let mut results = link_shared_files(
            &self.config.project.main_repo,
            &worktree.path,
            &self.config.symlinks,
        );
        let ctx = self.hook_context(&worktree);
        let report = run_phase(
            &ctx,
            &self.config.lifecycle.on_create,
            HookPhase::OnCreate,
            self.hook_timeout(),
        )
        .await;
        let hooks_ok = report.succeeded();
        results.extend(report.results);
        self.db.save_hook_results(&worktree.id, &results)?;

        if !hooks_ok {
            // The worktree directory already exists and may hold partial
            // work; it stays usable for manual recovery.
            let summary = summarize_failure(&results);
            log::warn!("Setup hooks failed for '{branch}': {summary}");
            worktree.last_error = Some(summary);
            self.db
                .set_worktree_error(&worktree.id, worktree.last_error.as_deref())?;
            self.transition(&mut worktree, LifecycleState::Failed)?;
            return Ok(worktree);
        }

        self.transition(&mut worktree, LifecycleState::SessionPending)?;
        match self.sessions.ensure_session(branch, &worktree.path).await {
            Ok(Some(handle)) => {
                self.db
                    .set_worktree_session(&worktree.id, Some(&handle.name))?;
                worktree.session = Some(handle);
            }
            Ok(None) => {}
            // The worktree is fully usable without a session
            Err(e) => log::warn!("Session creation failed for '{branch}': {e}"),
        }

        self.transition(&mut worktree, LifecycleState::Ready)?;
        log::info!("Worktree ready: {}", worktree.path.display());
        Ok(worktree)
    }

    pub async fn remove(
        &self,
        branch: &str,
        options: RemoveOptions,
    ) -> Result<(), RegistryError> {
        let _guard = lock::try_acquire(self.repo_path(), branch).ok_or_else(|| {
            RegistryError::ConcurrencyConflict { branch: branch.to_string() }
        })?;

        let Some(mut worktree) = self.db.try_get_worktree(self.repo_path(), branch)? else {
            return Err(RegistryError::NotFound { branch: branch.to_string() });
        };

        log::info!("Removing worktree for branch '{branch}'");
        self.transition(&mut worktree, LifecycleState::Removing)?;

        // Cleanup hooks run before git removal so they still see the
        // worktree directory.
        self.transition(&mut worktree, LifecycleState::CleanupRunning)?;
        if worktree.path.is_dir() {
            let ctx = self.hook_context(&worktree);
            let report = run_phase(
                &ctx,
                &self.config.lifecycle.on_cleanup,
                HookPhase::OnCleanup,
                self.hook_timeout(),
            )
            .await;
            self.db.save_hook_results(&worktree.id, &report.results)?;

            if !report.succeeded() {
                if options.force {
                    // An unreachable hook must never block branch
                    // deletion indefinitely.
                    log::warn!("Cleanup hooks failed for '{branch}', proceeding (force)");
                } else {
                    let summary = summarize_failure(&report.results);
                    self.db.set_worktree_error(&worktree.id, Some(&summary))?;
                    self.transition(&mut worktree, LifecycleState::Failed)?;
                    return Err(RegistryError::CleanupHooksFailed {
                        branch: branch.to_string(),
                    });
                }
            }
        } else {
            log::warn!(
                "Worktree directory missing, skipping cleanup hooks: {}",
                worktree.path.display()
            );
        }

        let session = worktree.session.clone().or_else(|| {
            self.sessions.enabled().then(|| crate::domains::session::SessionHandle {
                name: self.sessions.session_name(branch),
            })
        });
        if let Some(handle) = session {
            if let Err(e) = self.sessions.teardown_session(&handle).await {
                log::warn!("Failed to tear down session '{}': {e}", handle.name);
            }
        }

        if worktree.path.exists() || worktree_registered(self.repo_path(), &worktree.path) {
            if let Err(e) = git::remove_worktree(self.repo_path(), &worktree.path, options.force) {
                self.db.set_worktree_error(&worktree.id, Some(&e.to_string()))?;
                self.transition(&mut worktree, LifecycleState::Failed)?;
                return Err(RegistryError::GitOperationFailed {
                    operation: "worktree remove".into(),
                    source: e,
                });
            }
        }
        self.transition(&mut worktree, LifecycleState::GitRemoved)?;

        if options.delete_branch {
            match git::branch_exists(self.repo_path(), branch) {
                Ok(true) => {
                    if let Err(e) = git::delete_branch(self.repo_path(), branch) {
                        log::warn!("Failed to delete branch '{branch}': {e}");
                    }
                }
                Ok(false) => log::debug!("Branch '{branch}' already gone"),
                Err(e) => log::warn!("Could not check branch '{branch}': {e}"),
            }
        }

        // Gone: the entry is only dropped after cleanup hooks and git
        // removal both finished (or were force-skipped).
        self.db.delete_worktree(&worktree.id)?;
        log::info!("Worktree removed: {branch}");
        Ok(())
    }

    /// Snapshot of last-reconciled state. Does not probe the
    /// filesystem; call `reconcile` first for a converged view.
    pub fn list(&self) -> Result<Vec<Worktree>, RegistryError> {
        Ok(self.db.list_worktrees(self.repo_path())?)
    }

    pub fn hook_results(&self, branch: &str) -> Result<Vec<HookResult>, RegistryError> {
        let Some(worktree) = self.db.try_get_worktree(self.repo_path(), branch)? else {
            return Err(RegistryError::NotFound { branch: branch.to_string() });
        };
        Ok(self.db.list_hook_results(&worktree.id)?)
    }

    /// Converge registry metadata with the live git worktree listing:
    /// adopt worktrees created behind our back, flag records whose
    /// directory vanished. Handles external `git worktree` use without
    /// corrupting state.
    pub fn reconcile(&self) -> Result<ReconcileReport, RegistryError> {
        let git_worktrees = git::list_worktrees(self.repo_path()).map_err(|e| {
            RegistryError::GitOperationFailed { operation: "worktree list".into(), source: e }
        })?;
        let records = self.db.list_worktrees(self.repo_path())?;

        let main_workdir = self
            .repo_path()
            .canonicalize()
            .unwrap_or_else(|_| self.repo_path().to_path_buf());

        let mut report = ReconcileReport::default();

        for git_wt in &git_worktrees {
            let canonical = git_wt
                .path
                .canonicalize()
                .unwrap_or_else(|_| git_wt.path.clone());
            if canonical == main_workdir {
                continue;
            }
            let Some(branch) = &git_wt.branch else { continue };
            let known = records
                .iter()
                .any(|r| &r.branch == branch || r.path == git_wt.path);
            if known {
                continue;
            }

            log::info!("Adopting untracked worktree '{branch}' at {}", git_wt.path.display());
            let now = Utc::now();
            let adopted = Worktree {
                id: Uuid::new_v4().to_string(),
                branch: branch.clone(),
                path: git_wt.path.clone(),
                // Unknown provenance; treated as fully set up
                state: LifecycleState::Ready,
                created_at: now,
                updated_at: now,
                issue_reference: None,
                session: None,
                last_error: None,
            };
            self.db.upsert_worktree(self.repo_path(), &adopted)?;
            report.adopted.push(branch.clone());
        }

        for record in &records {
            if record.state.is_tearing_down() || record.state == LifecycleState::Orphaned {
                continue;
            }
            if !record.path.exists() {
                log::warn!(
                    "Worktree path missing for '{}', flagging as orphaned: {}",
                    record.branch,
                    record.path.display()
                );
                self.db
                    .update_worktree_state(&record.id, LifecycleState::Orphaned)?;
                report.orphaned.push(record.branch.clone());
            }
        }

        // Drop stale git registrations for pruned directories; the
        // flagged registry records stay for the user to act on.
        if let Err(e) = git::prune_worktrees(self.repo_path()) {
            log::warn!("Failed to prune stale git worktree registrations: {e}");
        }

        Ok(report)
    }
}

fn worktree_registered(repo_path: &Path, worktree_path: &Path) -> bool {
    git::list_worktrees(repo_path)
        .map(|entries| entries.iter().any(|wt| wt.path == worktree_path))
        .unwrap_or(false)
}

fn summarize_failure(results: &[HookResult]) -> String {
    results
        .iter()
        .rev()
        .find(|r| matches!(r.status, HookStatus::Failed | HookStatus::Timeout | HookStatus::Interrupted))
        .map(|r| {
            let detail = if r.stderr.trim().is_empty() {
                r.stdout.trim()
            } else {
                r.stderr.trim()
            };
            format!("{} hook '{}' {}: {detail}", r.phase.as_str(), r.command, r.status.as_str())
        })
        .unwrap_or_else(|| "hook phase failed".to_string())
}
