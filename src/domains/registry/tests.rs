use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use tempfile::TempDir;

use super::database::Database;
use super::entity::LifecycleState;
use super::lock;
use super::service::{CreateOptions, RegistryError, RemoveOptions, WorktreeRegistry};
use crate::domains::config::{
    DockerConfig, GraphiteConfig, LifecycleConfig, LinearConfig, ProjectConfig, ProjectSection,
    TmuxConfig,
};
use crate::domains::git;
use crate::domains::lifecycle::HookStatus;

struct TestEnvironment {
    _dir: TempDir, // Keep alive to prevent cleanup
    repo_path: PathBuf,
    db_path: PathBuf,
    worktree_base: PathBuf,
}

impl TestEnvironment {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let repo_path = dir.path().join("repo");
        let db_path = dir.path().join("test.db");
        let worktree_base = dir.path().join("worktrees");
        fs::create_dir_all(&repo_path)?;

        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("refs/heads/main");
        let repo = git2::Repository::init_opts(&repo_path, &opts)?;

        let mut config = repo.config()?;
        config.set_str("user.email", "test@example.com")?;
        config.set_str("user.name", "Test User")?;

        fs::write(repo_path.join("README.md"), "# Test Repository")?;
        fs::write(repo_path.join(".env"), "SHARED=1")?;
        let mut index = repo.index()?;
        index.add_path(std::path::Path::new("README.md"))?;
        index.add_path(std::path::Path::new(".env"))?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let signature = git2::Signature::now("Test User", "test@example.com")?;
        repo.commit(Some("HEAD"), &signature, &signature, "Initial commit", &tree, &[])?;

        Ok(Self {
            _dir: dir,
            repo_path,
            db_path,
            worktree_base,
        })
    }

    fn config(&self) -> ProjectConfig {
        ProjectConfig {
            project: ProjectSection {
                name: "demo".into(),
                main_repo: self.repo_path.clone(),
                base_branch: "main".into(),
                github_repo: None,
            },
            worktree_base: self.worktree_base.clone(),
            tmux: TmuxConfig::Disabled,
            linear: LinearConfig::Disabled,
            graphite: GraphiteConfig::Disabled,
            lifecycle: LifecycleConfig::default(),
            symlinks: Vec::new(),
            docker: DockerConfig::Disabled,
        }
    }

    fn registry(&self) -> Result<WorktreeRegistry> {
        self.registry_with(self.config())
    }

    fn registry_with(&self, config: ProjectConfig) -> Result<WorktreeRegistry> {
        let db = Database::new(Some(self.db_path.clone()))?;
        Ok(WorktreeRegistry::new(db, config))
    }
}

#[tokio::test]
async fn registry_starts_empty() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();
    assert!(registry.list().unwrap().is_empty());
}

#[tokio::test]
async fn create_produces_ready_worktree_under_base() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();

    assert_eq!(worktree.branch, "feature-x");
    assert_eq!(worktree.state, LifecycleState::Ready);
    assert_eq!(worktree.path, env.worktree_base.join("feature-x"));
    assert!(worktree.path.starts_with(&env.worktree_base));
    assert!(worktree.path.join(".git").exists());
    // Session integration disabled: no handle, multiplexer never used
    assert!(worktree.session.is_none());

    let listed = registry.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].branch, "feature-x");
    assert_eq!(listed[0].state, LifecycleState::Ready);
}

#[tokio::test]
async fn branch_with_slash_maps_to_flat_directory() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    let worktree = registry
        .create("feature/login", CreateOptions::default())
        .await
        .unwrap();

    assert_eq!(worktree.path, env.worktree_base.join("feature-login"));
    assert_eq!(worktree.state, LifecycleState::Ready);
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    let err = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyExists { .. }));
}

#[tokio::test]
async fn git_failure_leaves_no_dangling_entry() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    let err = registry
        .create(
            "feature-x",
            CreateOptions { base_branch: Some("no-such-base".into()) },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::GitOperationFailed { .. }));
    assert!(registry.list().unwrap().is_empty());
    assert!(!env.worktree_base.join("feature-x").exists());
}

#[tokio::test]
async fn create_then_remove_leaves_no_trace() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    registry
        .remove("feature-x", RemoveOptions::default())
        .await
        .unwrap();

    assert!(registry.list().unwrap().is_empty());
    assert!(!worktree.path.exists());

    // The underlying git listing likewise omits the branch
    let git_listing = git::list_worktrees(&env.repo_path).unwrap();
    assert!(!git_listing
        .iter()
        .any(|wt| wt.branch.as_deref() == Some("feature-x")));
}

#[tokio::test]
async fn remove_unknown_branch_is_not_found() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    let err = registry
        .remove("absent", RemoveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));
}

#[tokio::test]
async fn hook_failure_marks_failed_but_keeps_worktree() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config();
    config.lifecycle.on_create = vec![
        "echo preparing".into(),
        "false".into(),
        "echo never-runs".into(),
    ];
    let registry = env.registry_with(config).unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();

    // Hook failure does not roll back the git worktree
    assert_eq!(worktree.state, LifecycleState::Failed);
    assert!(worktree.path.exists());
    assert!(worktree.last_error.is_some());

    // h3 never executed: exactly two results recorded
    let results = registry.hook_results("feature-x").unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, HookStatus::Success);
    assert_eq!(results[1].status, HookStatus::Failed);

    let listed = registry.list().unwrap();
    assert_eq!(listed[0].state, LifecycleState::Failed);
}

#[tokio::test]
async fn cleanup_hook_failure_blocks_removal_without_force() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config();
    config.lifecycle.on_cleanup = vec!["false".into()];
    let registry = env.registry_with(config).unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    let err = registry
        .remove("feature-x", RemoveOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::CleanupHooksFailed { .. }));
    assert!(worktree.path.exists());
    let listed = registry.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, LifecycleState::Failed);
}

#[tokio::test]
async fn force_remove_proceeds_past_cleanup_failures() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config();
    config.lifecycle.on_cleanup = vec!["false".into()];
    let registry = env.registry_with(config).unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    registry
        .remove("feature-x", RemoveOptions { force: true, delete_branch: false })
        .await
        .unwrap();

    assert!(registry.list().unwrap().is_empty());
    assert!(!worktree.path.exists());
}

#[tokio::test]
async fn held_lock_yields_concurrency_conflict() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    let guard = lock::try_acquire(&env.repo_path, "feature-x").unwrap();
    let err = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ConcurrencyConflict { .. }));
    // Nothing reached the git layer while the lock was held
    assert!(registry.list().unwrap().is_empty());

    drop(guard);
    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(worktree.state, LifecycleState::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_create_for_same_branch_has_one_winner() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config();
    config.lifecycle.on_create = vec!["sleep 0.5".into()];
    let registry = std::sync::Arc::new(env.registry_with(config).unwrap());

    let first = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.create("feature-x", CreateOptions::default()).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let second = registry.create("feature-x", CreateOptions::default()).await;

    assert!(matches!(
        second.unwrap_err(),
        RegistryError::ConcurrencyConflict { .. }
    ));
    let winner = first.await.unwrap().unwrap();
    assert_eq!(winner.state, LifecycleState::Ready);
    assert_eq!(registry.list().unwrap().len(), 1);
}

#[tokio::test]
async fn symlink_step_never_clobbers_checked_out_files() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config();
    // .env is committed, so the checkout materializes it in the worktree;
    // .env.local exists only in the main repo.
    fs::write(env.repo_path.join(".env.local"), "LOCAL=1").unwrap();
    config.symlinks = vec![PathBuf::from(".env"), PathBuf::from(".env.local")];
    let registry = env.registry_with(config).unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(worktree.state, LifecycleState::Ready);

    // Pre-existing destination left byte-for-byte unmodified
    let env_file = worktree.path.join(".env");
    assert!(!env_file.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(&env_file).unwrap(), "SHARED=1");

    // Missing destination linked back to the main repo
    let local_file = worktree.path.join(".env.local");
    assert!(local_file.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(&local_file).unwrap(), "LOCAL=1");

    // And the skip is surfaced as a warning in the diagnostics
    let results = registry.hook_results("feature-x").unwrap();
    let warning = results
        .iter()
        .find(|r| r.command == "symlink .env")
        .unwrap();
    assert_eq!(warning.status, HookStatus::Warning);
}

#[tokio::test]
async fn reconcile_adopts_externally_created_worktrees() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    // Simulate a manual `git worktree add` outside fwts
    let manual_path = env.worktree_base.join("manual-branch");
    git::create_worktree(&env.repo_path, "manual-branch", &manual_path, "main").unwrap();

    let report = registry.reconcile().unwrap();
    assert_eq!(report.adopted, vec!["manual-branch".to_string()]);

    let listed = registry.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].branch, "manual-branch");
    assert_eq!(listed[0].state, LifecycleState::Ready);

    // A second pass converges
    assert!(registry.reconcile().unwrap().is_clean());
}

#[tokio::test]
async fn reconcile_flags_missing_paths_as_orphaned() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    fs::remove_dir_all(&worktree.path).unwrap();

    let report = registry.reconcile().unwrap();
    assert_eq!(report.orphaned, vec!["feature-x".to_string()]);

    let listed = registry.list().unwrap();
    assert_eq!(listed[0].state, LifecycleState::Orphaned);
}

#[tokio::test]
async fn reconcile_is_clean_after_managed_create() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    assert!(registry.reconcile().unwrap().is_clean());
}

#[tokio::test]
async fn remove_can_delete_the_branch_too() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();
    assert!(git::branch_exists(&env.repo_path, "feature-x").unwrap());

    registry
        .remove("feature-x", RemoveOptions { force: false, delete_branch: true })
        .await
        .unwrap();
    assert!(!git::branch_exists(&env.repo_path, "feature-x").unwrap());
}

#[tokio::test]
async fn create_from_alternate_base_branch() {
    let env = TestEnvironment::new().unwrap();
    let registry = env.registry().unwrap();

    // Cut a second branch at the current tip to use as the base
    {
        let repo = git2::Repository::open(&env.repo_path).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("develop", &head, false).unwrap();
    }

    let worktree = registry
        .create(
            "topic",
            CreateOptions { base_branch: Some("develop".into()) },
        )
        .await
        .unwrap();
    assert_eq!(worktree.state, LifecycleState::Ready);
    assert!(git::branch_exists(&env.repo_path, "topic").unwrap());
}

#[tokio::test]
async fn hooks_see_the_injected_context() {
    let env = TestEnvironment::new().unwrap();
    let mut config = env.config();
    config.lifecycle.on_create =
        vec!["printf '%s/%s' \"$FWTS_PROJECT\" \"$FWTS_BRANCH\" > context.txt".into()];
    let registry = env.registry_with(config).unwrap();

    let worktree = registry
        .create("feature-x", CreateOptions::default())
        .await
        .unwrap();

    let recorded = fs::read_to_string(worktree.path.join("context.txt")).unwrap();
    assert_eq!(recorded, "demo/feature-x");
}
