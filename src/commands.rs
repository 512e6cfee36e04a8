use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};

use crate::cli::{Cli, Commands};
use crate::domains::config::{self, paths, ProjectConfig};
use crate::domains::registry::{
    CreateOptions, Database, LifecycleState, RegistryError, RemoveOptions, WorktreeRegistry,
};
use crate::domains::status::{self, StatusSnapshot};
use crate::tui;

pub async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::New { branch, base, no_attach } => {
            let registry = open_registry(cli.config)?;
            cmd_new(&registry, &branch, base, no_attach).await
        }
        Commands::Remove { branch, force, delete_branch } => {
            let registry = open_registry(cli.config)?;
            cmd_remove(&registry, &branch, force, delete_branch).await
        }
        Commands::List { json } => {
            let registry = open_registry(cli.config)?;
            cmd_list(&registry, json)
        }
        Commands::Status => {
            let registry = open_registry(cli.config)?;
            cmd_status(&registry).await
        }
        Commands::Tui => {
            let registry = open_registry(cli.config)?;
            tui::run(&registry).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { global } => cmd_init(global, cli.config),
    }
}

fn load_project_config(explicit: Option<PathBuf>) -> Result<ProjectConfig> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            config::find_config(&cwd).ok_or_else(|| {
                anyhow!(
                    "No {} found in {} or any parent (run 'fwts init' to create one)",
                    config::loader::CONFIG_FILE_NAME,
                    cwd.display()
                )
            })?
        }
    };
    // Config errors are fatal and abort before any side effect
    config::load(&path).with_context(|| format!("Invalid config: {}", path.display()))
}

fn open_registry(explicit_config: Option<PathBuf>) -> Result<WorktreeRegistry> {
    let config = load_project_config(explicit_config)?;
    let db = Database::new(None)?;
    Ok(WorktreeRegistry::new(db, config))
}

async fn cmd_new(
    registry: &WorktreeRegistry,
    branch: &str,
    base: Option<String>,
    no_attach: bool,
) -> Result<ExitCode> {
    let worktree = registry
        .create(branch, CreateOptions { base_branch: base })
        .await?;

    match worktree.state {
        LifecycleState::Ready => {
            println!("Worktree ready: {}", worktree.path.display());
            if let Some(reference) = &worktree.issue_reference {
                match registry.enricher().issue_url(reference) {
                    Some(url) => println!("Issue: {reference} ({url})"),
                    None => println!("Issue: {reference}"),
                }
            }

            if let Some(handle) = &worktree.session {
                if no_attach || !std::io::stdout().is_terminal() {
                    println!("Session: {}", handle.name);
                } else {
                    // Replaces this process on success
                    registry.sessions().attach(handle)?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        LifecycleState::Failed => {
            eprintln!(
                "Worktree created but setup failed: {}",
                worktree.last_error.as_deref().unwrap_or("see hook diagnostics")
            );
            eprintln!("The worktree is kept at {} for manual recovery.", worktree.path.display());
            print_hook_diagnostics(registry, branch)?;
            Ok(ExitCode::FAILURE)
        }
        other => {
            eprintln!("Worktree left in unexpected state: {}", other.as_str());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_remove(
    registry: &WorktreeRegistry,
    branch: &str,
    force: bool,
    delete_branch: bool,
) -> Result<ExitCode> {
    match registry
        .remove(branch, RemoveOptions { force, delete_branch })
        .await
    {
        Ok(()) => {
            println!("Removed worktree for '{branch}'");
            Ok(ExitCode::SUCCESS)
        }
        Err(RegistryError::CleanupHooksFailed { .. }) => {
            eprintln!("Cleanup hooks failed for '{branch}'; the worktree was kept.");
            print_hook_diagnostics(registry, branch)?;
            eprintln!("Re-run with --force to remove it anyway.");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_hook_diagnostics(registry: &WorktreeRegistry, branch: &str) -> Result<()> {
    let results = match registry.hook_results(branch) {
        Ok(results) => results,
        // The record may already be gone (e.g. discarded on git failure)
        Err(RegistryError::NotFound { .. }) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for result in results {
        eprintln!(
            "  [{}] {} ({}, {}ms)",
            result.status.as_str(),
            result.command,
            result
                .exit_code
                .map(|c| format!("exit {c}"))
                .unwrap_or_else(|| "no exit code".into()),
            result.duration_ms
        );
        let detail = if result.stderr.trim().is_empty() {
            result.stdout
        } else {
            result.stderr
        };
        for line in detail.lines().take(5) {
            eprintln!("      {line}");
        }
    }
    Ok(())
}

fn cmd_list(registry: &WorktreeRegistry, json: bool) -> Result<ExitCode> {
    let worktrees = registry.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&worktrees)?);
        return Ok(ExitCode::SUCCESS);
    }

    if worktrees.is_empty() {
        println!("No worktrees registered (run 'fwts new <branch>' to create one)");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<28} {:<16} PATH", "BRANCH", "STATE");
    for worktree in worktrees {
        println!(
            "{:<28} {:<16} {}",
            worktree.branch,
            worktree.state.as_str(),
            worktree.path.display()
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(registry: &WorktreeRegistry) -> Result<ExitCode> {
    // Converge the registry with disk before projecting
    let report = registry.reconcile()?;
    for branch in &report.adopted {
        println!("Adopted untracked worktree: {branch}");
    }
    for branch in &report.orphaned {
        println!("Flagged orphaned worktree: {branch}");
    }

    let snapshot = status::collect(registry).await?;
    print_status(&snapshot);

    let any_failed = snapshot
        .entries
        .iter()
        .any(|e| e.worktree.state == LifecycleState::Failed);
    Ok(if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_status(snapshot: &StatusSnapshot) {
    println!(
        "{}: {} worktrees",
        snapshot.project,
        snapshot.entries.len()
    );
    if snapshot.entries.is_empty() {
        return;
    }

    println!(
        "{:<28} {:<16} {:<10} {:<12} {:<10} PATH",
        "BRANCH", "STATE", "SESSION", "ISSUE", "SERVICES"
    );
    for entry in &snapshot.entries {
        println!(
            "{:<28} {:<16} {:<10} {:<12} {:<10} {}",
            entry.worktree.branch,
            entry.worktree.state.as_str(),
            entry.session.as_str(),
            entry.worktree.issue_reference.as_deref().unwrap_or("-"),
            entry.services.as_deref().unwrap_or("-"),
            entry.worktree.path.display()
        );
        if let Some(error) = &entry.worktree.last_error {
            println!("    last error: {error}");
        }
    }
}

fn cmd_init(global: bool, explicit: Option<PathBuf>) -> Result<ExitCode> {
    let target = if global {
        paths::global_config_path()
    } else {
        match explicit {
            Some(path) => path,
            None => std::env::current_dir()?.join(config::loader::CONFIG_FILE_NAME),
        }
    };

    if target.exists() {
        eprintln!("Config file already exists: {}", target.display());
        return Ok(ExitCode::FAILURE);
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let cwd = std::env::current_dir()?;
    let name = cwd
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project")
        .to_string();
    let base_branch = crate::domains::git::get_current_branch(&cwd)
        .unwrap_or_else(|_| "main".to_string());

    std::fs::write(&target, starter_config(&name, &cwd, &base_branch))?;
    println!("Created {}", target.display());
    println!();
    println!("Next steps:");
    println!("  1. Review and edit the config file as needed");
    println!("  2. Run 'fwts status' to see your worktrees");
    println!("  3. Run 'fwts new <branch>' to create one");
    Ok(ExitCode::SUCCESS)
}

fn starter_config(name: &str, main_repo: &std::path::Path, base_branch: &str) -> String {
    format!(
        r#"[project]
name = "{name}"
main_repo = "{main_repo}"
base_branch = "{base_branch}"
# github_repo = "owner/name"

worktree_base = "{worktree_base}"

[tmux]
enabled = false
# editor_command = "$EDITOR"
# side_command = ""
# layout = "vertical"   # or "horizontal"

[linear]
enabled = false
# workspace = "your-workspace"
# team_keys = ["ENG"]

[graphite]
enabled = false

[lifecycle]
on_create = []
on_cleanup = []
# hook_timeout_secs = 300

symlinks = []

[docker]
enabled = false
# compose_file = "docker-compose.yml"
"#,
        name = name,
        main_repo = main_repo.display(),
        worktree_base = main_repo
            .parent()
            .unwrap_or(main_repo)
            .join(format!("{name}-worktrees"))
            .display(),
        base_branch = base_branch,
    )
}
