use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tokio::process::Command;

use crate::domains::registry::{RegistryError, Worktree, WorktreeRegistry};
use crate::domains::session::SessionLiveness;

/// One worktree joined with live probes. A read-only projection — the
/// status view never mutates registry state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub worktree: Worktree,
    pub session: SessionLiveness,
    /// Container service summary when the docker integration is enabled.
    pub services: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub project: String,
    pub collected_at: DateTime<Utc>,
    pub entries: Vec<StatusEntry>,
}

/// Join registry state with session liveness (and optionally compose
/// service status) for every worktree.
pub async fn collect(registry: &WorktreeRegistry) -> Result<StatusSnapshot, RegistryError> {
    let worktrees = registry.list()?;
    let config = registry.config();

    let services = match config.docker_settings() {
        Some(settings) => compose_running_services(&settings.compose_file).await,
        None => None,
    };

    let mut entries = Vec::with_capacity(worktrees.len());
    for worktree in worktrees {
        let session_name = worktree
            .session
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| registry.sessions().session_name(&worktree.branch));
        let session = registry.sessions().probe(&session_name).await;

        entries.push(StatusEntry {
            worktree,
            session,
            services: services.clone(),
        });
    }

    Ok(StatusSnapshot {
        project: config.project.name.clone(),
        collected_at: Utc::now(),
        entries,
    })
}

/// Best-effort `docker compose ps` summary; any failure reads as no
/// information rather than an error.
async fn compose_running_services(compose_file: &Path) -> Option<String> {
    if which::which("docker").is_err() {
        return None;
    }

    let file = compose_file.to_string_lossy();
    let output = Command::new("docker")
        .args([
            "compose",
            "-f",
            file.as_ref(),
            "ps",
            "--services",
            "--status",
            "running",
        ])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        log::debug!(
            "docker compose ps failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let running = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count();
    Some(format!("{running} running"))
}
