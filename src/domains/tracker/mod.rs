use std::io;
use std::path::Path;
use std::process::Command as StdCommand;

use serde::Deserialize;

use crate::domains::config::{GraphiteConfig, LinearSettings, ProjectConfig};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.unwrap_or_default() == 0
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        current_dir: Option<&Path>,
    ) -> io::Result<CommandOutput>;
}

pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        current_dir: Option<&Path>,
    ) -> io::Result<CommandOutput> {
        let mut cmd = StdCommand::new(program);
        cmd.args(args);
        if let Some(dir) = current_dir {
            cmd.current_dir(dir);
        }
        let output = cmd.output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PrView {
    url: String,
}

/// Best-effort issue/PR annotation for worktree metadata. Deliberately
/// isolated from the lifecycle state machine: every failure here
/// degrades to a debug log, never an error.
pub struct IssueEnricher {
    linear: Option<LinearSettings>,
    github_repo: Option<String>,
    graphite_enabled: bool,
}

impl IssueEnricher {
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            linear: config.linear_settings().cloned(),
            github_repo: config.project.github_repo.clone(),
            graphite_enabled: matches!(config.graphite, GraphiteConfig::Enabled),
        }
    }

    /// Resolve a branch name to an issue reference or PR URL, whichever
    /// the enabled integrations yield first.
    pub fn annotate(&self, branch: &str, runner: &dyn CommandRunner) -> Option<String> {
        if let Some(settings) = &self.linear {
            if settings.api_key.is_empty() {
                log::debug!("Linear credential is empty, skipping issue lookup");
            } else if let Some(reference) = linear_ref_from_branch(branch, &settings.team_keys) {
                return Some(reference);
            }
        }

        if self.github_repo.is_some() || self.graphite_enabled {
            if let Some(url) = self.pr_url_for_branch(branch, runner) {
                return Some(url);
            }
        }

        None
    }

    /// Browser URL for a previously recorded reference, when one can be
    /// derived.
    pub fn issue_url(&self, reference: &str) -> Option<String> {
        if reference.starts_with("https://") {
            return Some(reference.to_string());
        }
        let settings = self.linear.as_ref()?;
        let workspace = settings.workspace.as_ref()?;
        Some(format!("https://linear.app/{workspace}/issue/{reference}"))
    }

    fn pr_url_for_branch(&self, branch: &str, runner: &dyn CommandRunner) -> Option<String> {
        if which::which("gh").is_err() {
            log::debug!("gh CLI not installed, skipping PR lookup");
            return None;
        }

        let mut args = vec!["pr", "view", branch, "--json", "url"];
        if let Some(repo) = &self.github_repo {
            args.extend(["--repo", repo]);
        }

        match runner.run("gh", &args, None) {
            Ok(output) if output.success() => {
                match serde_json::from_str::<PrView>(&output.stdout) {
                    Ok(view) => Some(view.url),
                    Err(e) => {
                        log::debug!("Unparseable gh pr view output for {branch}: {e}");
                        None
                    }
                }
            }
            Ok(output) => {
                log::debug!(
                    "No PR found for {branch} (gh exited {:?}): {}",
                    output.status,
                    output.stderr.trim()
                );
                None
            }
            Err(e) => {
                log::debug!("Failed to invoke gh for {branch}: {e}");
                None
            }
        }
    }
}

/// Parse a Linear-style issue reference (e.g. "ENG-142") out of a branch
/// name such as "eng-142-fix-login" or "feature/eng-142-fix-login".
fn linear_ref_from_branch(branch: &str, team_keys: &[String]) -> Option<String> {
    for segment in branch.split('/') {
        let mut parts = segment.splitn(3, '-');
        let (Some(team), Some(number)) = (parts.next(), parts.next()) else {
            continue;
        };
        if team.len() < 2 || team.len() > 5 || !team.chars().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let team_upper = team.to_ascii_uppercase();
        if !team_keys.is_empty()
            && !team_keys.iter().any(|k| k.eq_ignore_ascii_case(&team_upper))
        {
            continue;
        }
        return Some(format!("{team_upper}-{number}"));
    }
    None
}
