use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Environment handed to every hook command.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub worktree_path: PathBuf,
    pub branch: String,
    pub project: String,
    pub issue_reference: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HookPhase {
    OnCreate,
    OnCleanup,
}

impl HookPhase {
    pub fn as_str(&self) -> &str {
        match self {
            HookPhase::OnCreate => "on-create",
            HookPhase::OnCleanup => "on-cleanup",
        }
    }
}

impl FromStr for HookPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on-create" => Ok(HookPhase::OnCreate),
            "on-cleanup" => Ok(HookPhase::OnCleanup),
            _ => Err(format!("Invalid hook phase: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    Success,
    Failed,
    Timeout,
    /// Non-fatal condition worth surfacing (e.g. a symlink destination
    /// that already existed and was left untouched).
    Warning,
    Interrupted,
}

impl HookStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HookStatus::Success => "success",
            HookStatus::Failed => "failed",
            HookStatus::Timeout => "timeout",
            HookStatus::Warning => "warning",
            HookStatus::Interrupted => "interrupted",
        }
    }
}

impl FromStr for HookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(HookStatus::Success),
            "failed" => Ok(HookStatus::Failed),
            "timeout" => Ok(HookStatus::Timeout),
            "warning" => Ok(HookStatus::Warning),
            "interrupted" => Ok(HookStatus::Interrupted),
            _ => Err(format!("Invalid hook status: {s}")),
        }
    }
}

/// Outcome of one executed (or attempted) lifecycle command. Retained
/// for diagnostics regardless of success; never authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResult {
    pub command: String,
    pub phase: HookPhase,
    pub status: HookStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl HookResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, HookStatus::Success | HookStatus::Warning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    /// A command failed or timed out; the rest of the phase was skipped.
    Halted,
    /// An external signal stopped the phase mid-command.
    Interrupted,
}

#[derive(Debug)]
pub struct PhaseReport {
    pub outcome: PhaseOutcome,
    pub results: Vec<HookResult>,
}

impl PhaseReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, PhaseOutcome::Completed)
    }
}

/// Run a phase's commands strictly in declared order in the worktree's
/// directory. The first failure stops the phase; commands that never ran
/// are not recorded. Completed side effects are not reversed — hooks are
/// expected to be idempotent or self-cleaning.
pub async fn run_phase(
    ctx: &HookContext,
    commands: &[String],
    phase: HookPhase,
    timeout: Duration,
) -> PhaseReport {
    let mut results = Vec::with_capacity(commands.len());
    let mut outcome = PhaseOutcome::Completed;

    for command in commands {
        log::info!("Running {} hook: {command}", phase.as_str());
        let (result, interrupted) = run_command(ctx, command, phase, timeout).await;
        let ok = result.is_success();
        results.push(result);

        if interrupted {
            outcome = PhaseOutcome::Interrupted;
            break;
        }
        if !ok {
            log::warn!("Hook failed, skipping remaining {} commands", phase.as_str());
            outcome = PhaseOutcome::Halted;
            break;
        }
    }

    PhaseReport { outcome, results }
}

async fn run_command(
    ctx: &HookContext,
    command: &str,
    phase: HookPhase,
    timeout: Duration,
) -> (HookResult, bool) {
    let started = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(&ctx.worktree_path)
        .env("FWTS_PROJECT", &ctx.project)
        .env("FWTS_BRANCH", &ctx.branch)
        .env("FWTS_WORKTREE_PATH", &ctx.worktree_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(issue) = &ctx.issue_reference {
        cmd.env("FWTS_ISSUE", issue);
    }
    #[cfg(target_family = "unix")]
    cmd.process_group(0);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return (
                HookResult {
                    command: command.to_string(),
                    phase,
                    status: HookStatus::Failed,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn: {e}"),
                    duration_ms: started.elapsed().as_millis() as u64,
                },
                false,
            );
        }
    };
    let pid = child.id();

    let mut interrupted = false;
    let result = tokio::select! {
        waited = tokio::time::timeout(timeout, child.wait_with_output()) => match waited {
            Ok(Ok(output)) => {
                let status = if output.status.success() {
                    HookStatus::Success
                } else {
                    HookStatus::Failed
                };
                HookResult {
                    command: command.to_string(),
                    phase,
                    status,
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Ok(Err(e)) => HookResult {
                command: command.to_string(),
                phase,
                status: HookStatus::Failed,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("failed to collect output: {e}"),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(_) => {
                log::warn!("Hook timed out after {}s: {command}", timeout.as_secs());
                kill_process_group(pid);
                HookResult {
                    command: command.to_string(),
                    phase,
                    status: HookStatus::Timeout,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {}s", timeout.as_secs()),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        },
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted while running hook: {command}");
            kill_process_group(pid);
            interrupted = true;
            HookResult {
                command: command.to_string(),
                phase,
                status: HookStatus::Interrupted,
                exit_code: None,
                stdout: String::new(),
                stderr: "interrupted by signal".into(),
                duration_ms: started.elapsed().as_millis() as u64,
            }
        }
    };

    (result, interrupted)
}

/// Hooks run in their own process group so a timed-out command cannot
/// leave orphaned children behind.
#[cfg(target_family = "unix")]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let pgid = pid as libc::pid_t;
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::warn!("Failed to kill process group {pgid}: {err}");
        }
    }
}

#[cfg(not(target_family = "unix"))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_ctx(dir: &TempDir) -> HookContext {
        HookContext {
            worktree_path: dir.path().to_path_buf(),
            branch: "feature-x".into(),
            project: "demo".into(),
            issue_reference: None,
        }
    }

    fn default_timeout() -> Duration {
        Duration::from_secs(30)
    }

    #[tokio::test]
    async fn commands_run_in_order_and_capture_output() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir);

        let report = run_phase(
            &ctx,
            &["echo first".into(), "echo second".into()],
            HookPhase::OnCreate,
            default_timeout(),
        )
        .await;

        assert!(report.succeeded());
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].stdout, "first\n");
        assert_eq!(report.results[1].stdout, "second\n");
        assert_eq!(report.results[0].status, HookStatus::Success);
    }

    #[tokio::test]
    async fn first_failure_stops_the_phase() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir);

        let report = run_phase(
            &ctx,
            &[
                "echo one".into(),
                "false".into(),
                "touch never-created.txt".into(),
            ],
            HookPhase::OnCreate,
            default_timeout(),
        )
        .await;

        assert_eq!(report.outcome, PhaseOutcome::Halted);
        // h3 never executes: exactly two results recorded.
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].status, HookStatus::Success);
        assert_eq!(report.results[1].status, HookStatus::Failed);
        assert_eq!(report.results[1].exit_code, Some(1));
        assert!(!dir.path().join("never-created.txt").exists());
    }

    #[tokio::test]
    async fn completed_side_effects_are_not_reversed() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir);

        let report = run_phase(
            &ctx,
            &["touch applied.txt".into(), "false".into()],
            HookPhase::OnCreate,
            default_timeout(),
        )
        .await;

        assert_eq!(report.outcome, PhaseOutcome::Halted);
        assert!(dir.path().join("applied.txt").exists());
    }

    #[tokio::test]
    async fn timed_out_command_is_recorded_as_timeout() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir);

        let report = run_phase(
            &ctx,
            &["sleep 30".into(), "echo after".into()],
            HookPhase::OnCleanup,
            Duration::from_millis(300),
        )
        .await;

        assert_eq!(report.outcome, PhaseOutcome::Halted);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].status, HookStatus::Timeout);
        assert!(report.results[0].duration_ms >= 250);
    }

    #[tokio::test]
    async fn context_is_injected_into_the_environment() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_ctx(&dir);
        ctx.issue_reference = Some("ENG-42".into());

        let report = run_phase(
            &ctx,
            &["printf '%s %s %s' \"$FWTS_PROJECT\" \"$FWTS_BRANCH\" \"$FWTS_ISSUE\"".into()],
            HookPhase::OnCreate,
            default_timeout(),
        )
        .await;

        assert!(report.succeeded());
        assert_eq!(report.results[0].stdout, "demo feature-x ENG-42");
    }

    #[tokio::test]
    async fn commands_run_in_the_worktree_directory() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir);

        let report = run_phase(
            &ctx,
            &["pwd".into()],
            HookPhase::OnCreate,
            default_timeout(),
        )
        .await;

        let printed = report.results[0].stdout.trim();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(printed).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn empty_phase_completes_with_no_results() {
        let dir = TempDir::new().unwrap();
        let ctx = test_ctx(&dir);

        let report = run_phase(&ctx, &[], HookPhase::OnCreate, default_timeout()).await;
        assert!(report.succeeded());
        assert!(report.results.is_empty());
    }
}
