use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::domains::config::{ProjectConfig, TmuxSettings};

/// Weak reference to a tmux session: enough to re-attach or tear it
/// down, never ownership of the external process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionHandle {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionLiveness {
    Absent,
    Detached,
    Attached,
}

impl SessionLiveness {
    pub fn as_str(&self) -> &str {
        match self {
            SessionLiveness::Absent => "absent",
            SessionLiveness::Detached => "detached",
            SessionLiveness::Attached => "attached",
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    MultiplexerUnavailable,
    CommandFailed {
        action: String,
        status: Option<i32>,
        stderr: String,
    },
    Io(io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::MultiplexerUnavailable => write!(f, "tmux is not installed"),
            SessionError::CommandFailed { action, status, stderr } => {
                write!(f, "tmux {action} failed with status {status:?}: {stderr}")
            }
            SessionError::Io(err) => write!(f, "IO error invoking tmux: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(value: io::Error) -> Self {
        SessionError::Io(value)
    }
}

/// Drives the tmux integration for worktree sessions. A disabled
/// integration turns every operation into a no-op, so callers never
/// branch on configuration themselves.
pub struct SessionOrchestrator {
    project: String,
    settings: Option<TmuxSettings>,
}

impl SessionOrchestrator {
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            project: config.project.name.clone(),
            settings: config.tmux_settings().cloned(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.is_some()
    }

    /// Deterministic session name from project + branch. Collision-free
    /// by construction since a branch is unique per worktree.
    pub fn session_name(&self, branch: &str) -> String {
        let sanitized: String = branch
            .chars()
            .map(|c| if matches!(c, '/' | '.' | ':') { '-' } else { c })
            .collect();
        format!("{}-{sanitized}", self.project)
    }

    /// Create the session for a worktree, or return a handle to the
    /// existing one. `None` when the integration is disabled — the
    /// multiplexer is never invoked in that case.
    pub async fn ensure_session(
        &self,
        branch: &str,
        worktree_path: &Path,
    ) -> Result<Option<SessionHandle>, SessionError> {
        let Some(settings) = &self.settings else {
            return Ok(None);
        };

        if which::which("tmux").is_err() {
            return Err(SessionError::MultiplexerUnavailable);
        }

        let name = self.session_name(branch);
        if self.session_exists(&name).await? {
            log::info!("Session already exists, reusing: {name}");
            return Ok(Some(SessionHandle { name }));
        }

        let path = worktree_path.to_string_lossy();

        // Primary pane runs the editor
        let mut create_args =
            vec!["new-session", "-d", "-s", name.as_str(), "-c", path.as_ref()];
        if !settings.editor_command.is_empty() {
            create_args.push(settings.editor_command.as_str());
        }
        run_tmux("new-session", &create_args).await?;

        // Secondary pane runs the side command, split per the configured layout
        let split_flag = settings.layout.split_flag();
        let mut split_args =
            vec!["split-window", split_flag, "-t", name.as_str(), "-c", path.as_ref()];
        if !settings.side_command.is_empty() {
            split_args.push(settings.side_command.as_str());
        }
        if let Err(e) = run_tmux("split-window", &split_args).await {
            log::warn!("Failed to create side pane for {name}: {e}");
        }

        log::info!("Created session: {name}");
        Ok(Some(SessionHandle { name }))
    }

    pub async fn teardown_session(&self, handle: &SessionHandle) -> Result<(), SessionError> {
        if self.settings.is_none() {
            return Ok(());
        }
        if which::which("tmux").is_err() {
            return Err(SessionError::MultiplexerUnavailable);
        }
        if !self.session_exists(&handle.name).await? {
            return Ok(());
        }
        run_tmux("kill-session", &["kill-session", "-t", &handle.name]).await?;
        log::info!("Killed session: {}", handle.name);
        Ok(())
    }

    pub async fn session_exists(&self, name: &str) -> Result<bool, SessionError> {
        // Exit status 1 means "no such session", not a failure
        let target = format!("={name}");
        let output = Command::new("tmux")
            .args(["has-session", "-t", &target])
            .output()
            .await?;
        Ok(output.status.success())
    }

    /// Liveness probe for the status view. Never fails: any probe error
    /// reads as an absent session.
    pub async fn probe(&self, name: &str) -> SessionLiveness {
        if self.settings.is_none() || which::which("tmux").is_err() {
            return SessionLiveness::Absent;
        }

        let output = Command::new("tmux")
            .args(["list-sessions", "-F", "#{session_name}\t#{session_attached}"])
            .output()
            .await;
        let Ok(output) = output else {
            return SessionLiveness::Absent;
        };
        if !output.status.success() {
            return SessionLiveness::Absent;
        }

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let mut fields = line.split('\t');
            if fields.next() == Some(name) {
                let attached = fields
                    .next()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(0);
                return if attached > 0 {
                    SessionLiveness::Attached
                } else {
                    SessionLiveness::Detached
                };
            }
        }
        SessionLiveness::Absent
    }

    /// Attach the current terminal to a session (replaces this process
    /// on unix).
    pub fn attach(&self, handle: &SessionHandle) -> Result<(), SessionError> {
        if which::which("tmux").is_err() {
            return Err(SessionError::MultiplexerUnavailable);
        }

        // Inside tmux, attach-session nests; switch the client instead
        let inside_tmux = std::env::var_os("TMUX").is_some();
        let args: [&str; 3] = if inside_tmux {
            ["switch-client", "-t", handle.name.as_str()]
        } else {
            ["attach-session", "-t", handle.name.as_str()]
        };

        #[cfg(target_family = "unix")]
        {
            use std::os::unix::process::CommandExt;
            let err = std::process::Command::new("tmux").args(args).exec();
            Err(SessionError::Io(err))
        }
        #[cfg(not(target_family = "unix"))]
        {
            let status = std::process::Command::new("tmux").args(args).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(SessionError::CommandFailed {
                    action: "attach-session".into(),
                    status: status.code(),
                    stderr: String::new(),
                })
            }
        }
    }
}

async fn run_tmux(action: &str, args: &[&str]) -> Result<(), SessionError> {
    let output = Command::new("tmux").args(args).output().await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(SessionError::CommandFailed {
            action: action.to_string(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
