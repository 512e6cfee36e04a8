use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::domains::session::SessionHandle;

/// Lifecycle state machine for a worktree. Happy path:
/// Requested -> GitCreated -> HooksRunning -> SessionPending -> Ready.
/// Failed is reachable from any non-terminal state. Teardown:
/// Removing -> CleanupRunning -> GitRemoved -> Gone (the record is
/// deleted at Gone, so it is never stored).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Requested,
    GitCreated,
    HooksRunning,
    SessionPending,
    Ready,
    Failed,
    /// Registry entry whose filesystem path vanished underneath it.
    Orphaned,
    Removing,
    CleanupRunning,
    GitRemoved,
    Gone,
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Requested => "requested",
            LifecycleState::GitCreated => "git-created",
            LifecycleState::HooksRunning => "hooks-running",
            LifecycleState::SessionPending => "session-pending",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
            LifecycleState::Orphaned => "orphaned",
            LifecycleState::Removing => "removing",
            LifecycleState::CleanupRunning => "cleanup-running",
            LifecycleState::GitRemoved => "git-removed",
            LifecycleState::Gone => "gone",
        }
    }

    /// A record already mid-teardown; reconciliation leaves these alone.
    pub fn is_tearing_down(&self) -> bool {
        matches!(
            self,
            LifecycleState::Removing
                | LifecycleState::CleanupRunning
                | LifecycleState::GitRemoved
        )
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(LifecycleState::Requested),
            "git-created" => Ok(LifecycleState::GitCreated),
            "hooks-running" => Ok(LifecycleState::HooksRunning),
            "session-pending" => Ok(LifecycleState::SessionPending),
            "ready" => Ok(LifecycleState::Ready),
            "failed" => Ok(LifecycleState::Failed),
            "orphaned" => Ok(LifecycleState::Orphaned),
            "removing" => Ok(LifecycleState::Removing),
            "cleanup-running" => Ok(LifecycleState::CleanupRunning),
            "git-removed" => Ok(LifecycleState::GitRemoved),
            "gone" => Ok(LifecycleState::Gone),
            _ => Err(format!("Invalid lifecycle state: {s}")),
        }
    }
}

/// One registered worktree. Identity is the branch name, unique within
/// a project; the filesystem path derives deterministically from the
/// configured base directory and is always a descendant of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worktree {
    pub id: String,
    pub branch: String,
    pub path: PathBuf,
    pub state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub issue_reference: Option<String>,
    pub session: Option<SessionHandle>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_strings() {
        let states = [
            LifecycleState::Requested,
            LifecycleState::GitCreated,
            LifecycleState::HooksRunning,
            LifecycleState::SessionPending,
            LifecycleState::Ready,
            LifecycleState::Failed,
            LifecycleState::Orphaned,
            LifecycleState::Removing,
            LifecycleState::CleanupRunning,
            LifecycleState::GitRemoved,
            LifecycleState::Gone,
        ];
        for state in states {
            assert_eq!(state.as_str().parse::<LifecycleState>().unwrap(), state);
        }
        assert!("half-created".parse::<LifecycleState>().is_err());
    }

    #[test]
    fn teardown_states_are_recognized() {
        assert!(LifecycleState::Removing.is_tearing_down());
        assert!(LifecycleState::CleanupRunning.is_tearing_down());
        assert!(LifecycleState::GitRemoved.is_tearing_down());
        assert!(!LifecycleState::Ready.is_tearing_down());
        assert!(!LifecycleState::Failed.is_tearing_down());
    }
}
