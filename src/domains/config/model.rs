use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Validated project configuration. Loaded once per process run and
/// treated as immutable for that run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    /// Directory under which every worktree path lives. Absolute,
    /// distinct from the main repo path.
    pub worktree_base: PathBuf,
    pub tmux: TmuxConfig,
    pub linear: LinearConfig,
    pub graphite: GraphiteConfig,
    pub lifecycle: LifecycleConfig,
    /// Repo-relative paths symlinked from the main repo into new worktrees.
    pub symlinks: Vec<PathBuf>,
    pub docker: DockerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSection {
    pub name: String,
    pub main_repo: PathBuf,
    pub base_branch: String,
    pub github_repo: Option<String>,
}

/// Integration blocks are tagged enabled/disabled so call sites match
/// exhaustively instead of probing flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmuxConfig {
    Disabled,
    Enabled(TmuxSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSettings {
    pub editor_command: String,
    pub side_command: String,
    pub layout: TmuxLayout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TmuxLayout {
    Vertical,
    Horizontal,
}

impl TmuxLayout {
    pub const ALLOWED: &'static [&'static str] = &["vertical", "horizontal"];

    pub fn as_str(&self) -> &str {
        match self {
            TmuxLayout::Vertical => "vertical",
            TmuxLayout::Horizontal => "horizontal",
        }
    }

    /// The tmux split-window flag producing this layout.
    pub fn split_flag(&self) -> &str {
        match self {
            TmuxLayout::Vertical => "-v",
            TmuxLayout::Horizontal => "-h",
        }
    }
}

impl FromStr for TmuxLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vertical" => Ok(TmuxLayout::Vertical),
            "horizontal" => Ok(TmuxLayout::Horizontal),
            _ => Err(format!("Invalid tmux layout: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinearConfig {
    Disabled,
    Enabled(LinearSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearSettings {
    /// Read from LINEAR_API_KEY when the integration is enabled.
    pub api_key: String,
    /// Linear workspace slug used to build issue URLs.
    pub workspace: Option<String>,
    /// Team key prefixes (e.g. "ENG") recognised in branch names.
    pub team_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphiteConfig {
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub on_create: Vec<String>,
    pub on_cleanup: Vec<String>,
    pub hook_timeout_secs: u64,
}

pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 300;

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            on_create: Vec::new(),
            on_cleanup: Vec::new(),
            hook_timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerConfig {
    Disabled,
    Enabled(DockerSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSettings {
    pub compose_file: PathBuf,
}

impl ProjectConfig {
    pub fn tmux_settings(&self) -> Option<&TmuxSettings> {
        match &self.tmux {
            TmuxConfig::Enabled(settings) => Some(settings),
            TmuxConfig::Disabled => None,
        }
    }

    pub fn linear_settings(&self) -> Option<&LinearSettings> {
        match &self.linear {
            LinearConfig::Enabled(settings) => Some(settings),
            LinearConfig::Disabled => None,
        }
    }

    pub fn docker_settings(&self) -> Option<&DockerSettings> {
        match &self.docker {
            DockerConfig::Enabled(settings) => Some(settings),
            DockerConfig::Disabled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmux_layout_round_trips() {
        for raw in TmuxLayout::ALLOWED {
            let layout: TmuxLayout = raw.parse().unwrap();
            assert_eq!(layout.as_str(), *raw);
        }
        assert!("diagonal".parse::<TmuxLayout>().is_err());
    }

    #[test]
    fn layout_split_flags() {
        assert_eq!(TmuxLayout::Vertical.split_flag(), "-v");
        assert_eq!(TmuxLayout::Horizontal.split_flag(), "-h");
    }
}
