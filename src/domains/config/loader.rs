use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use super::model::{
    DockerConfig, DockerSettings, GraphiteConfig, LifecycleConfig, LinearConfig, LinearSettings,
    ProjectConfig, ProjectSection, TmuxConfig, TmuxLayout, TmuxSettings,
    DEFAULT_HOOK_TIMEOUT_SECS,
};
use super::paths::expand_tilde;

pub const CONFIG_FILE_NAME: &str = ".fwts.toml";
pub const LINEAR_API_KEY_VAR: &str = "LINEAR_API_KEY";

#[derive(Debug)]
pub enum ConfigError {
    MissingField(String),
    InvalidPath { field: String, reason: String },
    InvalidEnum { field: String, value: String, allowed: &'static [&'static str] },
    InvalidHook { phase: String, command: String, reason: String },
    Io(io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingField(field) => write!(f, "Missing required config field: {field}"),
            ConfigError::InvalidPath { field, reason } => {
                write!(f, "Invalid path for {field}: {reason}")
            }
            ConfigError::InvalidEnum { field, value, allowed } => write!(
                f,
                "Invalid value for {field}: {value:?} (allowed: {})",
                allowed.join(", ")
            ),
            ConfigError::InvalidHook { phase, command, reason } => {
                write!(f, "Invalid {phase} hook {command:?}: {reason}")
            }
            ConfigError::Io(err) => write!(f, "Failed to read config: {err}"),
            ConfigError::Parse(err) => write!(f, "Failed to parse config: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Parse(value)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    project: Option<RawProject>,
    worktree_base: Option<String>,
    tmux: Option<RawTmux>,
    linear: Option<RawLinear>,
    graphite: Option<RawGraphite>,
    lifecycle: Option<RawLifecycle>,
    symlinks: Option<Vec<String>>,
    docker: Option<RawDocker>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProject {
    name: Option<String>,
    main_repo: Option<String>,
    base_branch: Option<String>,
    github_repo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTmux {
    #[serde(default)]
    enabled: bool,
    editor_command: Option<String>,
    side_command: Option<String>,
    layout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLinear {
    #[serde(default)]
    enabled: bool,
    workspace: Option<String>,
    #[serde(default)]
    team_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGraphite {
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawLifecycle {
    #[serde(default)]
    on_create: Vec<String>,
    #[serde(default)]
    on_cleanup: Vec<String>,
    hook_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDocker {
    #[serde(default)]
    enabled: bool,
    compose_file: Option<String>,
}

/// Walk upward from `start` looking for a project config file.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// The machine-local override file sibling to a primary config:
/// `.fwts.toml` -> `.fwts.local.toml`.
pub fn override_path(primary: &Path) -> Option<PathBuf> {
    let stem = primary.file_stem()?.to_str()?;
    Some(primary.with_file_name(format!("{stem}.local.toml")))
}

/// Load and validate a project config. The optional machine-local
/// override file is merged over the primary with last-write-wins per
/// key; its absence is not an error. Never returns a partial config.
pub fn load(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut value: toml::Value = toml::from_str(&contents)?;

    if let Some(local) = override_path(path) {
        if local.is_file() {
            log::debug!("Merging local override: {}", local.display());
            let local_contents = std::fs::read_to_string(&local)?;
            let local_value: toml::Value = toml::from_str(&local_contents)?;
            merge_values(&mut value, local_value);
        }
    }

    let raw: RawConfig = value.try_into()?;
    validate(raw)
}

/// Deep merge: tables merge key-by-key, everything else is replaced.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

fn validate(raw: RawConfig) -> Result<ProjectConfig, ConfigError> {
    let raw_project = raw.project.unwrap_or_default();

    let name = raw_project
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField("project.name".into()))?;

    let main_repo = raw_project
        .main_repo
        .ok_or_else(|| ConfigError::MissingField("project.main_repo".into()))
        .map(|p| expand_tilde(&p))?;
    if !main_repo.is_dir() {
        return Err(ConfigError::InvalidPath {
            field: "project.main_repo".into(),
            reason: format!("{} is not a directory", main_repo.display()),
        });
    }

    let worktree_base = raw
        .worktree_base
        .ok_or_else(|| ConfigError::MissingField("worktree_base".into()))
        .map(|p| expand_tilde(&p))?;
    if !worktree_base.is_absolute() {
        return Err(ConfigError::InvalidPath {
            field: "worktree_base".into(),
            reason: format!("{} is not absolute", worktree_base.display()),
        });
    }
    if worktree_base.exists() && !worktree_base.is_dir() {
        return Err(ConfigError::InvalidPath {
            field: "worktree_base".into(),
            reason: format!("{} exists but is not a directory", worktree_base.display()),
        });
    }
    let same_as_repo = match (worktree_base.canonicalize(), main_repo.canonicalize()) {
        (Ok(base), Ok(repo)) => base == repo,
        _ => worktree_base == main_repo,
    };
    if same_as_repo {
        return Err(ConfigError::InvalidPath {
            field: "worktree_base".into(),
            reason: "worktree_base must not equal project.main_repo".into(),
        });
    }

    let project = ProjectSection {
        name,
        main_repo: main_repo.clone(),
        base_branch: raw_project.base_branch.unwrap_or_else(|| "main".into()),
        github_repo: raw_project.github_repo,
    };

    let tmux = match raw.tmux {
        Some(t) if t.enabled => {
            let layout = match t.layout {
                Some(value) => TmuxLayout::from_str(&value).map_err(|_| {
                    ConfigError::InvalidEnum {
                        field: "tmux.layout".into(),
                        value,
                        allowed: TmuxLayout::ALLOWED,
                    }
                })?,
                None => TmuxLayout::Vertical,
            };
            TmuxConfig::Enabled(TmuxSettings {
                editor_command: t.editor_command.unwrap_or_else(|| "$EDITOR".into()),
                side_command: t.side_command.unwrap_or_default(),
                layout,
            })
        }
        _ => TmuxConfig::Disabled,
    };

    let linear = match raw.linear {
        Some(l) if l.enabled => {
            // Credential absence when the integration is enabled is a
            // config error, not a silent skip.
            let api_key = env::var(LINEAR_API_KEY_VAR)
                .ok()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| ConfigError::MissingField(LINEAR_API_KEY_VAR.into()))?;
            LinearConfig::Enabled(LinearSettings {
                api_key,
                workspace: l.workspace,
                team_keys: l.team_keys,
            })
        }
        _ => LinearConfig::Disabled,
    };

    let graphite = match raw.graphite {
        Some(g) if g.enabled => GraphiteConfig::Enabled,
        _ => GraphiteConfig::Disabled,
    };

    let raw_lifecycle = raw.lifecycle.unwrap_or_default();
    for (phase, commands) in [
        ("on_create", &raw_lifecycle.on_create),
        ("on_cleanup", &raw_lifecycle.on_cleanup),
    ] {
        for command in commands {
            if command.trim().is_empty() {
                return Err(ConfigError::InvalidHook {
                    phase: phase.into(),
                    command: command.clone(),
                    reason: "empty command".into(),
                });
            }
            if let Err(err) = shell_words::split(command) {
                return Err(ConfigError::InvalidHook {
                    phase: phase.into(),
                    command: command.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    let lifecycle = LifecycleConfig {
        on_create: raw_lifecycle.on_create,
        on_cleanup: raw_lifecycle.on_cleanup,
        hook_timeout_secs: raw_lifecycle
            .hook_timeout_secs
            .unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS),
    };

    let symlinks = raw
        .symlinks
        .unwrap_or_default()
        .into_iter()
        .map(PathBuf::from)
        .collect();

    let docker = match raw.docker {
        Some(d) if d.enabled => {
            let compose_file = d
                .compose_file
                .ok_or_else(|| ConfigError::MissingField("docker.compose_file".into()))?;
            let compose_file = expand_tilde(&compose_file);
            let compose_file = if compose_file.is_absolute() {
                compose_file
            } else {
                main_repo.join(compose_file)
            };
            DockerConfig::Enabled(DockerSettings { compose_file })
        }
        _ => DockerConfig::Disabled,
    };

    Ok(ProjectConfig {
        project,
        worktree_base,
        tmux,
        linear,
        graphite,
        lifecycle,
        symlinks,
        docker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    /// Top-level keys first, then the project table, then any extra
    /// integration sections.
    fn write_config(dir: &TempDir, sections: &str) -> PathBuf {
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let contents = format!(
            "worktree_base = \"{}\"\n\n[project]\nname = \"demo\"\nmain_repo = \"{}\"\n\n{sections}",
            dir.path().join("wt").display(),
            repo.display()
        );
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");

        let first = load(&path).unwrap();
        let second = load(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_worktree_base_is_rejected() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            format!(
                "[project]\nname = \"demo\"\nmain_repo = \"{}\"\n",
                repo.display()
            ),
        )
        .unwrap();

        match load(&path) {
            Err(ConfigError::MissingField(field)) => assert_eq!(field, "worktree_base"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn worktree_base_equal_to_repo_is_rejected() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        let contents = format!(
            "worktree_base = \"{repo}\"\n\n[project]\nname = \"demo\"\nmain_repo = \"{repo}\"\n",
            repo = repo.display()
        );
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, contents).unwrap();

        assert!(matches!(
            load(&path),
            Err(ConfigError::InvalidPath { .. })
        ));
    }

    #[test]
    fn invalid_layout_is_rejected_with_allowed_values() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[tmux]\nenabled = true\nlayout = \"diagonal\"\n");

        match load(&path) {
            Err(ConfigError::InvalidEnum { field, value, allowed }) => {
                assert_eq!(field, "tmux.layout");
                assert_eq!(value, "diagonal");
                assert_eq!(allowed, TmuxLayout::ALLOWED);
            }
            other => panic!("expected InvalidEnum, got {other:?}"),
        }
    }

    #[test]
    fn local_override_wins_per_key() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[lifecycle]\non_create = [\"echo primary\"]\nhook_timeout_secs = 10\n",
        );
        let local = override_path(&path).unwrap();
        fs::write(&local, "[lifecycle]\nhook_timeout_secs = 99\n").unwrap();

        let config = load(&path).unwrap();
        // Overridden key wins, untouched keys survive the merge.
        assert_eq!(config.lifecycle.hook_timeout_secs, 99);
        assert_eq!(config.lifecycle.on_create, vec!["echo primary".to_string()]);
    }

    #[test]
    fn missing_override_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        assert!(load(&path).is_ok());
    }

    #[test]
    fn unparseable_hook_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[lifecycle]\non_create = [\"echo 'unterminated\"]\n");
        assert!(matches!(load(&path), Err(ConfigError::InvalidHook { .. })));
    }

    #[test]
    #[serial]
    fn enabled_linear_without_credential_is_a_config_error() {
        let prev = env::var(LINEAR_API_KEY_VAR).ok();
        env::remove_var(LINEAR_API_KEY_VAR);

        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[linear]\nenabled = true\n");
        match load(&path) {
            Err(ConfigError::MissingField(field)) => assert_eq!(field, LINEAR_API_KEY_VAR),
            other => panic!("expected MissingField, got {other:?}"),
        }

        if let Some(v) = prev {
            env::set_var(LINEAR_API_KEY_VAR, v);
        }
    }

    #[test]
    #[serial]
    fn enabled_linear_reads_credential_from_env() {
        let prev = env::var(LINEAR_API_KEY_VAR).ok();
        env::set_var(LINEAR_API_KEY_VAR, "lin_api_test");

        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[linear]\nenabled = true\nteam_keys = [\"ENG\"]\n");
        let config = load(&path).unwrap();
        let settings = config.linear_settings().expect("linear enabled");
        assert_eq!(settings.api_key, "lin_api_test");
        assert_eq!(settings.team_keys, vec!["ENG".to_string()]);

        match prev {
            Some(v) => env::set_var(LINEAR_API_KEY_VAR, v),
            None => env::remove_var(LINEAR_API_KEY_VAR),
        }
    }

    #[test]
    fn find_config_walks_upward() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let path = write_config(&dir, "");

        assert_eq!(find_config(&nested), Some(path));
    }
}
