use std::env;
use std::path::PathBuf;

/// Config directory, in priority order: FWTS_CONFIG_DIR (full override),
/// XDG_CONFIG_HOME/fwts, then the platform config dir.
pub fn config_dir() -> PathBuf {
    if let Ok(override_dir) = env::var("FWTS_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }

    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config).join("fwts");
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fwts")
}

/// State directory for the registry database. Same override scheme as
/// `config_dir` with FWTS_STATE_DIR / XDG_STATE_HOME.
pub fn state_dir() -> PathBuf {
    if let Ok(override_dir) = env::var("FWTS_STATE_DIR") {
        return PathBuf::from(override_dir);
    }

    if let Ok(xdg_state) = env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg_state).join("fwts");
    }

    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fwts")
}

pub fn global_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn registry_db_path() -> PathBuf {
    state_dir().join("registry.db")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
