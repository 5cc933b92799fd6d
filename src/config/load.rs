use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

use super::merge::{apply_env_overrides, merge_layers};
use super::{Config, ConfigError, ConfigLayer};

/// User-level config: `$XDG_CONFIG_HOME/mdsync/config.toml`, falling back
/// to `~/.config/mdsync/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("mdsync").join("config.toml"));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join("mdsync").join("config.toml"))
}

pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join("mdsync.toml")
}

/// Nearest ancestor of the working directory carrying an `mdsync.toml`.
pub fn discover_project_root() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        if project_config_path(&dir).exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn load_layer(path: &Path) -> Result<Option<ConfigLayer>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let layer = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(layer))
}

pub fn load() -> Result<Config> {
    load_for_project(discover_project_root().as_deref())
}

pub fn load_for_project(project_root: Option<&Path>) -> Result<Config> {
    let user = match config_path() {
        Some(path) => load_layer(&path)?,
        None => None,
    };
    let project = match project_root {
        Some(root) => load_layer(&project_config_path(root))?,
        None => None,
    };
    let mut config = merge_layers(user, project);
    apply_env_overrides(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_layer_parses_and_applies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = project_config_path(dir.path());
        fs::write(
            &path,
            r#"
[tracker]
base_url = "https://tracker.example.com"
story_points_field = "customfield_10020"

[sync]
workers = 2

[sync.retry]
max_attempts = 5

[logging]
format = "json"

[workflow]
initial = "Backlog"

[[workflow.edges]]
from = "Backlog"
name = "Begin"
to = "Doing"
"#,
        )
        .expect("write config");

        let layer = load_layer(&path).expect("load").expect("present");
        let mut config = Config::default();
        layer.apply_to(&mut config);

        assert_eq!(
            config.tracker.base_url.as_deref(),
            Some("https://tracker.example.com")
        );
        assert_eq!(config.tracker.story_points_field, "customfield_10020");
        assert_eq!(config.sync.workers, 2);
        assert_eq!(config.sync.retry.max_attempts, 5);
        assert!(matches!(
            config.logging.format,
            crate::config::LogFormat::Json
        ));
        assert_eq!(config.workflow.initial, "Backlog");
        assert_eq!(config.workflow.edges.len(), 1);
    }

    #[test]
    fn missing_layer_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_layer(&project_config_path(dir.path())).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn malformed_layer_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = project_config_path(dir.path());
        fs::write(&path, "tracker = 7").expect("write config");
        assert!(load_layer(&path).is_err());
    }
}
