//! Config loading and layering.
//!
//! Defaults, then the user config file, then a project-local `mdsync.toml`,
//! then environment overrides. Later layers win.

mod load;
mod merge;
mod schema;

pub use load::{config_path, discover_project_root, load, load_for_project, project_config_path};
pub use merge::{apply_env_overrides, merge_layers};
pub use schema::{
    Config, ConfigLayer, LogFormat, LoggingConfig, LoggingConfigOverride, RetryConfig,
    RetryConfigOverride, SyncConfig, SyncConfigOverride, TrackerConfig, TrackerConfigOverride,
};

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing tracker setting: {0}")]
    MissingSetting(&'static str),
}
