use serde::{Deserialize, Serialize};

use crate::plan::TransitionGraph;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    /// Workflow of the target project. The forward-only default fits plain
    /// setups; projects with reopen edges list them here.
    pub workflow: TransitionGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub base_url: Option<String>,
    pub email: Option<String>,
    /// Never written back to disk by this tool; expected from the
    /// environment in most setups.
    pub api_token: Option<String>,
    /// Tracker-side custom field id holding story points.
    pub story_points_field: String,
    pub cache_ttl_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            email: None,
            api_token: None,
            story_points_field: "customfield_10016".to_string(),
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub workers: usize,
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> crate::exec::RetryPolicy {
        crate::exec::RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: std::time::Duration::from_millis(self.base_delay_ms),
            max_delay: std::time::Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    #[serde(default)]
    pub tracker: TrackerConfigOverride,
    #[serde(default)]
    pub sync: SyncConfigOverride,
    #[serde(default)]
    pub logging: LoggingConfigOverride,
    pub workflow: Option<TransitionGraph>,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        self.tracker.apply_to(&mut base.tracker);
        self.sync.apply_to(&mut base.sync);
        self.logging.apply_to(&mut base.logging);
        if let Some(workflow) = &self.workflow {
            base.workflow = workflow.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackerConfigOverride {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub story_points_field: Option<String>,
    pub cache_ttl_secs: Option<u64>,
}

impl TrackerConfigOverride {
    pub fn apply_to(&self, target: &mut TrackerConfig) {
        if let Some(base_url) = self.base_url.as_ref() {
            target.base_url = Some(base_url.clone());
        }
        if let Some(email) = self.email.as_ref() {
            target.email = Some(email.clone());
        }
        if let Some(api_token) = self.api_token.as_ref() {
            target.api_token = Some(api_token.clone());
        }
        if let Some(field) = self.story_points_field.as_ref() {
            target.story_points_field = field.clone();
        }
        if let Some(ttl) = self.cache_ttl_secs {
            target.cache_ttl_secs = ttl;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfigOverride {
    pub workers: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfigOverride,
}

impl SyncConfigOverride {
    pub fn apply_to(&self, target: &mut SyncConfig) {
        if let Some(workers) = self.workers {
            target.workers = workers;
        }
        self.retry.apply_to(&mut target.retry);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RetryConfigOverride {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

impl RetryConfigOverride {
    pub fn apply_to(&self, target: &mut RetryConfig) {
        if let Some(value) = self.max_attempts {
            target.max_attempts = value;
        }
        if let Some(value) = self.base_delay_ms {
            target.base_delay_ms = value;
        }
        if let Some(value) = self.max_delay_ms {
            target.max_delay_ms = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub format: Option<LogFormat>,
    pub filter: Option<String>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
    }
}
