use super::{Config, ConfigLayer};

pub fn merge_layers(user: Option<ConfigLayer>, project: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = project {
        layer.apply_to(&mut config);
    }
    config
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Some(url) = env_string("MDSYNC_URL") {
        config.tracker.base_url = Some(url);
    }
    if let Some(email) = env_string("MDSYNC_EMAIL") {
        config.tracker.email = Some(email);
    }
    if let Some(token) = env_string("MDSYNC_API_TOKEN") {
        config.tracker.api_token = Some(token);
    }
    if let Some(filter) = env_string("MDSYNC_LOG") {
        config.logging.filter = Some(filter);
    }
    if let Some(raw) = env_string("MDSYNC_WORKERS") {
        match raw.parse::<usize>() {
            Ok(value) => config.sync.workers = value.max(1),
            Err(err) => tracing::warn!("invalid MDSYNC_WORKERS, ignoring: {err}"),
        }
    }

    // Legacy variable names, honored only where nothing else set the value.
    if config.tracker.base_url.is_none() {
        config.tracker.base_url = env_string("JIRA_URL");
    }
    if config.tracker.email.is_none() {
        config.tracker.email = env_string("JIRA_EMAIL");
    }
    if config.tracker.api_token.is_none() {
        config.tracker.api_token = env_string("JIRA_API_TOKEN");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock")
    }

    struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        prev: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[(&str, Option<&str>)]) -> Self {
            let lock = env_lock();
            let mut prev = Vec::with_capacity(vars.len());
            for (key, value) in vars {
                let key_string = (*key).to_string();
                let prior = std::env::var(key).ok();
                prev.push((key_string, prior));
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
            Self { _lock: lock, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.prev.drain(..) {
                match value {
                    Some(val) => std::env::set_var(&key, val),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }

    #[test]
    fn merge_layers_respects_precedence() {
        let mut user = ConfigLayer::default();
        user.tracker.base_url = Some("https://user.example.com".into());
        user.sync.workers = Some(2);

        let mut project = ConfigLayer::default();
        project.tracker.base_url = Some("https://project.example.com".into());

        let config = merge_layers(Some(user), Some(project));
        assert_eq!(
            config.tracker.base_url.as_deref(),
            Some("https://project.example.com")
        );
        assert_eq!(config.sync.workers, 2);
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = EnvGuard::new(&[
            ("MDSYNC_URL", Some("https://env.example.com")),
            ("MDSYNC_EMAIL", Some("alice@example.com")),
            ("MDSYNC_API_TOKEN", Some("tok-123")),
            ("MDSYNC_WORKERS", Some("8")),
            ("JIRA_URL", None),
            ("JIRA_EMAIL", None),
            ("JIRA_API_TOKEN", None),
        ]);

        let mut config = Config::default();
        apply_env_overrides(&mut config);

        assert_eq!(
            config.tracker.base_url.as_deref(),
            Some("https://env.example.com")
        );
        assert_eq!(config.tracker.email.as_deref(), Some("alice@example.com"));
        assert_eq!(config.tracker.api_token.as_deref(), Some("tok-123"));
        assert_eq!(config.sync.workers, 8);
    }

    #[test]
    fn legacy_names_fill_gaps_only() {
        let _guard = EnvGuard::new(&[
            ("MDSYNC_URL", Some("https://env.example.com")),
            ("MDSYNC_EMAIL", None),
            ("MDSYNC_API_TOKEN", None),
            ("MDSYNC_WORKERS", None),
            ("JIRA_URL", Some("https://legacy.example.com")),
            ("JIRA_EMAIL", Some("bob@example.com")),
            ("JIRA_API_TOKEN", None),
        ]);

        let mut config = Config::default();
        apply_env_overrides(&mut config);

        // Current name wins; legacy fills what is still unset.
        assert_eq!(
            config.tracker.base_url.as_deref(),
            Some("https://env.example.com")
        );
        assert_eq!(config.tracker.email.as_deref(), Some("bob@example.com"));
        assert!(config.tracker.api_token.is_none());
    }
}
