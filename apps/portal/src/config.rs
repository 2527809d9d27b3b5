use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            username: None,
            password: None,
            request_timeout_secs: None,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Keys accepted in `portal.toml`. Passwords are only taken from the environment or
/// the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    server_url: Option<String>,
    username: Option<String>,
    request_timeout_secs: Option<u64>,
    log_filter: Option<String>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub log_filter: Option<String>,
}

pub fn load_settings(overrides: &Overrides) -> anyhow::Result<Settings> {
    load_settings_with(overrides, |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    overrides: &Overrides,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file = match &overrides.config {
        Some(path) => Some(read_file(path)?),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                Some(read_file(path)?)
            } else {
                None
            }
        }
    };
    if let Some(file) = file {
        if let Some(v) = file.server_url {
            settings.server_url = v;
        }
        if let Some(v) = file.username {
            settings.username = Some(v);
        }
        if let Some(v) = file.request_timeout_secs {
            settings.request_timeout_secs = Some(v);
        }
        if let Some(v) = file.log_filter {
            settings.log_filter = v;
        }
    }

    if let Some(v) = env("PORTAL_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("PORTAL_USERNAME") {
        settings.username = Some(v);
    }
    if let Some(v) = env("PORTAL_PASSWORD") {
        settings.password = Some(v);
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        let parsed = v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("APP__REQUEST_TIMEOUT_SECS must be a number, got '{v}'"))?;
        settings.request_timeout_secs = Some(parsed);
    }
    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(v) = &overrides.server_url {
        settings.server_url = v.clone();
    }
    if let Some(v) = &overrides.username {
        settings.username = Some(v.clone());
    }
    if let Some(v) = &overrides.password {
        settings.password = Some(v.clone());
    }
    if let Some(v) = overrides.request_timeout_secs {
        settings.request_timeout_secs = Some(v);
    }
    if let Some(v) = &overrides.log_filter {
        settings.log_filter = v.clone();
    }

    Ok(settings)
}

fn read_file(path: &Path) -> anyhow::Result<FileSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_config(contents: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("workflow_portal_test_{suffix}.toml"));
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn layers_file_env_and_flags_in_order() {
        let path = temp_config(
            "server_url = \"http://file:8000\"\nusername = \"alice\"\nrequest_timeout_secs = 5\n",
        );
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORTAL_SERVER_URL", "http://env:8000"),
            ("APP__LOG_FILTER", "debug"),
        ]);
        let overrides = Overrides {
            config: Some(path.clone()),
            username: Some("bob".into()),
            ..Overrides::default()
        };

        let settings =
            load_settings_with(&overrides, |key| vars.get(key).map(|v| v.to_string()))
                .expect("settings");
        fs::remove_file(path).expect("cleanup");

        assert_eq!(settings.server_url, "http://env:8000");
        assert_eq!(settings.username.as_deref(), Some("bob"));
        assert_eq!(settings.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(settings.log_filter, "debug");
        assert!(settings.password.is_none());
    }

    #[test]
    fn explicit_config_must_exist_and_parse() {
        let missing = Overrides {
            config: Some(env::temp_dir().join("workflow_portal_missing.toml")),
            ..Overrides::default()
        };
        assert!(load_settings_with(&missing, |_| None).is_err());

        let path = temp_config("password = \"hunter2\"\n");
        let bad = Overrides {
            config: Some(path.clone()),
            ..Overrides::default()
        };
        let result = load_settings_with(&bad, |_| None);
        fs::remove_file(path).expect("cleanup");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let result = load_settings_with(&Overrides::default(), |key| {
            (key == "APP__REQUEST_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn zero_timeout_means_transport_default() {
        let settings = Settings {
            request_timeout_secs: Some(0),
            ..Settings::default()
        };
        assert_eq!(settings.request_timeout(), None);
    }
}
