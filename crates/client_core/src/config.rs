use std::{collections::HashMap, fs, path::Path, str::FromStr, time::Duration};

use shared::domain::Quality;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "downloader.toml";

/// What the duplicate gate does when the check itself cannot be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateCheckPolicy {
    #[default]
    FailOpen,
    FailClosed,
}

impl FromStr for DuplicateCheckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(format!("unknown duplicate check policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub server_url: String,
    /// Delay before the self-correcting refresh that follows a submission.
    pub refresh_delay: Duration,
    /// Poll period while any task is still in flight.
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub duplicate_check: DuplicateCheckPolicy,
    pub default_quality: Quality,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:9000".into(),
            refresh_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(30),
            duplicate_check: DuplicateCheckPolicy::FailOpen,
            default_quality: Quality::Best,
        }
    }
}

const ENV_KEYS: &[(&str, &str)] = &[
    ("SERVER_URL", "server_url"),
    ("APP__SERVER_URL", "server_url"),
    ("APP__REFRESH_DELAY_MS", "refresh_delay_ms"),
    ("APP__POLL_INTERVAL_MS", "poll_interval_ms"),
    ("APP__REQUEST_TIMEOUT_SECS", "request_timeout_secs"),
    ("APP__DUPLICATE_CHECK", "duplicate_check"),
    ("APP__DEFAULT_QUALITY", "default_quality"),
];

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE))
}

/// Defaults, then the TOML file at `path` if it exists, then `APP__*`
/// environment variables.
pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

pub(crate) fn apply_file_overrides(settings: &mut ClientSettings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, toml::Value>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(error = %err, "config: ignoring unreadable settings file");
            return;
        }
    };

    for (key, value) in file_cfg {
        let value = match value {
            toml::Value::String(v) => v,
            toml::Value::Integer(v) => v.to_string(),
            toml::Value::Float(v) => v.to_string(),
            toml::Value::Boolean(v) => v.to_string(),
            other => {
                warn!(key, value = %other, "config: ignoring non-scalar setting");
                continue;
            }
        };
        apply_setting(settings, &key, &value);
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    for (env_key, key) in ENV_KEYS {
        if let Some(value) = lookup(env_key) {
            apply_setting(settings, key, &value);
        }
    }
}

fn apply_setting(settings: &mut ClientSettings, key: &str, value: &str) {
    let value = value.trim();
    match key {
        "server_url" => settings.server_url = value.trim_end_matches('/').to_string(),
        "refresh_delay_ms" => {
            if let Some(ms) = parse_u64(key, value) {
                settings.refresh_delay = Duration::from_millis(ms);
            }
        }
        "poll_interval_ms" => {
            if let Some(ms) = parse_u64(key, value) {
                // A zero period would make the poller spin.
                settings.poll_interval = Duration::from_millis(ms.max(1));
            }
        }
        "request_timeout_secs" => {
            if let Some(secs) = parse_u64(key, value) {
                settings.request_timeout = Duration::from_secs(secs.max(1));
            }
        }
        "duplicate_check" => match value.parse() {
            Ok(policy) => settings.duplicate_check = policy,
            Err(err) => warn!(key, error = %err, "config: ignoring invalid setting"),
        },
        "default_quality" => match value.parse() {
            Ok(quality) => settings.default_quality = quality,
            Err(err) => warn!(key, error = %err, "config: ignoring invalid setting"),
        },
        other => warn!(key = other, "config: ignoring unknown setting"),
    }
}

fn parse_u64(key: &str, value: &str) -> Option<u64> {
    match value.parse::<u64>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(key, value, error = %err, "config: ignoring invalid number");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
