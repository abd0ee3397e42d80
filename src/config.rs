use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feed::{DEEP_LINK_PAGE_SIZE, FEED_PAGE_SIZE};

const DEFAULT_ENV_PREFIX: &str = "CLIPFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Origin of the library server, e.g. `http://127.0.0.1:3000`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".into()
}

fn default_user_agent() -> String {
    format!("clipfeed/{} (+https://github.com/clipfeed/clipfeed)", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// First-fetch size when entering on a deep-linked video id.
    #[serde(default = "default_deep_link_limit")]
    pub deep_link_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            deep_link_limit: default_deep_link_limit(),
        }
    }
}

fn default_page_size() -> usize {
    FEED_PAGE_SIZE
}

fn default_deep_link_limit() -> usize {
    DEEP_LINK_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_mpv_path")]
    pub mpv_path: String,
    #[serde(default = "default_loop_file")]
    pub loop_file: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            mpv_path: default_mpv_path(),
            loop_file: default_loop_file(),
        }
    }
}

fn default_mpv_path() -> String {
    "mpv".into()
}

fn default_loop_file() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
    /// How long transient status messages stay on screen.
    #[serde(default = "default_status_ttl", with = "humantime_serde")]
    pub status_ttl: Duration,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            status_ttl: default_status_ttl(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

fn default_status_ttl() -> Duration {
    Duration::from_secs(4)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.server.base_url.is_empty() {
        base.server.base_url = other.server.base_url;
    }
    if !other.server.user_agent.is_empty() {
        base.server.user_agent = other.server.user_agent;
    }
    base.server.timeout = other.server.timeout;

    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    if other.feed.deep_link_limit != 0 {
        base.feed.deep_link_limit = other.feed.deep_link_limit;
    }

    if !other.player.mpv_path.is_empty() {
        base.player.mpv_path = other.player.mpv_path;
    }
    base.player.loop_file = other.player.loop_file;

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }
    base.ui.status_ttl = other.ui.status_ttl;

    base
}

/// Env overrides are applied key by key on top of the merged config; a key
/// that is not set leaves the file (or default) value untouched.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "server.base_url" => cfg.server.base_url = value,
        "server.user_agent" => cfg.server.user_agent = value,
        "server.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.server.timeout = duration;
            }
        }
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.page_size = parsed;
            }
        }
        "feed.deep_link_limit" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.deep_link_limit = parsed;
            }
        }
        "player.mpv_path" => cfg.player.mpv_path = value,
        "player.loop_file" => {
            cfg.player.loop_file = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "ui.theme" => cfg.ui.theme = value,
        "ui.status_ttl" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.status_ttl = duration;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clipfeed").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("CLIPFEED_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.server.base_url, default_base_url());
        assert_eq!(cfg.feed.page_size, FEED_PAGE_SIZE);
        assert!(cfg.player.loop_file);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "server:\n  base_url: http://media.lan:8080\nfeed:\n  page_size: 8\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("CLIPFEED_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.server.base_url, "http://media.lan:8080");
        assert_eq!(cfg.feed.page_size, 8);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.player.mpv_path, "mpv");
    }

    #[test]
    fn env_overrides_file_without_resetting_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "server:\n  base_url: http://media.lan:8080\nui:\n  theme: nord\n",
        )
        .unwrap();

        env::set_var("CLIPFEED_TEST_LAYER_UI__THEME", "dracula");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("CLIPFEED_TEST_LAYER".into()),
        })
        .unwrap();
        env::remove_var("CLIPFEED_TEST_LAYER_UI__THEME");

        // Env wins only for the keys it sets.
        assert_eq!(cfg.ui.theme, "dracula");
        assert_eq!(cfg.server.base_url, "http://media.lan:8080");
    }

    #[test]
    fn env_overrides() {
        env::set_var("CLIPFEED_TEST_ENV_UI__THEME", "dracula");
        env::set_var("CLIPFEED_TEST_ENV_SERVER__TIMEOUT", "30s");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("CLIPFEED_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "dracula");
        assert_eq!(cfg.server.timeout, Duration::from_secs(30));
        env::remove_var("CLIPFEED_TEST_ENV_UI__THEME");
        env::remove_var("CLIPFEED_TEST_ENV_SERVER__TIMEOUT");
    }
}
