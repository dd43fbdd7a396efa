use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "SUBTUBE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.youtube.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/128.0.0.0 Safari/537.36"
        .to_string()
}

fn default_page_size() -> usize {
    16
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_player_command")]
    pub command: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_player_args")]
    pub player_args: String,
    #[serde(default = "default_end_marker")]
    pub end_marker: String,
    #[serde(default = "default_hold_window")]
    pub hold_window: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
            quality: default_quality(),
            player_args: default_player_args(),
            end_marker: default_end_marker(),
            hold_window: default_hold_window(),
        }
    }
}

fn default_player_command() -> String {
    "streamlink".into()
}

fn default_quality() -> String {
    "best".into()
}

fn default_player_args() -> String {
    "--video-on-top {filename} --verbose 2".into()
}

fn default_end_marker() -> String {
    "finished input".into()
}

fn default_hold_window() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_indicator_on")]
    pub indicator_on: String,
    #[serde(default = "default_indicator_off")]
    pub indicator_off: String,
    #[serde(default)]
    pub fg: Option<String>,
    #[serde(default)]
    pub bg: Option<String>,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            indicator_on: default_indicator_on(),
            indicator_off: default_indicator_off(),
            fg: None,
            bg: None,
        }
    }
}

fn default_indicator_on() -> String {
    " ◉ ".into()
}

fn default_indicator_off() -> String {
    " ◯ ".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncConfig {
    #[serde(default, with = "humantime_serde")]
    pub refresh_interval: Option<Duration>,
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
    if !other.feed.base_url.is_empty() {
        base.feed.base_url = other.feed.base_url;
    }
    if !other.feed.user_agent.is_empty() {
        base.feed.user_agent = other.feed.user_agent;
    }
    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    if !other.feed.timeout.is_zero() {
        base.feed.timeout = other.feed.timeout;
    }

    if !other.player.command.is_empty() {
        base.player.command = other.player.command;
    }
    if !other.player.quality.is_empty() {
        base.player.quality = other.player.quality;
    }
    base.player.player_args = other.player.player_args;
    if !other.player.end_marker.is_empty() {
        base.player.end_marker = other.player.end_marker;
    }
    base.player.hold_window = other.player.hold_window;

    if !other.ui.indicator_on.is_empty() {
        base.ui.indicator_on = other.ui.indicator_on;
    }
    if !other.ui.indicator_off.is_empty() {
        base.ui.indicator_off = other.ui.indicator_off;
    }
    if other.ui.fg.is_some() {
        base.ui.fg = other.ui.fg;
    }
    if other.ui.bg.is_some() {
        base.ui.bg = other.ui.bg;
    }

    if other.sync.refresh_interval.is_some() {
        base.sync.refresh_interval = other.sync.refresh_interval;
    }

    base
}

// Env values are applied on top of the merged config rather than merged as a
// second `Config`, so an unset variable never resets a file value to default.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.base_url" => cfg.feed.base_url = value,
        "feed.user_agent" => cfg.feed.user_agent = value,
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                if parsed > 0 {
                    cfg.feed.page_size = parsed;
                }
            }
        }
        "feed.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.timeout = duration;
            }
        }
        "player.command" => cfg.player.command = value,
        "player.quality" => cfg.player.quality = value,
        "player.player_args" => cfg.player.player_args = value,
        "player.end_marker" => cfg.player.end_marker = value,
        "player.hold_window" => {
            cfg.player.hold_window = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "ui.indicator_on" => cfg.ui.indicator_on = value,
        "ui.indicator_off" => cfg.ui.indicator_off = value,
        "ui.fg" => cfg.ui.fg = Some(value),
        "ui.bg" => cfg.ui.bg = Some(value),
        "sync.refresh_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.sync.refresh_interval = Some(duration);
            }
        }
        _ => {}
    }
}

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("subtube"))
}

fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/subtube.yaml")),
            env_prefix: Some("SUBTUBE_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.page_size, 16);
        assert_eq!(cfg.player.command, "streamlink");
        assert_eq!(cfg.player.end_marker, "finished input");
        assert_eq!(cfg.sync.refresh_interval, None);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "player:\n  quality: 720p\nsync:\n  refresh_interval: 5m\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("SUBTUBE_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.player.quality, "720p");
        assert_eq!(cfg.player.command, "streamlink");
        assert_eq!(cfg.sync.refresh_interval, Some(Duration::from_secs(300)));
    }

    #[test]
    fn env_overrides() {
        env::set_var("SUBTUBE_TEST_ENV_PLAYER__QUALITY", "480p");
        env::set_var("SUBTUBE_TEST_ENV_FEED__PAGE_SIZE", "20");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/subtube.yaml")),
            env_prefix: Some("SUBTUBE_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.player.quality, "480p");
        assert_eq!(cfg.feed.page_size, 20);
        env::remove_var("SUBTUBE_TEST_ENV_PLAYER__QUALITY");
        env::remove_var("SUBTUBE_TEST_ENV_FEED__PAGE_SIZE");
    }
}
