//! Settings file (JSON): bot token, recipient directory, subscription list, stats DB path, HTTP port.
//! Loaded once at startup and again by /config and /list; written back on every committed
//! subscription change. The token may be overridden by TELEGRAM_BOT_TOKEN.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default settings file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Env var that overrides `telegram.bot_token`.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

const DEFAULT_STATS_DB: &str = "stats.db";
const DEFAULT_HTTP_PORT: u16 = 5182;

/// Display timezone for publish times and stats day boundaries (UTC+8, no DST).
const DISPLAY_UTC_OFFSET_SECS: i32 = 8 * 3600;

pub fn display_offset() -> FixedOffset {
    FixedOffset::east_opt(DISPLAY_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("write {}: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
    #[error("serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    #[error("invalid channel id: {0} (expected @name or numeric id)")]
    InvalidChannelId(String),
    #[error("telegram bot token not set (telegram.bot_token or {BOT_TOKEN_ENV})")]
    MissingToken,
}

/// One feed subscription. Identity is its position in `Config::rss`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub url: String,
    /// Poll interval in seconds.
    #[serde(default)]
    pub interval: u64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub group: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { port: default_http_port() }
    }
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_stats_db() -> PathBuf {
    PathBuf::from(DEFAULT_STATS_DB)
}

/// Whole settings file. Unknown fields are ignored; every field has a default so a partial file loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramSettings,
    /// Direct-message recipients (Telegram user ids, as strings).
    #[serde(default)]
    pub users: Vec<String>,
    /// Broadcast channels (@username or numeric id).
    #[serde(default)]
    pub channels: Vec<String>,
    /// The subscription store.
    #[serde(default)]
    pub rss: Vec<Subscription>,
    #[serde(default = "default_stats_db")]
    pub stats_db: PathBuf,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramSettings::default(),
            users: Vec::new(),
            channels: Vec::new(),
            rss: Vec::new(),
            stats_db: default_stats_db(),
            http: HttpSettings::default(),
        }
    }
}

/// Config shared by the update worker, the fetch engine and the HTTP API.
/// Reload replaces the whole value; commits mutate `rss` under the write lock.
pub type SharedConfig = Arc<tokio::sync::RwLock<Config>>;

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write pretty JSON to a sibling temp file, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(path, &self.to_json()?)
    }

    /// The file body `save` writes. Lets callers serialize under a lock and write after releasing it.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Bot token: env override first, then the file. Empty strings count as unset.
    pub fn bot_token(&self) -> Result<String, ConfigError> {
        std::env::var(BOT_TOKEN_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.telegram
                    .bot_token
                    .as_deref()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .ok_or(ConfigError::MissingToken)
    }

    pub fn into_shared(self) -> SharedConfig {
        Arc::new(tokio::sync::RwLock::new(self))
    }
}

/// Write an already serialized settings body: sibling temp file, then rename over `path`.
pub fn write_json(path: &Path, body: &str) -> Result<(), ConfigError> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, body).map_err(|source| ConfigError::Write {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp);
        ConfigError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"users": ["42"], "rss": [{"url": "http://x/feed"}]}"#).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.users, vec!["42".to_string()]);
        assert!(cfg.channels.is_empty());
        assert_eq!(cfg.rss.len(), 1);
        assert_eq!(cfg.rss[0].url, "http://x/feed");
        assert_eq!(cfg.rss[0].interval, 0);
        assert!(cfg.rss[0].keywords.is_empty());
        assert_eq!(cfg.stats_db, PathBuf::from("stats.db"));
        assert_eq!(cfg.http.port, 5182);
    }

    #[test]
    fn test_save_then_load_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let cfg = Config {
            telegram: TelegramSettings {
                bot_token: Some("123:abc".into()),
            },
            users: vec!["1".into(), "2".into()],
            channels: vec!["@news".into()],
            rss: vec![Subscription {
                url: "http://x/feed".into(),
                interval: 300,
                keywords: vec!["rust".into(), "tokio".into()],
                group: "tech".into(),
            }],
            ..Config::default()
        };

        cfg.save(&path).unwrap();
        assert!(!dir.path().join("config.json.tmp").exists());
        assert_eq!(Config::load(&path).unwrap(), cfg);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_garbage_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load(&path).unwrap_err(), ConfigError::Parse { .. }));
    }

    #[test]
    fn test_save_into_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("config.json");
        assert!(matches!(
            Config::default().save(&path).unwrap_err(),
            ConfigError::Write { .. }
        ));
    }

    #[test]
    fn test_write_json_body_taken_before_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = Config {
            users: vec!["1".into()],
            ..Config::default()
        };
        let body = cfg.to_json().unwrap();
        cfg.users.push("2".into());

        write_json(&path, &body).unwrap();
        assert_eq!(Config::load(&path).unwrap().users, vec!["1".to_string()]);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn test_bot_token_blank_is_missing_and_env_overrides_file() {
        // Only test touching the env var; both cases run in sequence here.
        let mut cfg = Config {
            telegram: TelegramSettings {
                bot_token: Some("  ".into()),
            },
            ..Config::default()
        };
        std::env::remove_var(BOT_TOKEN_ENV);
        assert!(matches!(cfg.bot_token(), Err(ConfigError::MissingToken)));

        cfg.telegram.bot_token = None;
        assert!(matches!(cfg.bot_token(), Err(ConfigError::MissingToken)));

        cfg.telegram.bot_token = Some("file:token".into());
        assert_eq!(cfg.bot_token().unwrap(), "file:token");

        std::env::set_var(BOT_TOKEN_ENV, " env:token ");
        let from_env = cfg.bot_token();
        std::env::set_var(BOT_TOKEN_ENV, "   ");
        let blank_env = cfg.bot_token();
        std::env::remove_var(BOT_TOKEN_ENV);

        assert_eq!(from_env.unwrap(), "env:token");
        assert_eq!(blank_env.unwrap(), "file:token");
    }

    #[test]
    fn test_display_offset_is_utc_plus_8() {
        assert_eq!(display_offset().local_minus_utc(), 8 * 3600);
    }
}
