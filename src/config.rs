//! Configuration loader and validator for the archive bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::store::Tables;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    #[serde(default)]
    pub store: Store,
    pub archiver: Archiver,
    #[serde(default)]
    pub telegraph: Telegraph,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Deadline for handling one update before the user is told it timed out.
    pub timeout_seconds: u64,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    pub bot_username: String,
    #[serde(default = "default_docs_url")]
    pub docs_url: String,
}

/// Key-value store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub tables: TableNames,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableNames {
    pub backups: String,
    pub configs: String,
    pub share_groups: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            backups: "wbbu-backups".into(),
            configs: "wbbu-configs".into(),
            share_groups: "wbbu-share-groups".into(),
        }
    }
}

/// External archiver service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Archiver {
    pub endpoint: String,
}

/// Telegraph API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegraph {
    pub api_base: String,
}

impl Default for Telegraph {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegra.ph/".into(),
        }
    }
}

fn default_docs_url() -> String {
    "https://zedekul.github.io/wbbubot/".into()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Database URL: `DATABASE_URL` wins, then `store.database_url`, then a
    /// SQLite file under the data dir.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.store.database_url.clone())
            .unwrap_or_else(|| format!("sqlite://{}/wbbubot.db", self.app.data_dir))
    }

    pub fn tables(&self) -> Tables {
        Tables::new(
            &self.store.tables.backups,
            &self.store.tables.configs,
            &self.store.tables.share_groups,
        )
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("app.timeout_seconds must be > 0"));
    }
    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.bot_username.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_username must be non-empty"));
    }
    if cfg.archiver.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("archiver.endpoint must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.archiver.endpoint).is_err() {
        return Err(ConfigError::Invalid("archiver.endpoint must be a valid URL"));
    }
    if reqwest::Url::parse(&cfg.telegraph.api_base).is_err() {
        return Err(ConfigError::Invalid("telegraph.api_base must be a valid URL"));
    }

    let tables = &cfg.store.tables;
    if tables.backups.trim().is_empty() {
        return Err(ConfigError::Invalid("store.tables.backups must be non-empty"));
    }
    if tables.configs.trim().is_empty() {
        return Err(ConfigError::Invalid("store.tables.configs must be non-empty"));
    }
    if tables.share_groups.trim().is_empty() {
        return Err(ConfigError::Invalid("store.tables.share_groups must be non-empty"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  timeout_seconds: 60

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  bot_username: "wbbubot"
  docs_url: "https://zedekul.github.io/wbbubot/"

store:
  tables:
    backups: "wbbu-backups"
    configs: "wbbu-configs"
    share_groups: "wbbu-share-groups"

archiver:
  endpoint: "http://127.0.0.1:8080/"

telegraph:
  api_base: "https://api.telegra.ph/"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.store.tables, TableNames::default());
    }

    #[test]
    fn optional_sections_default() {
        let raw = r#"app:
  data_dir: "./data"
  timeout_seconds: 30
telegram:
  bot_token: "t"
  bot_username: "bot"
archiver:
  endpoint: "http://localhost:1/"
"#;
        let cfg: Config = serde_yaml::from_str(raw).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.telegraph.api_base, "https://api.telegra.ph/");
        assert_eq!(cfg.telegram.docs_url, default_docs_url());
        assert_eq!(cfg.store.database_url, None);
    }

    #[test]
    fn invalid_bot_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.bot_token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("telegram.bot_token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_timeout_and_endpoint() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(m)) if m.contains("timeout")));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.archiver.endpoint = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(m)) if m.contains("archiver")));
    }

    #[test]
    fn invalid_table_names() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.store.tables.backups = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.store.tables.share_groups = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.telegram.bot_username, "wbbubot");
    }
}
