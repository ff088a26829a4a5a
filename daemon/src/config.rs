use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

pub fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

fn default_socket_path() -> PathBuf {
    if running_as_root() {
        PathBuf::from(common::DEFAULT_SOCKET_PATH)
    } else {
        PathBuf::from(common::USER_SOCKET_PATH)
    }
}

fn default_db_path() -> PathBuf {
    if running_as_root() {
        PathBuf::from(common::DEFAULT_DB_PATH)
    } else {
        PathBuf::from(common::USER_DB_PATH)
    }
}

fn default_max_page_size() -> usize { common::DEFAULT_MAX_PAGE_SIZE }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            db_path: default_db_path(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Jobs inserted into the store at startup.
    #[serde(default)]
    pub jobs: Vec<common::Job>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    /// Explicit path if given, otherwise the first default location that
    /// exists, otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidate = if running_as_root() {
            common::DEFAULT_CONFIG_PATH
        } else {
            common::USER_CONFIG_PATH
        };
        let candidate = Path::new(candidate);
        if candidate.exists() {
            Self::from_file(candidate)
        } else {
            Ok(Config::default())
        }
    }

    /// Merge with another config, preferring values from other
    pub fn merge(&mut self, other: Config) {
        self.server.socket_path = other.server.socket_path;
        self.server.db_path = other.server.db_path;
        self.server.max_page_size = other.server.max_page_size;

        self.logging.level = other.logging.level;
        if other.logging.output.is_some() {
            self.logging.output = other.logging.output;
        }

        // Jobs - append
        self.jobs.extend(other.jobs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_with_seed_jobs() {
        let yaml = r#"
server:
  socket_path: /tmp/test-lookout.sock
  max_page_size: 50
logging:
  level: debug
jobs:
  - id: job-1
    queue: gpu
    job_set: training
    owner: alice
    priority: 1.0
    submitted: 2024-03-01T12:00:00Z
    state: QUEUED
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.socket_path, PathBuf::from("/tmp/test-lookout.sock"));
        assert_eq!(config.server.max_page_size, 50);
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Debug);
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].state, common::JobState::Queued);
        assert!(config.jobs[0].runs.is_empty());
    }

    #[test]
    fn test_toml_defaults_missing_sections() {
        let config: Config = toml::from_str("[logging]\nlevel = \"warn\"\n").unwrap();
        assert_eq!(config.server.max_page_size, 500);
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Warn);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let logging = LoggingConfig { level: "chatty".to_string(), output: None };
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_merge_prefers_other_and_appends_jobs() {
        let mut base = Config::default();
        base.logging.output = Some(PathBuf::from("/tmp/base.log"));

        let mut other = Config::default();
        other.server.max_page_size = 10;
        other.logging.level = "error".to_string();

        base.merge(other);
        assert_eq!(base.server.max_page_size, 10);
        assert_eq!(base.logging.level, "error");
        assert_eq!(base.logging.output, Some(PathBuf::from("/tmp/base.log")));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(Config::from_file(Path::new("config.ini")).is_err());
    }
}
