//! Configuration management
//!
//! This module handles loading, saving, and migrating the relo configuration file.
//! The configuration file is stored in TOML format at ~/.config/relo/config.toml,
//! or under `$RELO_CONFIG_DIR` when that variable is set.
//!
//! Changes to schema_version require migration support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::conflict::ConflictAction;
use crate::error::{Error, Result};

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "RELO_CONFIG_DIR";

const DEFAULT_OUTPUT: &str = "human";
const DEFAULT_COLOR: &str = "auto";
const DEFAULT_CONFLICT: &str = "ask";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Configured aliases
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

/// Default settings for CLI and engine behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output format: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never"
    #[serde(default = "default_color")]
    pub color: String,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,

    /// Collision policy: "ask", "overwrite", "skip" or "rename"
    #[serde(default = "default_conflict")]
    pub conflict: String,

    /// Items relocated in parallel within one batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for each individual store call, in milliseconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_conflict() -> String {
    DEFAULT_CONFLICT.to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_call_timeout() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            progress: true,
            conflict: default_conflict(),
            concurrency: default_concurrency(),
            call_timeout_ms: default_call_timeout(),
        }
    }
}

impl Defaults {
    /// The configured fixed policy, or `None` when the user should be asked
    pub fn conflict_policy(&self) -> Result<Option<ConflictAction>> {
        if self.conflict.eq_ignore_ascii_case("ask") {
            return Ok(None);
        }
        self.conflict
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid conflict policy '{}'", self.conflict)))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            aliases: Vec::new(),
        }
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("relo"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Directory holding the config file, the activity log and settings
    pub fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade relo.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, mut config: Config) -> Result<Config> {
        tracing::info!(
            from = config.schema_version,
            to = SCHEMA_VERSION,
            "migrating configuration"
        );
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = ConfigManager::with_path(config_path);
        (manager, temp_dir)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.defaults.output, "human");
        assert_eq!(config.defaults.color, "auto");
        assert!(config.defaults.progress);
        assert_eq!(config.defaults.conflict, "ask");
        assert_eq!(config.defaults.concurrency, 1);
        assert_eq!(config.defaults.call_timeout(), Duration::from_secs(30));
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn test_conflict_policy() {
        let mut defaults = Defaults::default();
        assert_eq!(defaults.conflict_policy().unwrap(), None);

        defaults.conflict = "rename".into();
        assert_eq!(
            defaults.conflict_policy().unwrap(),
            Some(ConflictAction::Rename)
        );

        defaults.conflict = "sometimes".into();
        assert!(matches!(defaults.conflict_policy(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let (manager, _temp_dir) = temp_config_manager();
        let config = manager.load().unwrap();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_partial_defaults_are_filled() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(
            manager.config_path(),
            "schema_version = 1\n[defaults]\nconcurrency = 4\n",
        )
        .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.defaults.concurrency, 4);
        assert_eq!(config.defaults.call_timeout_ms, 30_000);
        assert_eq!(config.defaults.conflict, "ask");
    }

    #[test]
    fn test_save_and_load() {
        let (manager, _temp_dir) = temp_config_manager();

        let mut config = Config::default();
        config
            .aliases
            .push(Alias::new("test", "http://localhost:9000", "minioadmin", "minioadmin"));

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();

        assert_eq!(loaded.aliases.len(), 1);
        assert_eq!(loaded.aliases[0].name, "test");
        assert_eq!(manager.config_dir(), _temp_dir.path());
    }

    #[test]
    fn test_schema_version_too_new() {
        let (manager, _temp_dir) = temp_config_manager();

        let content = format!("schema_version = {}\n", SCHEMA_VERSION + 1);
        std::fs::write(manager.config_path(), content).unwrap();

        let result = manager.load();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("newer than supported")
        );
    }
}
