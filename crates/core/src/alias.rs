//! Aliases: named S3 endpoints with their credentials
//!
//! Paths address a container as `alias/bucket`, so an alias name must be
//! usable as a path segment. Aliases live in the `[[aliases]]` array of the
//! config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::error::{Error, Result};
use crate::path::is_valid_alias_name;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_LOOKUP: &str = "auto";

/// Per-alias overrides for how the S3 client connects
///
/// Unset fields fall back to the defaults below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTuning {
    /// Attempts per SDK request, first try included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

impl ConnectionTuning {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
            .unwrap_or(Self::DEFAULT_MAX_ATTEMPTS)
            .max(1)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_CONNECT_TIMEOUT)
    }
}

/// One configured endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// "auto", "path" or "dns"
    #[serde(default = "default_lookup")]
    pub bucket_lookup: String,
    /// Record mutating operations in the activity log
    #[serde(default)]
    pub activity_log: bool,
    #[serde(default, skip_serializing_if = "ConnectionTuning::is_unset")]
    pub tuning: ConnectionTuning,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_lookup() -> String {
    DEFAULT_LOOKUP.to_string()
}

// The secret never reaches logs or error output
impl std::fmt::Debug for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alias")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket_lookup", &self.bucket_lookup)
            .field("activity_log", &self.activity_log)
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl Alias {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: default_region(),
            bucket_lookup: default_lookup(),
            activity_log: false,
            tuning: ConnectionTuning::default(),
        }
    }

    /// Whether requests address buckets in the path rather than the host
    pub fn path_style(&self) -> bool {
        self.bucket_lookup != "dns"
    }

    /// Reject aliases that could never be used in a path
    pub fn validate(&self) -> Result<()> {
        if !is_valid_alias_name(&self.name) {
            return Err(Error::Config(format!(
                "alias name '{}' may only contain letters, digits, '_' and '-'",
                self.name
            )));
        }
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config(format!("alias '{}' has no endpoint", self.name)));
        }
        if !matches!(self.bucket_lookup.as_str(), "auto" | "path" | "dns") {
            return Err(Error::Config(format!(
                "bucket lookup '{}' is not one of auto, path, dns",
                self.bucket_lookup
            )));
        }
        if self.tuning.max_attempts == Some(0) {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Reads and writes the aliases of one config file
pub struct AliasManager {
    config: ConfigManager,
}

impl AliasManager {
    pub fn new() -> Result<Self> {
        Ok(Self::with_config_manager(ConfigManager::new()?))
    }

    pub fn with_config_manager(config: ConfigManager) -> Self {
        Self { config }
    }

    /// Every alias, sorted by name
    pub fn list(&self) -> Result<Vec<Alias>> {
        let mut aliases = self.config.load()?.aliases;
        aliases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(aliases)
    }

    pub fn get(&self, name: &str) -> Result<Alias> {
        self.config
            .load()?
            .aliases
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::AliasNotFound(name.to_string()))
    }

    /// Store `alias`; returns `true` when it replaced one of the same name
    pub fn set(&self, alias: Alias) -> Result<bool> {
        alias.validate()?;
        let mut config = self.config.load()?;
        let replaced = match config.aliases.iter_mut().find(|a| a.name == alias.name) {
            Some(slot) => {
                *slot = alias;
                true
            }
            None => {
                config.aliases.push(alias);
                false
            }
        };
        self.config.save(&config)?;
        Ok(replaced)
    }

    /// Drop the alias `name` and hand it back
    pub fn remove(&self, name: &str) -> Result<Alias> {
        let mut config = self.config.load()?;
        let pos = config
            .aliases
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| Error::AliasNotFound(name.to_string()))?;
        let removed = config.aliases.remove(pos);
        self.config.save(&config)?;
        Ok(removed)
    }
}
