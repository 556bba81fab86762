//! Path parsing and key arithmetic
//!
//! Handles parsing of remote paths in the format: alias/bucket[/key]
//! Local paths are passed through as-is. Also hosts the helpers that derive
//! names, parent prefixes and trash locations from object keys.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reserved prefix under which soft-deleted objects are kept
pub const TRASH_PREFIX: &str = ".trash/";

/// An account-scoped bucket identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Container {
    /// Alias (account) name
    pub alias: String,
    /// Bucket name
    pub bucket: String,
}

impl Container {
    pub fn new(alias: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            bucket: bucket.into(),
        }
    }

    /// Fail unless both the alias and the bucket are set
    pub fn ensure_active(&self) -> Result<()> {
        if self.alias.is_empty() || self.bucket.is_empty() {
            return Err(Error::Precondition("no active container".into()));
        }
        Ok(())
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.alias, self.bucket)
    }
}

/// A parsed remote path pointing to an S3 location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    /// Alias name
    pub alias: String,
    /// Bucket name
    pub bucket: String,
    /// Object key (empty for bucket root)
    pub key: String,
    /// Whether the path ends with a slash (directory semantics)
    pub is_dir: bool,
}

impl RemotePath {
    /// Create a new RemotePath
    pub fn new(
        alias: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let is_dir = key.ends_with('/') || key.is_empty();
        Self {
            alias: alias.into(),
            bucket: bucket.into(),
            key,
            is_dir,
        }
    }

    /// The container this path lives in
    pub fn container(&self) -> Container {
        Container::new(&self.alias, &self.bucket)
    }

    /// The key interpreted as a folder prefix ("" for the bucket root)
    pub fn prefix(&self) -> String {
        normalize_prefix(&self.key)
    }

    /// Get the full path as a string (alias/bucket/key)
    pub fn to_full_path(&self) -> String {
        if self.key.is_empty() {
            format!("{}/{}", self.alias, self.bucket)
        } else {
            format!("{}/{}/{}", self.alias, self.bucket, self.key)
        }
    }
}

impl std::fmt::Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_full_path())
    }
}

/// Parsed path that can be either local or remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    /// Local filesystem path
    Local(std::path::PathBuf),
    /// Remote S3 path
    Remote(RemotePath),
}

impl ParsedPath {
    /// Check if this is a remote path
    pub fn is_remote(&self) -> bool {
        matches!(self, ParsedPath::Remote(_))
    }

    /// Check if this is a local path
    pub fn is_local(&self) -> bool {
        matches!(self, ParsedPath::Local(_))
    }

    /// Get the remote path if this is a remote path
    pub fn as_remote(&self) -> Option<&RemotePath> {
        match self {
            ParsedPath::Remote(p) => Some(p),
            ParsedPath::Local(_) => None,
        }
    }

    /// Get the local path if this is a local path
    pub fn as_local(&self) -> Option<&std::path::PathBuf> {
        match self {
            ParsedPath::Local(p) => Some(p),
            ParsedPath::Remote(_) => None,
        }
    }
}

/// Parse a path string into a ParsedPath
///
/// Remote paths have the format: alias/bucket[/key]
/// Local paths are anything that:
/// - Starts with / (absolute path)
/// - Starts with ./ or ../ (relative path)
/// - Contains no / but looks like a file name
/// - Or doesn't match the alias/bucket pattern
pub fn parse_path(path: &str) -> Result<ParsedPath> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    if path.starts_with('/') {
        return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
    }

    if path.starts_with("./") || path.starts_with("../") {
        return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
    }

    #[cfg(windows)]
    if path.len() >= 2 && path.chars().nth(1) == Some(':') {
        return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
    }

    let parts: Vec<&str> = path.splitn(3, '/').collect();

    match parts.as_slice() {
        [single] => {
            if single.contains('.') || single.contains('\\') {
                Ok(ParsedPath::Local(std::path::PathBuf::from(path)))
            } else {
                Err(Error::InvalidPath(format!(
                    "Path '{path}' is incomplete. Use format: alias/bucket[/key]"
                )))
            }
        }
        [alias, bucket] | [alias, bucket, _] => {
            if !is_valid_alias_name(alias) {
                return Ok(ParsedPath::Local(std::path::PathBuf::from(path)));
            }
            if bucket.is_empty() {
                return Err(Error::InvalidPath("Bucket name cannot be empty".into()));
            }
            let key = parts.get(2).copied().unwrap_or_default();
            Ok(ParsedPath::Remote(RemotePath::new(*alias, *bucket, key)))
        }
        _ => Err(Error::InvalidPath(format!("Invalid path format: {path}"))),
    }
}

/// Parse a path that must be remote
pub fn parse_remote(path: &str) -> Result<RemotePath> {
    match parse_path(path)? {
        ParsedPath::Remote(remote) => Ok(remote),
        ParsedPath::Local(local) => Err(Error::InvalidPath(format!(
            "'{}' is a local path. Use format: alias/bucket[/key]",
            local.display()
        ))),
    }
}

/// Check if a string is a valid alias name
pub(crate) fn is_valid_alias_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Last path segment of a key, without the folder slash
pub fn key_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Prefix of the folder containing `key` ("" at the root)
pub fn parent_prefix(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &key[..=pos],
        None => "",
    }
}

/// Turn user input into a folder prefix: no leading slash, one trailing slash
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Whether `key` is inside the trash
pub fn is_trashed(key: &str) -> bool {
    key.starts_with(TRASH_PREFIX)
}

/// Where `key` lands when soft-deleted
pub fn trash_key(key: &str) -> String {
    format!("{TRASH_PREFIX}{key}")
}

/// Original location of a trashed key
pub fn untrash_key(key: &str) -> Option<&str> {
    key.strip_prefix(TRASH_PREFIX).filter(|k| !k.is_empty())
}
