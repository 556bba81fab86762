//! ObjectStore trait definition
//!
//! This trait is the narrow contract the relocation engine needs from an
//! S3-compatible backend. It allows the core to be decoupled from the
//! specific SDK and to be driven by in-memory stores in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::{Container, key_name};

/// An object (or folder marker) as seen in a fresh listing
///
/// Folders are a naming convention: a folder key ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Full key, unique within its container
    pub key: String,

    /// Last path segment
    pub name: String,

    /// Size in bytes (0 for folder markers)
    pub size: u64,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// Whether this is a folder key
    pub is_folder: bool,
}

impl ObjectRef {
    /// Create a new ObjectRef for a file
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        let key = key.into();
        Self {
            name: key_name(&key).to_string(),
            key,
            size,
            last_modified: None,
            is_folder: false,
        }
    }

    /// Create a new ObjectRef for a folder; a trailing slash is added if missing
    pub fn folder(key: impl Into<String>) -> Self {
        let mut key = key.into();
        if !key.ends_with('/') {
            key.push('/');
        }
        Self {
            name: key_name(&key).to_string(),
            key,
            size: 0,
            last_modified: None,
            is_folder: true,
        }
    }

    /// Build from a raw listing key, inferring folder-ness from the trailing slash
    pub fn from_key(key: impl Into<String>, size: u64) -> Self {
        let key = key.into();
        if key.ends_with('/') {
            Self::folder(key)
        } else {
            Self::file(key, size)
        }
    }

    /// Human-readable size
    pub fn size_human(&self) -> String {
        humansize::format_size(self.size, humansize::BINARY)
    }
}

/// User metadata stored with an object, keys lowercase
pub type Metadata = BTreeMap<String, String>;

/// Trait for S3-compatible storage operations
///
/// Keys ending in `/` address a whole folder: `copy_object` and
/// `delete_object` then act on the marker and every descendant. A store that
/// expands a folder into several requests bounds each request on its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object under `prefix`, recursively, folder markers included
    async fn list_objects(&self, container: &Container, prefix: &str) -> Result<Vec<ObjectRef>>;

    /// Server-side copy of one key (or a whole folder) to another key
    ///
    /// An empty `metadata` keeps what the source carries; otherwise it
    /// replaces the metadata of every copied object.
    async fn copy_object(
        &self,
        src: &Container,
        src_key: &str,
        dst: &Container,
        dst_key: &str,
        metadata: &Metadata,
    ) -> Result<()>;

    /// Body of a single object
    async fn get_object(&self, container: &Container, key: &str) -> Result<Vec<u8>>;

    /// User metadata of a single object
    async fn head_metadata(&self, container: &Container, key: &str) -> Result<Metadata>;

    /// Delete one key (or a whole folder)
    async fn delete_object(&self, container: &Container, key: &str) -> Result<()>;

    /// Store `data` under `key`
    async fn put_object(&self, container: &Container, key: &str, data: Vec<u8>)
    -> Result<ObjectRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_file() {
        let obj = ObjectRef::file("docs/report.txt", 1024);
        assert_eq!(obj.key, "docs/report.txt");
        assert_eq!(obj.name, "report.txt");
        assert_eq!(obj.size, 1024);
        assert!(!obj.is_folder);
        assert_eq!(obj.size_human(), "1 KiB");
    }

    #[test]
    fn test_object_ref_folder_adds_slash() {
        let obj = ObjectRef::folder("docs/2024");
        assert_eq!(obj.key, "docs/2024/");
        assert_eq!(obj.name, "2024");
        assert!(obj.is_folder);
        assert_eq!(obj.size, 0);
    }

    #[test]
    fn test_object_ref_from_key() {
        assert!(ObjectRef::from_key("a/", 0).is_folder);
        assert!(!ObjectRef::from_key("a", 3).is_folder);
    }
}
