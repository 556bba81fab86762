//! relo-core: Core library for the relo object relocation tool
//!
//! This crate provides the core functionality for relo, including:
//! - Configuration and alias management
//! - Path parsing and key arithmetic
//! - ObjectStore trait for S3 operations
//! - Conflict resolution for name collisions
//! - The relocation engine (move, copy, duplicate, delete, restore, rename, upload)
//! - Transfer job tracking
//! - Activity logging and a key-value port for persisted UI state
//!
//! This crate is designed to be independent of any specific S3 SDK,
//! allowing the engine to be driven by in-memory stores in tests.

pub mod activity;
pub mod alias;
pub mod config;
pub mod conflict;
pub mod error;
pub mod kv;
pub mod path;
pub mod relocation;
pub mod traits;
pub mod transfer;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{
    ActionType, ActivityEvent, ActivityFilter, ActivityLog, ActivityStatus, JsonlActivityLog,
    NoopActivityLog,
};
pub use alias::{Alias, AliasManager, ConnectionTuning};
pub use config::{Config, ConfigManager};
pub use conflict::{
    ChannelPrompt, ConflictAction, ConflictDecision, ConflictPrompt, ConflictQuery,
    ConflictResolver, FixedPolicy,
};
pub use error::{Error, Result};
pub use kv::{FileKv, KeyValueStore, MemoryKv};
pub use path::{Container, ParsedPath, RemotePath, parse_path, parse_remote};
pub use relocation::{
    BatchOutcome, BatchReport, EngineOptions, FailureReason, RelocationEngine, RelocationRequest,
    TransferMode, UploadItem, ValidationError,
};
pub use traits::{Metadata, ObjectRef, ObjectStore};
pub use transfer::{JobId, JobStatus, TransferJob, TransferJobTracker, TransferProgress};
pub use tree::{FolderNode, FolderTreeBuilder};
