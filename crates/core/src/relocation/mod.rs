//! Relocation engine
//!
//! The store only offers independent list, copy and delete calls. Moving an
//! object is therefore a copy followed by a delete of the source, and a
//! failed delete is checked against a fresh listing before it is reported.
//! Soft-delete, restore, duplicate, rename and upload are all expressed in
//! those terms.
//!
//! Batch entry points validate each item on its own, aggregate per-item
//! failures into a [`BatchReport`], and only return `Err` when the batch
//! cannot start at all.
//!
//! Every alias may have its own store. Copies inside one store stay
//! server-side; copies between stores stream each object through the engine.

mod report;
mod state;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::activity::{ActionType, ActivityEvent, ActivityLog, ActivityStatus, NoopActivityLog};
use crate::config::Defaults;
use crate::conflict::{ConflictPrompt, ConflictResolver, duplicate_name};
use crate::error::{Error, Result};
use crate::path::{
    Container, TRASH_PREFIX, is_trashed, key_name, normalize_prefix, parent_prefix, trash_key,
    untrash_key,
};
use crate::traits::{Metadata, ObjectRef, ObjectStore};
use crate::tree::{child_names, visible_entries};

pub use report::{
    BatchOutcome, BatchReport, FailureReason, ItemFailure, ItemSuccess, ValidationError,
};
pub use state::RelocationState;

use report::ItemResult;
use state::Attempt;

/// Metadata key holding the key an object had before it was trashed
pub const ORIGINAL_PATH: &str = "original-path";
/// Metadata key holding when an object was trashed (RFC 3339)
pub const DELETED_AT: &str = "deleted-at";

/// Whether the source survives a relocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Copy,
    Move,
}

impl TransferMode {
    const fn action(self) -> ActionType {
        match self {
            Self::Copy => ActionType::Copy,
            Self::Move => ActionType::Move,
        }
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Copy => "copy",
            Self::Move => "move",
        })
    }
}

/// One item to relocate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationRequest {
    pub source: ObjectRef,
    pub source_container: Container,
    /// Folder prefix at the destination, "" or ending in `/`
    pub dest_prefix: String,
    pub dest_container: Container,
    pub mode: TransferMode,
    /// Name at the destination when it differs from the source name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_name: Option<String>,
    /// Metadata stamped on the copies; empty keeps the source's
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl RelocationRequest {
    pub fn new(
        source: ObjectRef,
        source_container: Container,
        dest_container: Container,
        dest_prefix: &str,
        mode: TransferMode,
    ) -> Self {
        Self {
            source,
            source_container,
            dest_prefix: normalize_prefix(dest_prefix),
            dest_container,
            mode,
            dest_name: None,
            metadata: Metadata::new(),
        }
    }

    /// A request whose source and destination share `container`
    pub fn within(
        container: &Container,
        source: ObjectRef,
        dest_prefix: &str,
        mode: TransferMode,
    ) -> Self {
        Self::new(source, container.clone(), container.clone(), dest_prefix, mode)
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.dest_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Destination prefix plus name, with a trailing slash for folders
    pub fn dest_key(&self) -> String {
        let name = self.dest_name.as_deref().unwrap_or(&self.source.name);
        let mut key = format!("{}{}", self.dest_prefix, name);
        if self.source.is_folder {
            key.push('/');
        }
        key
    }

    /// The destination key, or why the destination is illegal
    pub fn validate(&self) -> std::result::Result<String, ValidationError> {
        if let Some(name) = &self.dest_name
            && (name.is_empty() || name.contains('/'))
        {
            return Err(ValidationError::InvalidName(name.clone()));
        }

        let dest_key = self.dest_key();
        if self.source_container != self.dest_container {
            return Ok(dest_key);
        }

        let key = self.source.key.as_str();
        if dest_key == key {
            return Err(ValidationError::SameLocation);
        }
        if self.source.is_folder && dest_key.starts_with(key) {
            return Err(ValidationError::IntoSelf);
        }
        if !self.source.is_folder && dest_key.starts_with(&format!("{key}/")) {
            return Err(ValidationError::FileIntoSelf);
        }
        Ok(dest_key)
    }
}

/// A file to upload, addressed relative to the destination prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// `name.ext` or `dir/sub/name.ext`
    pub relative_path: String,
    pub data: Vec<u8>,
}

impl UploadItem {
    pub fn new(relative_path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            relative_path: relative_path.into(),
            data,
        }
    }
}

/// Tuning for batch execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Items in flight at once; each item's own steps stay sequential
    pub concurrency: usize,
    /// Deadline for every single-key store request
    pub call_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Defaults> for EngineOptions {
    fn from(defaults: &Defaults) -> Self {
        Self {
            concurrency: defaults.concurrency.max(1),
            call_timeout: defaults.call_timeout(),
        }
    }
}

enum Planned<T> {
    Run(T),
    Skip,
    Reject(FailureReason),
}

/// Where a relocated item ended up
struct Landed {
    key: String,
    reclassified: bool,
}

/// Orchestrates relocations against one [`ObjectStore`] per alias
pub struct RelocationEngine {
    store: Arc<dyn ObjectStore>,
    /// Stores of further aliases; anything else goes to `store`
    stores: HashMap<String, Arc<dyn ObjectStore>>,
    activity: Arc<dyn ActivityLog>,
    options: EngineOptions,
    cancel: CancellationToken,
}

impl RelocationEngine {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            stores: HashMap::new(),
            activity: Arc::new(NoopActivityLog),
            options: EngineOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Route containers of `alias` to `store`
    pub fn with_store(mut self, alias: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(alias.into(), store);
        self
    }

    pub fn with_activity_log(mut self, activity: Arc<dyn ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a token; cancelling it stops batches between items
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn store(&self, container: &Container) -> &dyn ObjectStore {
        self.stores
            .get(&container.alias)
            .unwrap_or(&self.store)
            .as_ref()
    }

    /// Whether a server-side copy can reach from `a` to `b`
    fn shares_store(&self, a: &Container, b: &Container) -> bool {
        a.alias == b.alias
            || (!self.stores.contains_key(&a.alias) && !self.stores.contains_key(&b.alias))
    }

    /// Bound one single-key request by the per-call deadline
    async fn call<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.options.call_timeout;
        tokio::time::timeout(limit, op)
            .await
            .map_err(|_| Error::Timeout(limit))?
    }

    /// A folder key fans out into many requests inside the store, each
    /// bounded there; only a single key gets the deadline here.
    async fn call_on<T>(&self, key: &str, op: impl Future<Output = Result<T>>) -> Result<T> {
        if key.ends_with('/') {
            op.await
        } else {
            self.call(op).await
        }
    }

    /// Fresh recursive listing of `prefix`
    ///
    /// A listing may span several pages; the store bounds each page.
    pub async fn list(&self, container: &Container, prefix: &str) -> Result<Vec<ObjectRef>> {
        self.store(container).list_objects(container, prefix).await
    }

    /// Top-level contents of the trash, one entry per deleted item
    ///
    /// A folder entry carries the total size and the newest timestamp of
    /// what it holds.
    pub async fn list_trash(&self, container: &Container) -> Result<Vec<ObjectRef>> {
        container.ensure_active()?;
        let listing = self.list(container, TRASH_PREFIX).await?;
        let mut entries = visible_entries(&listing, TRASH_PREFIX);
        for entry in entries.iter_mut().filter(|e| e.is_folder) {
            let below: Vec<&ObjectRef> = listing
                .iter()
                .filter(|o| o.key.starts_with(&entry.key))
                .collect();
            entry.size = below.iter().map(|o| o.size).sum();
            entry.last_modified = below.iter().filter_map(|o| o.last_modified).max();
        }
        Ok(entries)
    }

    /// Create an empty folder `name` under `parent`
    pub async fn create_folder(
        &self,
        container: &Container,
        parent: &str,
        name: &str,
    ) -> Result<ObjectRef> {
        container.ensure_active()?;
        let name = name.trim();
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(Error::InvalidPath(format!("invalid folder name '{name}'")));
        }
        let key = format!("{}{name}/", normalize_prefix(parent));
        if key == TRASH_PREFIX {
            return Err(Error::InvalidPath(format!(
                "'{TRASH_PREFIX}' is reserved for deleted items"
            )));
        }
        if !self.list(container, &key).await?.is_empty() {
            return Err(Error::Conflict(format!("{container}/{key} already exists")));
        }

        let result = self
            .call(self.store(container).put_object(container, &key, Vec::new()))
            .await;
        let mut event = ActivityEvent::new(
            container,
            ActionType::CreateFolder,
            if result.is_ok() {
                ActivityStatus::Success
            } else {
                ActivityStatus::Failed
            },
        )
        .paths(None, Some(&key));
        if let Err(e) = &result {
            event = event.error(e.to_string());
        }
        self.activity.record(event);

        result?;
        tracing::info!(container = %container, key = %key, "folder created");
        Ok(ObjectRef::folder(key))
    }

    /// Relocate one item, outside of any batch
    pub async fn relocate(
        &self,
        request: &RelocationRequest,
    ) -> std::result::Result<ItemSuccess, FailureReason> {
        let landed = self.relocate_as(request, request.mode.action()).await?;
        Ok(ItemSuccess {
            name: request.source.name.clone(),
            key: landed.key,
        })
    }

    /// Relocate one item, reporting every file of a folder as it lands
    ///
    /// A folder is carried over one object at a time: markers are recreated
    /// empty, each file is relocated on its own, and for a move the emptied
    /// source folder goes last. Files that landed before a failure stay
    /// where they are, so running the same request again picks up the rest.
    pub async fn relocate_each(
        &self,
        request: &RelocationRequest,
        on_file: &(dyn Fn(&ObjectRef) + Send + Sync),
    ) -> std::result::Result<ItemSuccess, FailureReason> {
        if !request.source.is_folder {
            return self.relocate(request).await;
        }

        let dest_key = request.validate()?;
        let src = &request.source_container;
        let dst = &request.dest_container;
        let root = request.source.key.as_str();
        let copy_failure = |e: Error| FailureReason::CopyFailure(e.to_string());

        let objects = self.list(src, root).await.map_err(copy_failure)?;
        if objects.is_empty() {
            return Err(copy_failure(Error::NotFound(format!("{src}/{root}"))));
        }

        for object in &objects {
            if self.cancel.is_cancelled() {
                return Err(FailureReason::Cancelled);
            }
            let target = format!("{dest_key}{}", &object.key[root.len()..]);
            if object.is_folder {
                self.call(self.store(dst).put_object(dst, &target, Vec::new()))
                    .await
                    .map_err(copy_failure)?;
                continue;
            }
            let step = RelocationRequest::new(
                object.clone(),
                src.clone(),
                dst.clone(),
                parent_prefix(&target),
                request.mode,
            );
            self.relocate_as(&step, request.mode.action()).await?;
            on_file(object);
        }

        if request.mode == TransferMode::Move {
            let mut attempt = Attempt::new(root);
            attempt.advance(RelocationState::Deleting);
            self.remove_verified(&mut attempt, src, &request.source)
                .await?;
            attempt.advance(RelocationState::Succeeded);
        }
        Ok(ItemSuccess {
            name: request.source.name.clone(),
            key: dest_key,
        })
    }

    pub async fn move_items(
        &self,
        src: &Container,
        items: &[ObjectRef],
        dest: &Container,
        dest_prefix: &str,
    ) -> Result<BatchReport> {
        self.relocate_items(src, items, dest, dest_prefix, TransferMode::Move)
            .await
    }

    pub async fn copy_items(
        &self,
        src: &Container,
        items: &[ObjectRef],
        dest: &Container,
        dest_prefix: &str,
    ) -> Result<BatchReport> {
        self.relocate_items(src, items, dest, dest_prefix, TransferMode::Copy)
            .await
    }

    async fn relocate_items(
        &self,
        src: &Container,
        items: &[ObjectRef],
        dest: &Container,
        dest_prefix: &str,
        mode: TransferMode,
    ) -> Result<BatchReport> {
        ensure_batch(src, items)?;
        dest.ensure_active()?;

        let action = mode.action();
        let work = items
            .iter()
            .map(|item| {
                let request = RelocationRequest::new(
                    item.clone(),
                    src.clone(),
                    dest.clone(),
                    dest_prefix,
                    mode,
                );
                (item.name.clone(), request)
            })
            .collect();

        let report = self
            .run_batch(work, |name, request| {
                self.relocate_item(name, request, action)
            })
            .await;
        finish(action, &report);
        Ok(report)
    }

    /// Copy each item next to itself under a `_copy` name
    pub async fn duplicate_items(
        &self,
        container: &Container,
        items: &[ObjectRef],
    ) -> Result<BatchReport> {
        ensure_batch(container, items)?;

        // Names claimed per parent prefix, shared across the batch
        let mut claimed = HashMap::new();
        let mut work = Vec::with_capacity(items.len());
        for item in items {
            let prefix = parent_prefix(&item.key).to_string();
            let taken = match claimed.entry(prefix.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let listing = self.list(container, &prefix).await?;
                    entry.insert(child_names(&listing, &prefix))
                }
            };
            let name = duplicate_name(&item.name, item.is_folder, taken);
            taken.insert(name.clone());
            let request =
                RelocationRequest::within(container, item.clone(), &prefix, TransferMode::Copy)
                    .renamed(name);
            work.push((item.name.clone(), request));
        }

        let report = self
            .run_batch(work, |name, request| {
                self.relocate_item(name, request, ActionType::Duplicate)
            })
            .await;
        finish(ActionType::Duplicate, &report);
        Ok(report)
    }

    /// Soft-delete into the trash when enabled, otherwise delete for good
    ///
    /// Items already in the trash are always deleted for good. Items inside a
    /// folder that is part of the same batch go with that folder.
    pub async fn delete_items(
        &self,
        container: &Container,
        items: &[ObjectRef],
        trash_enabled: bool,
    ) -> Result<BatchReport> {
        ensure_batch(container, items)?;

        let work = outermost(items)
            .into_iter()
            .map(|item| (item.name.clone(), item))
            .collect();
        let report = self
            .run_batch(work, |name, item| {
                self.delete_item(name, container, item, trash_enabled)
            })
            .await;
        finish(ActionType::Delete, &report);
        Ok(report)
    }

    async fn delete_item(
        &self,
        name: String,
        container: &Container,
        item: ObjectRef,
        trash_enabled: bool,
    ) -> ItemResult {
        if trash_enabled && !is_trashed(&item.key) {
            let dest_prefix = format!("{TRASH_PREFIX}{}", parent_prefix(&item.key));
            let stamp = trash_stamp(&item.key);
            let request =
                RelocationRequest::within(container, item, &dest_prefix, TransferMode::Move)
                    .with_metadata(stamp);
            return self.relocate_item(name, request, ActionType::Delete).await;
        }

        let mut attempt = Attempt::new(&item.key);
        attempt.advance(RelocationState::Deleting);
        let result = self.remove_verified(&mut attempt, container, &item).await;
        let failure = result.as_ref().err();
        if failure.is_none() {
            attempt.advance(RelocationState::Succeeded);
        }
        self.activity.record(
            attempt_event(container, ActionType::PermanentDelete, failure)
                .paths(Some(&item.key), None)
                .size(item.size),
        );

        match result {
            Ok(reclassified) => ItemResult::Succeeded {
                success: ItemSuccess {
                    name,
                    key: item.key,
                },
                reclassified,
            },
            Err(reason) => ItemResult::failed(name, reason),
        }
    }

    /// Move trashed items back to where they were deleted from
    ///
    /// The `original-path` stamped at delete time decides the target; items
    /// without one go back to their key minus the trash prefix.
    pub async fn restore_items(
        &self,
        container: &Container,
        items: &[ObjectRef],
    ) -> Result<BatchReport> {
        ensure_batch(container, items)?;

        let work = outermost(items)
            .into_iter()
            .map(|item| {
                let planned = if untrash_key(&item.key).is_some() {
                    Planned::Run(item.clone())
                } else {
                    Planned::Reject(ValidationError::NotInTrash(item.key.clone()).into())
                };
                (item.name, planned)
            })
            .collect();

        let report = self
            .run_batch(work, |name, planned| async move {
                match planned {
                    Planned::Run(item) => self.restore_item(name, container, item).await,
                    Planned::Skip => ItemResult::Skipped(name),
                    Planned::Reject(reason) => ItemResult::failed(name, reason),
                }
            })
            .await;
        finish(ActionType::Restore, &report);
        Ok(report)
    }

    async fn restore_item(&self, name: String, container: &Container, item: ObjectRef) -> ItemResult {
        let stamp = match self
            .call(self.store(container).head_metadata(container, &item.key))
            .await
        {
            Ok(stamp) => stamp,
            Err(e) => {
                tracing::debug!(key = %item.key, error = %e, "no trash stamp, restoring by key");
                Metadata::new()
            }
        };
        let Some(target) = restore_target(&item.key, &stamp) else {
            return ItemResult::failed(name, ValidationError::NotInTrash(item.key.clone()));
        };

        let request = RelocationRequest::within(
            container,
            item,
            parent_prefix(&target),
            TransferMode::Move,
        )
        .renamed(key_name(&target));
        self.relocate_item(name, request, ActionType::Restore).await
    }

    /// Delete everything under the trash prefix; returns how many objects went
    pub async fn empty_trash(&self, container: &Container) -> Result<usize> {
        container.ensure_active()?;
        let mut entries = self.list(container, TRASH_PREFIX).await?;
        entries.retain(|obj| obj.key != TRASH_PREFIX);
        if entries.is_empty() {
            return Ok(0);
        }

        let result = self
            .call_on(
                TRASH_PREFIX,
                self.store(container).delete_object(container, TRASH_PREFIX),
            )
            .await;
        let total: u64 = entries.iter().map(|e| e.size).sum();
        let mut event = ActivityEvent::new(
            container,
            ActionType::EmptyTrash,
            if result.is_ok() {
                ActivityStatus::Success
            } else {
                ActivityStatus::Failed
            },
        )
        .paths(Some(TRASH_PREFIX), None)
        .size(total);
        if let Err(e) = &result {
            event = event.error(e.to_string());
        }
        self.activity.record(event);

        result?;
        tracing::info!(container = %container, removed = entries.len(), "trash emptied");
        Ok(entries.len())
    }

    /// Give `item` a new name inside its current folder
    ///
    /// A collision with a sibling is settled by `prompt`.
    pub async fn rename_item(
        &self,
        container: &Container,
        item: &ObjectRef,
        new_name: &str,
        prompt: &dyn ConflictPrompt,
    ) -> Result<BatchReport> {
        container.ensure_active()?;
        if new_name.is_empty() || new_name.contains('/') {
            let mut report = BatchReport::default();
            report.push(ItemResult::failed(
                item.name.clone(),
                ValidationError::InvalidName(new_name.to_string()),
            ));
            return Ok(report);
        }

        let prefix = parent_prefix(&item.key);
        let listing = self.list(container, prefix).await?;
        let mut siblings = child_names(&listing, prefix);
        siblings.remove(&item.name);

        let mut resolver = ConflictResolver::new(siblings);
        let resolution = resolver.resolve(new_name, prompt).await;

        let mut report = BatchReport::default();
        let Some(final_name) = resolution.name else {
            report.push(ItemResult::Skipped(item.name.clone()));
            return Ok(report);
        };
        let request = RelocationRequest::within(container, item.clone(), prefix, TransferMode::Move)
            .renamed(final_name);
        report.push(
            self.relocate_item(item.name.clone(), request, ActionType::Rename)
                .await,
        );
        finish(ActionType::Rename, &report);
        Ok(report)
    }

    /// Store `files` under `dest_prefix`, settling name collisions first
    ///
    /// Names already present at the destination and names claimed by earlier
    /// files of the same batch both count as taken.
    pub async fn upload(
        &self,
        container: &Container,
        dest_prefix: &str,
        files: Vec<UploadItem>,
        prompt: &dyn ConflictPrompt,
    ) -> Result<BatchReport> {
        container.ensure_active()?;
        if files.is_empty() {
            return Err(Error::Precondition("no files selected".into()));
        }

        let dest_prefix = normalize_prefix(dest_prefix);
        let existing = self.list(container, &dest_prefix).await?;
        let mut resolver =
            ConflictResolver::new(child_names(&existing, &dest_prefix)).batch(files.len() > 1);

        let mut work = Vec::with_capacity(files.len());
        for file in files {
            let path = file.relative_path.trim_start_matches('/').to_string();
            let planned = if path.is_empty() || path.ends_with('/') {
                Planned::Reject(ValidationError::InvalidName(file.relative_path.clone()).into())
            } else if self.cancel.is_cancelled() {
                Planned::Reject(FailureReason::Cancelled)
            } else {
                match resolver.resolve(&path, prompt).await.name {
                    Some(name) => Planned::Run((format!("{dest_prefix}{name}"), file.data)),
                    None => Planned::Skip,
                }
            };
            work.push((path, planned));
        }

        let report = self
            .run_batch(work, |name, planned| async move {
                match planned {
                    Planned::Run((key, data)) => self.put_item(name, container, key, data).await,
                    Planned::Skip => ItemResult::Skipped(name),
                    Planned::Reject(reason) => ItemResult::failed(name, reason),
                }
            })
            .await;
        finish(ActionType::Upload, &report);
        Ok(report)
    }

    async fn put_item(
        &self,
        name: String,
        container: &Container,
        key: String,
        data: Vec<u8>,
    ) -> ItemResult {
        let size = data.len() as u64;
        let result = self
            .call(self.store(container).put_object(container, &key, data))
            .await
            .map_err(|e| FailureReason::UploadFailure(e.to_string()));
        self.activity.record(
            attempt_event(container, ActionType::Upload, result.as_ref().err())
                .paths(None, Some(&key))
                .size(size),
        );
        match result {
            Ok(_) => ItemResult::Succeeded {
                success: ItemSuccess { name, key },
                reclassified: false,
            },
            Err(reason) => ItemResult::failed(name, reason),
        }
    }

    /// Run `op` over `work` in order, at most `concurrency` items at a time
    ///
    /// Cancellation is observed when an item is about to start, never in
    /// the middle of one.
    async fn run_batch<T, F, Fut>(&self, work: Vec<(String, T)>, op: F) -> BatchReport
    where
        F: Fn(String, T) -> Fut,
        Fut: Future<Output = ItemResult>,
    {
        let op = &op;
        stream::iter(work)
            .map(|(name, item)| async move {
                if self.cancel.is_cancelled() {
                    return ItemResult::failed(name, FailureReason::Cancelled);
                }
                op(name, item).await
            })
            .buffered(self.options.concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    async fn relocate_item(
        &self,
        name: String,
        request: RelocationRequest,
        action: ActionType,
    ) -> ItemResult {
        match self.relocate_as(&request, action).await {
            Ok(landed) => ItemResult::Succeeded {
                success: ItemSuccess {
                    name,
                    key: landed.key,
                },
                reclassified: landed.reclassified,
            },
            Err(reason) => ItemResult::failed(name, reason),
        }
    }

    async fn relocate_as(
        &self,
        request: &RelocationRequest,
        action: ActionType,
    ) -> std::result::Result<Landed, FailureReason> {
        let source = &request.source;
        let mut attempt = Attempt::new(&source.key);

        let dest_key = match request.validate() {
            Ok(key) => key,
            Err(e) => {
                attempt.advance(RelocationState::Failed);
                return Err(e.into());
            }
        };

        attempt.advance(RelocationState::Copying);
        if let Err(e) = self.copy_to(request, &dest_key).await {
            attempt.advance(RelocationState::Failed);
            let reason = FailureReason::CopyFailure(e.to_string());
            self.record_relocation(request, action, &dest_key, Some(&reason));
            return Err(reason);
        }

        let mut reclassified = false;
        if request.mode == TransferMode::Move {
            attempt.advance(RelocationState::Deleting);
            match self
                .remove_verified(&mut attempt, &request.source_container, source)
                .await
            {
                Ok(spurious) => reclassified = spurious,
                Err(reason) => {
                    self.record_relocation(request, action, &dest_key, Some(&reason));
                    return Err(reason);
                }
            }
        }

        attempt.advance(RelocationState::Succeeded);
        self.record_relocation(request, action, &dest_key, None);
        Ok(Landed {
            key: dest_key,
            reclassified,
        })
    }

    /// Put a copy of the source at `dest_key`
    ///
    /// A folder copy that fails part way is undone, so a failed copy leaves
    /// the destination as it was.
    async fn copy_to(&self, request: &RelocationRequest, dest_key: &str) -> Result<()> {
        let src = &request.source_container;
        let dst = &request.dest_container;
        let key = request.source.key.as_str();
        let same_store = self.shares_store(src, dst);

        if !request.source.is_folder {
            return if same_store {
                self.call(
                    self.store(src)
                        .copy_object(src, key, dst, dest_key, &request.metadata),
                )
                .await
            } else {
                self.stream_object(src, key, dst, dest_key).await
            };
        }

        let existing: HashSet<String> = self
            .list(dst, dest_key)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();
        let copied = if same_store {
            self.store(src)
                .copy_object(src, key, dst, dest_key, &request.metadata)
                .await
        } else {
            self.stream_folder(src, key, dst, dest_key).await
        };

        match copied {
            Ok(()) => Ok(()),
            Err(e) => match self.roll_back(dst, dest_key, &existing).await {
                0 => Err(e),
                left => Err(Error::General(format!(
                    "{e}; {left} partial copies could not be removed from {dst}/{dest_key}"
                ))),
            },
        }
    }

    /// Copy one object between stores by reading it and writing it back
    async fn stream_object(
        &self,
        src: &Container,
        key: &str,
        dst: &Container,
        dest_key: &str,
    ) -> Result<()> {
        let data = self.call(self.store(src).get_object(src, key)).await?;
        self.call(self.store(dst).put_object(dst, dest_key, data))
            .await?;
        Ok(())
    }

    async fn stream_folder(
        &self,
        src: &Container,
        prefix: &str,
        dst: &Container,
        dest_prefix: &str,
    ) -> Result<()> {
        let objects = self.list(src, prefix).await?;
        if objects.is_empty() {
            return Err(Error::NotFound(format!("{src}/{prefix}")));
        }
        for object in &objects {
            let target = format!("{dest_prefix}{}", &object.key[prefix.len()..]);
            if object.is_folder {
                self.call(self.store(dst).put_object(dst, &target, Vec::new()))
                    .await?;
            } else {
                self.stream_object(src, &object.key, dst, &target).await?;
            }
        }
        Ok(())
    }

    /// Remove what a failed folder copy created below `dest_key`
    ///
    /// Returns how many created objects are still there. Markers that sit
    /// above keys which existed before are kept.
    async fn roll_back(&self, dst: &Container, dest_key: &str, existing: &HashSet<String>) -> usize {
        let listing = match self.list(dst, dest_key).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!(container = %dst, prefix = dest_key, error = %e, "cannot list partial copy");
                return 1;
            }
        };
        let (markers, files): (Vec<ObjectRef>, Vec<ObjectRef>) = listing
            .into_iter()
            .filter(|o| !existing.contains(&o.key))
            .partition(|o| o.is_folder);

        let mut left = 0;
        for object in files.iter().chain(markers.iter().rev()) {
            if object.is_folder && existing.iter().any(|k| k.starts_with(&object.key)) {
                continue;
            }
            let removed = self
                .call_on(&object.key, self.store(dst).delete_object(dst, &object.key))
                .await;
            if let Err(e) = removed {
                tracing::warn!(key = %object.key, error = %e, "partial copy not removed");
                left += 1;
            }
        }
        tracing::debug!(container = %dst, prefix = dest_key, left, "partial copy rolled back");
        left
    }

    /// Delete `item`; on error, decide from a fresh listing what really happened
    ///
    /// Returns `true` when the error turned out to be spurious.
    async fn remove_verified(
        &self,
        attempt: &mut Attempt<'_>,
        container: &Container,
        item: &ObjectRef,
    ) -> std::result::Result<bool, FailureReason> {
        let delete_error = match self
            .call_on(
                &item.key,
                self.store(container).delete_object(container, &item.key),
            )
            .await
        {
            Ok(()) => return Ok(false),
            Err(e) => e,
        };

        attempt.advance(RelocationState::Verifying);
        match self.still_present(container, item).await {
            Ok(false) => {
                tracing::warn!(
                    key = %item.key,
                    error = %delete_error,
                    "delete reported an error but the source is gone"
                );
                Ok(true)
            }
            Ok(true) => {
                attempt.advance(RelocationState::Failed);
                Err(FailureReason::DeleteFailureConfirmed(
                    delete_error.to_string(),
                ))
            }
            Err(list_error) => {
                attempt.advance(RelocationState::Failed);
                Err(FailureReason::VerificationFailure(format!(
                    "{delete_error}; listing failed: {list_error}"
                )))
            }
        }
    }

    async fn still_present(&self, container: &Container, item: &ObjectRef) -> Result<bool> {
        let listing = self.list(container, parent_prefix(&item.key)).await?;
        Ok(listing.iter().any(|obj| {
            obj.key == item.key || (item.is_folder && obj.key.starts_with(&item.key))
        }))
    }

    fn record_relocation(
        &self,
        request: &RelocationRequest,
        action: ActionType,
        dest_key: &str,
        failure: Option<&FailureReason>,
    ) {
        let mut event = attempt_event(&request.source_container, action, failure)
            .paths(Some(&request.source.key), Some(dest_key))
            .size(request.source.size);
        if request.dest_container != request.source_container {
            event = event.paths(
                Some(&request.source.key),
                Some(&format!("{}/{dest_key}", request.dest_container)),
            );
        }
        self.activity.record(event);
    }
}

fn ensure_batch(container: &Container, items: &[ObjectRef]) -> Result<()> {
    container.ensure_active()?;
    if items.is_empty() {
        return Err(Error::Precondition("no items selected".into()));
    }
    Ok(())
}

/// Items not already covered by a folder elsewhere in the batch
fn outermost(items: &[ObjectRef]) -> Vec<ObjectRef> {
    items
        .iter()
        .filter(|item| {
            !items.iter().any(|other| {
                other.is_folder && other.key != item.key && item.key.starts_with(&other.key)
            })
        })
        .cloned()
        .collect()
}

/// Metadata stamped on everything moved into the trash
fn trash_stamp(original_key: &str) -> Metadata {
    Metadata::from([
        (ORIGINAL_PATH.to_string(), original_key.to_string()),
        (DELETED_AT.to_string(), Timestamp::now().to_string()),
    ])
}

/// Where a trashed key goes back to
///
/// A stamp left by a folder delete names that folder and applies to
/// everything below it.
fn restore_target(key: &str, stamp: &Metadata) -> Option<String> {
    let by_layout = untrash_key(key)?.to_string();
    let Some(original) = stamp
        .get(ORIGINAL_PATH)
        .filter(|o| !o.is_empty() && !is_trashed(o))
    else {
        return Some(by_layout);
    };

    if original.ends_with('/') {
        let root = trash_key(original);
        return Some(match key.strip_prefix(root.as_str()) {
            Some(rest) => format!("{original}{rest}"),
            None => by_layout,
        });
    }
    Some(original.clone())
}

fn attempt_event(
    container: &Container,
    action: ActionType,
    failure: Option<&FailureReason>,
) -> ActivityEvent {
    match failure {
        None => ActivityEvent::new(container, action, ActivityStatus::Success),
        Some(reason) => ActivityEvent::new(container, action, ActivityStatus::Failed)
            .error(reason.to_string()),
    }
}

fn finish(action: ActionType, report: &BatchReport) {
    tracing::info!(
        action = %action,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        outcome = ?report.outcome(),
        "batch finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictAction, ConflictDecision, FixedPolicy};
    use crate::testing::{DeleteFault, MemoryStore};
    use crate::traits::MockObjectStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn bucket() -> Container {
        Container::new("minio", "photos")
    }

    fn engine(store: &Arc<MemoryStore>) -> RelocationEngine {
        RelocationEngine::new(store.clone())
    }

    fn file(key: &str) -> ObjectRef {
        ObjectRef::file(key, key.len() as u64)
    }

    #[derive(Default)]
    struct RecordingLog(Mutex<Vec<ActivityEvent>>);

    impl ActivityLog for RecordingLog {
        fn record(&self, event: ActivityEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    /// Answers collisions from a script and remembers what it was asked
    struct ScriptedPrompt {
        answers: Mutex<VecDeque<ConflictDecision>>,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompt {
        fn new(answers: impl IntoIterator<Item = ConflictDecision>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConflictPrompt for ScriptedPrompt {
        async fn resolve_conflict(&self, name: &str, _is_batch: bool) -> ConflictDecision {
            self.asked.lock().unwrap().push(name.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ConflictDecision::once(ConflictAction::Skip))
        }
    }

    fn untouchable_store() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store.expect_list_objects().never();
        store.expect_copy_object().never();
        store.expect_get_object().never();
        store.expect_head_metadata().never();
        store.expect_delete_object().never();
        store.expect_put_object().never();
        store
    }

    #[tokio::test]
    async fn test_folder_into_itself_never_reaches_store() {
        let engine = RelocationEngine::new(Arc::new(untouchable_store()));
        let c = bucket();
        let folder = ObjectRef::folder("a/");

        for dest in ["", "a/", "a/b/", "a/b/c/"] {
            let report = engine
                .move_items(&c, std::slice::from_ref(&folder), &c, dest)
                .await
                .unwrap();
            assert_eq!(report.outcome(), BatchOutcome::AllFailed, "dest {dest:?}");
            assert!(matches!(
                report.failed[0].reason,
                FailureReason::Validation(
                    ValidationError::SameLocation | ValidationError::IntoSelf
                )
            ));
        }
    }

    #[tokio::test]
    async fn test_file_under_its_own_key_rejected() {
        let engine = RelocationEngine::new(Arc::new(untouchable_store()));
        let c = bucket();

        let report = engine
            .move_items(&c, &[file("notes.txt")], &c, "notes.txt/archive/")
            .await
            .unwrap();
        assert_eq!(
            report.failed[0].reason,
            FailureReason::Validation(ValidationError::FileIntoSelf)
        );

        let report = engine
            .copy_items(&c, &[file("docs/notes.txt")], &c, "docs/")
            .await
            .unwrap();
        assert_eq!(
            report.failed[0].reason,
            FailureReason::Validation(ValidationError::SameLocation)
        );
    }

    #[tokio::test]
    async fn test_same_key_in_other_container_is_legal() {
        let c = bucket();
        let other = Container::new("minio", "backup");
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a/", "a/x.txt"]));

        let report = engine(&store)
            .copy_items(&c, &[ObjectRef::folder("a/")], &other, "")
            .await
            .unwrap();
        assert_eq!(report.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(store.keys(&other), vec!["a/", "a/x.txt"]);
    }

    #[tokio::test]
    async fn test_batch_with_middle_copy_failure() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["one.txt", "two.txt", "three.txt"]));
        store.fail_copy("two.txt");

        let items = [file("one.txt"), file("two.txt"), file("three.txt")];
        let report = engine(&store).move_items(&c, &items, &c, "dest").await.unwrap();

        assert_eq!(report.succeeded_names(), vec!["one.txt", "three.txt"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "two.txt");
        assert!(matches!(report.failed[0].reason, FailureReason::CopyFailure(_)));
        assert_eq!(report.outcome(), BatchOutcome::Partial);

        assert!(store.contains(&c, "two.txt"));
        assert!(!store.contains(&c, "dest/two.txt"));
        assert!(!store.calls().contains(&"delete two.txt".to_string()));
    }

    #[tokio::test]
    async fn test_spurious_delete_failure_is_success() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt"]));
        store.fail_delete("a.txt", DeleteFault::Spurious);

        let report = engine(&store).move_items(&c, &[file("a.txt")], &c, "b/").await.unwrap();

        assert_eq!(report.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(report.reclassified, vec!["a.txt".to_string()]);
        assert_eq!(store.keys(&c), vec!["b/a.txt"]);
        assert_eq!(store.calls().last().map(String::as_str), Some("list "));
    }

    #[tokio::test]
    async fn test_confirmed_delete_failure() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt"]));
        store.fail_delete("a.txt", DeleteFault::Refuse);

        let report = engine(&store).move_items(&c, &[file("a.txt")], &c, "b/").await.unwrap();

        assert!(matches!(
            report.failed[0].reason,
            FailureReason::DeleteFailureConfirmed(_)
        ));
        assert!(store.contains(&c, "a.txt"));
        assert!(store.contains(&c, "b/a.txt"));
    }

    #[tokio::test]
    async fn test_unverifiable_delete_failure() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt"]));
        store.fail_delete("a.txt", DeleteFault::Refuse);
        store.fail_list(true);

        let report = engine(&store).move_items(&c, &[file("a.txt")], &c, "b/").await.unwrap();
        match &report.failed[0].reason {
            FailureReason::VerificationFailure(detail) => {
                assert!(detail.contains("listing failed"));
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_folder_move_carries_descendants() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a/", "a/b/", "a/b/c.txt", "z/"]));

        let report = engine(&store)
            .move_items(&c, &[ObjectRef::folder("a/")], &c, "z/")
            .await
            .unwrap();

        assert_eq!(report.succeeded[0].key, "z/a/");
        assert_eq!(store.keys(&c), vec!["z/", "z/a/", "z/a/b/", "z/a/b/c.txt"]);
    }

    #[tokio::test]
    async fn test_copy_keeps_source() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt"]));

        engine(&store).copy_items(&c, &[file("a.txt")], &c, "b").await.unwrap();
        assert_eq!(store.keys(&c), vec!["a.txt", "b/a.txt"]);
        assert!(store.calls().iter().all(|call| !call.starts_with("delete")));
    }

    #[tokio::test]
    async fn test_restore_of_deleted_item_returns_original_key() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["docs/report.txt"]));
        let engine = engine(&store);

        let deleted = engine
            .delete_items(&c, &[file("docs/report.txt")], true)
            .await
            .unwrap();
        assert_eq!(deleted.succeeded[0].key, ".trash/docs/report.txt");
        assert_eq!(store.keys(&c), vec![".trash/docs/report.txt"]);

        let trashed = engine.list_trash(&c).await.unwrap();
        assert_eq!(trashed, vec![ObjectRef {
            size: 15,
            ..ObjectRef::folder(".trash/docs/")
        }]);
        let restored = engine.restore_items(&c, &trashed).await.unwrap();
        assert_eq!(restored.succeeded[0].key, "docs/");
        assert_eq!(store.keys(&c), vec!["docs/report.txt"]);
    }

    #[tokio::test]
    async fn test_restore_whole_trash_after_nested_delete() {
        let c = bucket();
        let store = Arc::new(
            MemoryStore::new().with_keys(&c, &["docs/", "docs/a.txt", "docs/sub/b.txt", "top.txt"]),
        );
        let engine = engine(&store);

        let deleted = engine
            .delete_items(
                &c,
                &[ObjectRef::folder("docs/"), file("docs/a.txt"), file("top.txt")],
                true,
            )
            .await
            .unwrap();
        assert_eq!(deleted.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(deleted.succeeded_names(), vec!["docs", "top.txt"]);

        let trashed = engine.list_trash(&c).await.unwrap();
        let keys: Vec<&str> = trashed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec![".trash/docs/", ".trash/top.txt"]);
        assert_eq!(trashed[0].size, 24);

        let restored = engine.restore_items(&c, &trashed).await.unwrap();
        assert_eq!(restored.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(
            store.keys(&c),
            vec!["docs/", "docs/a.txt", "docs/sub/b.txt", "top.txt"]
        );
    }

    #[tokio::test]
    async fn test_trashed_objects_are_stamped() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a/report.txt"]));

        engine(&store)
            .delete_items(&c, &[file("a/report.txt")], true)
            .await
            .unwrap();

        let stamp = store.metadata(&c, ".trash/a/report.txt");
        assert_eq!(stamp.get(ORIGINAL_PATH).map(String::as_str), Some("a/report.txt"));
        let deleted_at = stamp.get(DELETED_AT).unwrap();
        assert!(deleted_at.parse::<Timestamp>().is_ok());
    }

    #[test]
    fn test_restore_target() {
        let stamp = |original: &str| Metadata::from([(ORIGINAL_PATH.to_string(), original.to_string())]);

        assert_eq!(
            restore_target(".trash/x/y.txt", &stamp("elsewhere/y.txt")).as_deref(),
            Some("elsewhere/y.txt")
        );
        assert_eq!(
            restore_target(".trash/docs/sub/b.txt", &stamp("docs/")).as_deref(),
            Some("docs/sub/b.txt")
        );
        // stamps that are blank or point back into the trash are ignored
        assert_eq!(
            restore_target(".trash/x/y.txt", &stamp(".trash/y.txt")).as_deref(),
            Some("x/y.txt")
        );
        assert_eq!(
            restore_target(".trash/x/y.txt", &Metadata::new()).as_deref(),
            Some("x/y.txt")
        );
        assert_eq!(restore_target(".trash/", &Metadata::new()), None);
    }

    #[tokio::test]
    async fn test_restore_outside_trash_rejected() {
        let engine = RelocationEngine::new(Arc::new(untouchable_store()));
        let report = engine
            .restore_items(&bucket(), &[file("docs/report.txt")])
            .await
            .unwrap();
        assert!(matches!(
            report.failed[0].reason,
            FailureReason::Validation(ValidationError::NotInTrash(_))
        ));
    }

    #[tokio::test]
    async fn test_permanent_delete_paths() {
        let c = bucket();
        let store = Arc::new(
            MemoryStore::new().with_keys(&c, &["a.txt", "dir/", "dir/x", ".trash/old.txt"]),
        );
        let engine = engine(&store);

        // trash off: removed outright, folders recursively
        let report = engine
            .delete_items(&c, &[file("a.txt"), ObjectRef::folder("dir/")], false)
            .await
            .unwrap();
        assert_eq!(report.outcome(), BatchOutcome::AllSucceeded);

        // already trashed: permanent even with trash on
        engine
            .delete_items(&c, &[file(".trash/old.txt")], true)
            .await
            .unwrap();
        assert!(store.keys(&c).is_empty());
        assert!(store.calls().iter().all(|call| !call.starts_with("copy")));
    }

    #[tokio::test]
    async fn test_permanent_delete_verifies_failures() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt", "b.txt"]));
        store.fail_delete("a.txt", DeleteFault::Spurious);
        store.fail_delete("b.txt", DeleteFault::Refuse);

        let report = engine(&store)
            .delete_items(&c, &[file("a.txt"), file("b.txt")], false)
            .await
            .unwrap();
        assert_eq!(report.succeeded_names(), vec!["a.txt"]);
        assert_eq!(report.reclassified, vec!["a.txt".to_string()]);
        assert!(matches!(
            report.failed[0].reason,
            FailureReason::DeleteFailureConfirmed(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_trash() {
        let c = bucket();
        let store = Arc::new(
            MemoryStore::new().with_keys(&c, &[".trash/", ".trash/a.txt", ".trash/d/", ".trash/d/e", "keep.txt"]),
        );
        let log = Arc::new(RecordingLog::default());
        let engine = engine(&store).with_activity_log(log.clone());

        assert_eq!(engine.empty_trash(&c).await.unwrap(), 3);
        assert_eq!(store.keys(&c), vec!["keep.txt"]);
        assert_eq!(engine.empty_trash(&c).await.unwrap(), 0);

        let events = log.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActionType::EmptyTrash);
    }

    #[tokio::test]
    async fn test_duplicate_naming() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["docs/report.txt", "docs/photos/", "notes"]));
        let engine = engine(&store);

        let report = engine
            .duplicate_items(
                &c,
                &[
                    file("docs/report.txt"),
                    file("docs/report.txt"),
                    ObjectRef::folder("docs/photos/"),
                    file("notes"),
                ],
            )
            .await
            .unwrap();

        let keys: Vec<&str> = report.succeeded.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "docs/report_copy.txt",
                "docs/report_copy_1.txt",
                "docs/photos_copy/",
                "notes_copy"
            ]
        );
        assert!(store.contains(&c, "docs/report.txt"));
    }

    #[tokio::test]
    async fn test_rename_with_collision() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["docs/a.txt", "docs/b.txt"]));
        let engine = engine(&store);

        let report = engine
            .rename_item(&c, &file("docs/a.txt"), "b.txt", &FixedPolicy(ConflictAction::Rename))
            .await
            .unwrap();
        assert_eq!(report.succeeded[0].key, "docs/b_1.txt");
        assert_eq!(store.keys(&c), vec!["docs/b.txt", "docs/b_1.txt"]);

        let report = engine
            .rename_item(&c, &file("docs/b_1.txt"), "b.txt", &FixedPolicy(ConflictAction::Skip))
            .await
            .unwrap();
        assert_eq!(report.skipped, vec!["b_1.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_rename_rejects_bad_names() {
        let engine = RelocationEngine::new(Arc::new(untouchable_store()));
        let prompt = FixedPolicy(ConflictAction::Rename);
        for bad in ["", "x/y"] {
            let report = engine
                .rename_item(&bucket(), &file("a.txt"), bad, &prompt)
                .await
                .unwrap();
            assert!(matches!(
                report.failed[0].reason,
                FailureReason::Validation(ValidationError::InvalidName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_upload_sticky_rename() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["inbox/report.txt"]));
        let prompt = ScriptedPrompt::new([ConflictDecision::for_all(ConflictAction::Rename)]);

        let report = engine(&store)
            .upload(
                &c,
                "inbox",
                vec![
                    UploadItem::new("report.txt", b"first".to_vec()),
                    UploadItem::new("report.txt", b"second".to_vec()),
                ],
                &prompt,
            )
            .await
            .unwrap();

        let keys: Vec<&str> = report.succeeded.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["inbox/report_1.txt", "inbox/report_2.txt"]);
        assert_eq!(*prompt.asked.lock().unwrap(), vec!["report.txt".to_string()]);
        assert!(store.contains(&c, "inbox/report.txt"));
    }

    #[tokio::test]
    async fn test_upload_folder_renamed_as_a_unit() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["site/index.html"]));

        let report = engine(&store)
            .upload(
                &c,
                "",
                vec![
                    UploadItem::new("site/index.html", Vec::new()),
                    UploadItem::new("site/css/main.css", Vec::new()),
                ],
                &FixedPolicy(ConflictAction::Rename),
            )
            .await
            .unwrap();

        let keys: Vec<&str> = report.succeeded.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["site_1/index.html", "site_1/css/main.css"]);
    }

    #[tokio::test]
    async fn test_upload_skip_and_failure() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt"]));
        store.fail_put("b.txt");

        let report = engine(&store)
            .upload(
                &c,
                "",
                vec![
                    UploadItem::new("a.txt", Vec::new()),
                    UploadItem::new("b.txt", Vec::new()),
                    UploadItem::new("c.txt", b"c".to_vec()),
                ],
                &FixedPolicy(ConflictAction::Skip),
            )
            .await
            .unwrap();

        assert_eq!(report.skipped, vec!["a.txt".to_string()]);
        assert!(matches!(report.failed[0].reason, FailureReason::UploadFailure(_)));
        assert_eq!(report.succeeded_names(), vec!["c.txt"]);
    }

    #[tokio::test]
    async fn test_preconditions() {
        let engine = RelocationEngine::new(Arc::new(untouchable_store()));
        let c = bucket();

        let empty = engine.move_items(&c, &[], &c, "x/").await;
        assert!(matches!(empty, Err(Error::Precondition(_))));

        let inactive = Container::new("minio", "");
        let result = engine.delete_items(&inactive, &[file("a")], true).await;
        assert!(matches!(result, Err(Error::Precondition(_))));

        let result = engine
            .upload(&c, "", Vec::new(), &FixedPolicy(ConflictAction::Skip))
            .await;
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[tokio::test]
    async fn test_slow_copy_times_out() {
        let c = bucket();
        let store = Arc::new(
            MemoryStore::new()
                .with_keys(&c, &["a.txt"])
                .with_copy_delay(Duration::from_millis(500)),
        );
        let engine = engine(&store).with_options(EngineOptions {
            concurrency: 1,
            call_timeout: Duration::from_millis(20),
        });

        let report = engine.move_items(&c, &[file("a.txt")], &c, "b/").await.unwrap();
        match &report.failed[0].reason {
            FailureReason::CopyFailure(detail) => assert!(detail.contains("Timed out")),
            other => panic!("unexpected reason {other:?}"),
        }
        assert!(store.contains(&c, "a.txt"));
    }

    #[tokio::test]
    async fn test_cancelled_batch_touches_nothing() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt", "b.txt"]));
        let engine = engine(&store);
        engine.cancellation_token().cancel();

        let report = engine
            .move_items(&c, &[file("a.txt"), file("b.txt")], &c, "x/")
            .await
            .unwrap();
        assert!(report.was_cancelled());
        assert_eq!(report.failed.len(), 2);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_batch_keeps_input_order() {
        let c = bucket();
        let keys = ["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"];
        let store = Arc::new(MemoryStore::new().with_keys(&c, &keys));
        store.fail_copy("2.txt");
        let engine = engine(&store).with_options(EngineOptions {
            concurrency: 4,
            ..EngineOptions::default()
        });

        let items: Vec<ObjectRef> = keys.iter().map(|k| file(k)).collect();
        let report = engine.move_items(&c, &items, &c, "out/").await.unwrap();
        assert_eq!(
            report.succeeded_names(),
            vec!["1.txt", "3.txt", "4.txt", "5.txt"]
        );
        assert_eq!(report.failed_names(), vec!["2.txt"]);
    }

    #[tokio::test]
    async fn test_activity_events_per_attempt() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a.txt", "b.txt"]));
        store.fail_copy("b.txt");
        let log = Arc::new(RecordingLog::default());
        let engine = engine(&store).with_activity_log(log.clone());

        engine
            .move_items(&c, &[file("a.txt"), file("b.txt")], &c, "dir/")
            .await
            .unwrap();

        let events = log.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, ActionType::Move);
        assert_eq!(events[0].status, ActivityStatus::Success);
        assert_eq!(events[0].path_before.as_deref(), Some("a.txt"));
        assert_eq!(events[0].path_after.as_deref(), Some("dir/a.txt"));
        assert_eq!(events[1].status, ActivityStatus::Failed);
        assert!(events[1].error_message.is_some());
    }

    #[tokio::test]
    async fn test_single_relocate() {
        let c = bucket();
        let other = Container::new("minio", "archive");
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["big.iso"]));

        let request =
            RelocationRequest::new(file("big.iso"), c.clone(), other.clone(), "2024", TransferMode::Move);
        let landed = engine(&store).relocate(&request).await.unwrap();

        assert_eq!(landed.key, "2024/big.iso");
        assert!(store.keys(&c).is_empty());
        assert!(store.contains(&other, "2024/big.iso"));
    }

    #[tokio::test]
    async fn test_large_folder_copy_outlasts_call_timeout() {
        let c = bucket();
        let mut keys = vec!["big/".to_string()];
        keys.extend((0..20).map(|i| format!("big/{i:02}.bin")));
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let store = Arc::new(
            MemoryStore::new()
                .with_keys(&c, &keys)
                .with_copy_delay(Duration::from_millis(5)),
        );
        let engine = engine(&store).with_options(EngineOptions {
            concurrency: 1,
            call_timeout: Duration::from_millis(50),
        });

        let report = engine
            .copy_items(&c, &[ObjectRef::folder("big/")], &c, "out/")
            .await
            .unwrap();
        assert_eq!(report.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(store.keys(&c).len(), 42);
    }

    #[tokio::test]
    async fn test_failed_folder_copy_rolls_back() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(
            &c,
            &["dst/src/", "dst/src/keep.txt", "src/", "src/a", "src/b", "src/c"],
        ));
        store.fail_copy("src/b");

        let report = engine(&store)
            .move_items(&c, &[ObjectRef::folder("src/")], &c, "dst/")
            .await
            .unwrap();

        assert!(matches!(report.failed[0].reason, FailureReason::CopyFailure(_)));
        assert_eq!(
            store.keys(&c),
            vec!["dst/src/", "dst/src/keep.txt", "src/", "src/a", "src/b", "src/c"]
        );
        assert!(store.calls().contains(&"delete dst/src/a".to_string()));
        assert!(!store.calls().contains(&"delete dst/src/".to_string()));
    }

    #[tokio::test]
    async fn test_rollback_reports_what_it_left() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["src/", "src/a", "src/b"]));
        store.fail_copy("src/b");
        store.fail_delete("out/src/a", DeleteFault::Refuse);
        store.fail_delete("out/src/", DeleteFault::Refuse);

        let report = engine(&store)
            .copy_items(&c, &[ObjectRef::folder("src/")], &c, "out/")
            .await
            .unwrap();
        match &report.failed[0].reason {
            FailureReason::CopyFailure(detail) => {
                assert!(detail.contains("2 partial copies"), "{detail}");
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cross_alias_transfer_streams_objects() {
        let c = bucket();
        let vault = Container::new("backup", "vault");
        let primary = Arc::new(MemoryStore::new().with_keys(&c, &["a/", "a/x.txt", "b.txt"]));
        let remote = Arc::new(MemoryStore::new());
        let engine = engine(&primary).with_store("backup", remote.clone());

        let report = engine
            .move_items(&c, &[ObjectRef::folder("a/"), file("b.txt")], &vault, "in/")
            .await
            .unwrap();

        assert_eq!(report.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(remote.keys(&vault), vec!["in/a/", "in/a/x.txt", "in/b.txt"]);
        assert!(primary.keys(&c).is_empty());
        assert!(primary.calls().iter().all(|call| !call.starts_with("copy")));
        assert!(primary.calls().contains(&"get a/x.txt".to_string()));
    }

    #[tokio::test]
    async fn test_relocate_each_reports_every_file() {
        let c = bucket();
        let store = Arc::new(
            MemoryStore::new().with_keys(&c, &["a/", "a/1.txt", "a/2.txt", "a/sub/3.txt"]),
        );
        let seen = Mutex::new(Vec::new());

        let request = RelocationRequest::within(&c, ObjectRef::folder("a/"), "z/", TransferMode::Move);
        let landed = engine(&store)
            .relocate_each(&request, &|obj: &ObjectRef| {
                seen.lock().unwrap().push(obj.key.clone());
            })
            .await
            .unwrap();

        assert_eq!(landed.key, "z/a/");
        assert_eq!(*seen.lock().unwrap(), vec!["a/1.txt", "a/2.txt", "a/sub/3.txt"]);
        assert_eq!(
            store.keys(&c),
            vec!["z/a/", "z/a/1.txt", "z/a/2.txt", "z/a/sub/3.txt"]
        );
    }

    #[tokio::test]
    async fn test_relocate_each_keeps_landed_files_on_failure() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["a/", "a/1.txt", "a/2.txt"]));
        store.fail_copy("a/2.txt");

        let request = RelocationRequest::within(&c, ObjectRef::folder("a/"), "z/", TransferMode::Move);
        let result = engine(&store).relocate_each(&request, &|_: &ObjectRef| {}).await;

        assert!(matches!(result, Err(FailureReason::CopyFailure(_))));
        assert_eq!(store.keys(&c), vec!["a/", "a/2.txt", "z/a/", "z/a/1.txt"]);
    }

    #[tokio::test]
    async fn test_create_folder() {
        let c = bucket();
        let store = Arc::new(MemoryStore::new().with_keys(&c, &["docs/old/x.txt"]));
        let log = Arc::new(RecordingLog::default());
        let engine = engine(&store).with_activity_log(log.clone());

        let folder = engine.create_folder(&c, "docs", " new ").await.unwrap();
        assert_eq!(folder, ObjectRef::folder("docs/new/"));
        assert!(store.contains(&c, "docs/new/"));

        // an implicit folder counts as existing
        let taken = engine.create_folder(&c, "docs/", "old").await;
        assert!(matches!(taken, Err(Error::Conflict(_))));

        let events = log.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActionType::CreateFolder);
        assert_eq!(events[0].path_after.as_deref(), Some("docs/new/"));
    }

    #[tokio::test]
    async fn test_create_folder_rejects_bad_names() {
        let engine = RelocationEngine::new(Arc::new(untouchable_store()));
        let c = bucket();

        for bad in ["", "  ", "a/b", ".", ".."] {
            let result = engine.create_folder(&c, "", bad).await;
            assert!(matches!(result, Err(Error::InvalidPath(_))), "name {bad:?}");
        }
        let result = engine.create_folder(&c, "", ".trash").await;
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_outermost_drops_nested_items() {
        let items = [
            ObjectRef::folder("a/"),
            file("a/x.txt"),
            ObjectRef::folder("a/b/"),
            file("ab.txt"),
            file("c.txt"),
        ];
        let keys: Vec<String> = outermost(&items).into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["a/", "ab.txt", "c.txt"]);
    }

    #[test]
    fn test_dest_key_and_options() {
        let c = bucket();
        let request = RelocationRequest::within(&c, ObjectRef::folder("a/b/"), "/x/", TransferMode::Copy);
        assert_eq!(request.dest_prefix, "x/");
        assert_eq!(request.dest_key(), "x/b/");
        assert_eq!(request.clone().renamed("c").dest_key(), "x/c/");
        assert_eq!(
            request.renamed("").validate(),
            Err(ValidationError::InvalidName(String::new()))
        );

        let defaults = Defaults {
            concurrency: 0,
            call_timeout_ms: 1500,
            ..Defaults::default()
        };
        let options = EngineOptions::from(&defaults);
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.call_timeout, Duration::from_millis(1500));
    }
}
