//! Activity log
//!
//! One event is recorded per mutating attempt. Recording is fire-and-forget:
//! a sink that cannot write logs a warning and the operation carries on.
//!
//! The JSON-lines log hands events to a writer thread, so recording never
//! blocks on file I/O.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::JoinHandle;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::Container;

/// Kind of mutation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Upload,
    Delete,
    Move,
    Copy,
    Duplicate,
    Restore,
    Rename,
    PermanentDelete,
    EmptyTrash,
    CreateFolder,
}

impl ActionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Copy => "copy",
            Self::Duplicate => "duplicate",
            Self::Restore => "restore",
            Self::Rename => "rename",
            Self::PermanentDelete => "permanent_delete",
            Self::EmptyTrash => "empty_trash",
            Self::CreateFolder => "create_folder",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let action = match s {
            "upload" => Self::Upload,
            "delete" => Self::Delete,
            "move" => Self::Move,
            "copy" => Self::Copy,
            "duplicate" => Self::Duplicate,
            "restore" => Self::Restore,
            "rename" => Self::Rename,
            "permanent_delete" => Self::PermanentDelete,
            "empty_trash" => Self::EmptyTrash,
            "create_folder" => Self::CreateFolder,
            other => {
                return Err(crate::error::Error::General(format!(
                    "unknown action type '{other}'"
                )));
            }
        };
        Ok(action)
    }
}

/// Whether the attempt succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Failed,
}

/// One recorded attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: Timestamp,
    pub actor: String,
    pub container: Container,
    pub action: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_after: Option<String>,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ActivityEvent {
    pub fn new(container: &Container, action: ActionType, status: ActivityStatus) -> Self {
        Self {
            timestamp: Timestamp::now(),
            actor: "user".to_string(),
            container: container.clone(),
            action,
            path_before: None,
            path_after: None,
            status,
            error_message: None,
            size: None,
        }
    }

    pub fn paths(mut self, before: Option<&str>, after: Option<&str>) -> Self {
        self.path_before = before.map(str::to_string);
        self.path_after = after.map(str::to_string);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// Sink for activity events
pub trait ActivityLog: Send + Sync {
    /// Record an event. Must not fail the caller.
    fn record(&self, event: ActivityEvent);
}

/// Sink that drops every event, used when logging is not enabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivityLog;

impl ActivityLog for NoopActivityLog {
    fn record(&self, _event: ActivityEvent) {}
}

/// Filter for [`JsonlActivityLog::query`]
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub container: Option<Container>,
    pub action: Option<ActionType>,
    pub status: Option<ActivityStatus>,
    /// Substring matched against both paths
    pub search: Option<String>,
}

impl ActivityFilter {
    pub fn matches(&self, event: &ActivityEvent) -> bool {
        if self.container.as_ref().is_some_and(|c| *c != event.container) {
            return false;
        }
        if self.action.is_some_and(|a| a != event.action) {
            return false;
        }
        if self.status.is_some_and(|s| s != event.status) {
            return false;
        }
        if let Some(needle) = &self.search {
            let hit = [&event.path_before, &event.path_after]
                .into_iter()
                .flatten()
                .any(|p| p.contains(needle.as_str()));
            if !hit {
                return false;
            }
        }
        true
    }
}

enum Command {
    Append(ActivityEvent),
    Clear(SyncSender<Result<()>>),
    /// Answered once everything sent before it is on disk
    Flush(SyncSender<()>),
}

/// Append-only JSON-lines activity log
#[derive(Debug)]
pub struct JsonlActivityLog {
    path: PathBuf,
    commands: Option<Sender<Command>>,
    writer: Option<JoinHandle<()>>,
}

impl JsonlActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::channel();
        let file = path.clone();
        let writer = std::thread::Builder::new()
            .name("activity-log".into())
            .spawn(move || write_loop(&file, rx));
        match writer {
            Ok(writer) => Self {
                path,
                commands: Some(tx),
                writer: Some(writer),
            },
            Err(e) => {
                tracing::warn!(error = %e, "activity log writer not started");
                Self {
                    path,
                    commands: None,
                    writer: None,
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn send(&self, command: Command) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    /// Wait until every recorded event has been written
    pub fn flush(&self) {
        let (done, wait) = mpsc::sync_channel(1);
        if self.send(Command::Flush(done)) {
            let _ = wait.recv();
        }
    }

    /// Most recent events first, at most `limit`
    ///
    /// Lines that fail to parse are skipped.
    pub fn query(&self, filter: &ActivityFilter, limit: usize) -> Result<Vec<ActivityEvent>> {
        self.flush();
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let mut events: Vec<ActivityEvent> = BufReader::new(file)
            .lines()
            .map_while(std::result::Result::ok)
            .filter_map(|line| serde_json::from_str(&line).ok())
            .filter(|event| filter.matches(event))
            .collect();
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }

    /// Remove every recorded event
    pub fn clear(&self) -> Result<()> {
        let (done, wait) = mpsc::sync_channel(1);
        if !self.send(Command::Clear(done)) {
            return remove_log(&self.path);
        }
        wait.recv().unwrap_or_else(|_| remove_log(&self.path))
    }
}

impl Drop for JsonlActivityLog {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit
        self.commands.take();
        if let Some(writer) = self.writer.take()
            && writer.join().is_err()
        {
            tracing::warn!("activity log writer panicked");
        }
    }
}

impl ActivityLog for JsonlActivityLog {
    fn record(&self, event: ActivityEvent) {
        let action = event.action;
        if !self.send(Command::Append(event)) {
            tracing::warn!(action = %action, "activity log writer is gone, event dropped");
        }
    }
}

fn write_loop(path: &Path, commands: Receiver<Command>) {
    for command in commands {
        match command {
            Command::Append(event) => {
                if let Err(e) = append(path, &event) {
                    tracing::warn!(error = %e, action = %event.action, "failed to write activity log");
                }
            }
            Command::Clear(done) => {
                let _ = done.send(remove_log(path));
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn append(path: &Path, event: &ActivityEvent) -> Result<()> {
    let line = serde_json::to_string(event)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn remove_log(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
