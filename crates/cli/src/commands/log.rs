//! log command - Query the activity log
//!
//! Only aliases with `activity_log = true` record events. The log is local to
//! this machine and shared by every alias.

use clap::{Args, ValueEnum};
use relo_core::{
    ActionType, ActivityEvent, ActivityFilter, ActivityStatus, ConfigManager, JsonlActivityLog,
    Result, parse_remote,
};

use super::context::activity_log_path;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Show recorded activity
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Only events for this bucket (alias/bucket)
    pub path: Option<String>,

    /// Only this kind of action (upload, delete, move, copy, duplicate, restore, rename, permanent_delete, empty_trash, create_folder)
    #[arg(long, value_parser = parse_action)]
    pub action: Option<ActionType>,

    /// Only successful or only failed attempts
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// Only events whose source or destination key contains this text
    #[arg(long)]
    pub search: Option<String>,

    /// Show at most this many events, newest first
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: usize,

    /// Delete the whole log instead of showing it
    #[arg(long, conflicts_with_all = ["action", "status", "search"])]
    pub clear: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Success,
    Failed,
}

impl From<StatusArg> for ActivityStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Success => Self::Success,
            StatusArg::Failed => Self::Failed,
        }
    }
}

fn parse_action(s: &str) -> std::result::Result<ActionType, String> {
    s.parse().map_err(|e: relo_core::Error| e.to_string())
}

/// Execute the log command
pub async fn execute(args: LogArgs, formatter: &Formatter) -> Result<ExitCode> {
    let manager = ConfigManager::new()?;
    let log = JsonlActivityLog::new(activity_log_path(&manager));

    if args.clear {
        log.clear()?;
        formatter.success("Activity log cleared");
        return Ok(ExitCode::Success);
    }

    let filter = ActivityFilter {
        container: args
            .path
            .as_deref()
            .map(parse_remote)
            .transpose()?
            .map(|p| p.container()),
        action: args.action,
        status: args.status.map(Into::into),
        search: args.search,
    };
    let events = log.query(&filter, args.limit)?;

    if formatter.is_json() {
        formatter.json(&events);
        return Ok(ExitCode::Success);
    }
    if events.is_empty() {
        formatter.println("No matching activity.");
        return Ok(ExitCode::Success);
    }
    let rows = events.iter().map(|e| row(formatter, e)).collect();
    formatter.table(&["Time", "Bucket", "Action", "Status", "Path"], rows);
    Ok(ExitCode::Success)
}

fn row(formatter: &Formatter, event: &ActivityEvent) -> Vec<String> {
    let status = match event.status {
        ActivityStatus::Success => "ok".to_string(),
        ActivityStatus::Failed => format!(
            "failed: {}",
            event.error_message.as_deref().unwrap_or("unknown error")
        ),
    };
    vec![
        formatter.dim(&event.timestamp.strftime("%Y-%m-%d %H:%M:%S").to_string()),
        event.container.to_string(),
        event.action.to_string(),
        status,
        describe_paths(event),
    ]
}

fn describe_paths(event: &ActivityEvent) -> String {
    match (&event.path_before, &event.path_after) {
        (Some(before), Some(after)) => format!("{before} -> {after}"),
        (Some(path), None) | (None, Some(path)) => path.clone(),
        (None, None) => String::new(),
    }
}
