//! trash commands - Inspect, restore and empty the per-bucket trash
//!
//! Soft-deleted items live under `.trash/` with their original key appended
//! and carry that key in their metadata, so restoring moves them back to
//! where they came from. The listing shows what was deleted, one entry per
//! deleted file or folder.

use clap::Subcommand;
use relo_core::kv::set_trash_enabled;
use relo_core::path::{is_trashed, trash_key};
use relo_core::{ObjectRef, RemotePath, Result, parse_remote};
use serde::Serialize;

use super::context::{Session, print_report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Trash subcommands
#[derive(Subcommand, Debug)]
pub enum TrashCommands {
    /// List what is in the trash of a bucket
    List(BucketArg),

    /// Move trashed items back to their original location
    Restore(RestoreArgs),

    /// Delete everything in the trash for good
    Empty(BucketArg),

    /// Make `rm` move items to the trash for this bucket
    Enable(BucketArg),

    /// Make `rm` delete items for good for this bucket
    Disable(BucketArg),
}

#[derive(clap::Args, Debug)]
pub struct BucketArg {
    /// Bucket (alias/bucket)
    pub path: String,
}

#[derive(clap::Args, Debug)]
pub struct RestoreArgs {
    /// Items to restore, by trash key or by original key (alias/bucket/key)
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,
}

#[derive(Serialize)]
struct TrashListOutput<'a> {
    items: &'a [ObjectRef],
    total_size_bytes: u64,
}

#[derive(Serialize)]
struct TrashStateOutput {
    container: String,
    trash_enabled: bool,
}

#[derive(Serialize)]
struct EmptyOutput {
    container: String,
    removed: usize,
}

/// Execute a trash subcommand
pub async fn execute(cmd: TrashCommands, formatter: &Formatter) -> Result<ExitCode> {
    match cmd {
        TrashCommands::List(args) => list(args, formatter).await,
        TrashCommands::Restore(args) => restore(args, formatter).await,
        TrashCommands::Empty(args) => empty(args, formatter).await,
        TrashCommands::Enable(args) => toggle(args, true, formatter).await,
        TrashCommands::Disable(args) => toggle(args, false, formatter).await,
    }
}

async fn list(args: BucketArg, formatter: &Formatter) -> Result<ExitCode> {
    let path = parse_remote(&args.path)?;
    let session = Session::open(&path.alias).await?;
    let entries = session.engine.list_trash(&path.container()).await?;
    let total_size_bytes = entries.iter().map(|e| e.size).sum();

    if formatter.is_json() {
        formatter.json(&TrashListOutput {
            items: &entries,
            total_size_bytes,
        });
        return Ok(ExitCode::Success);
    }
    if entries.is_empty() {
        formatter.println("Trash is empty.");
        return Ok(ExitCode::Success);
    }
    let rows = entries
        .iter()
        .map(|e| {
            let deleted = e
                .last_modified
                .map(|d| d.strftime("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            vec![formatter.dim(&deleted), e.size_human(), e.key.clone()]
        })
        .collect();
    formatter.table(&["Deleted", "Size", "Key"], rows);
    formatter.println(&format!(
        "{} item(s), {}",
        entries.len(),
        humansize::format_size(total_size_bytes, humansize::BINARY)
    ));
    Ok(ExitCode::Success)
}

async fn restore(args: RestoreArgs, formatter: &Formatter) -> Result<ExitCode> {
    let paths = args
        .paths
        .iter()
        .map(|p| parse_remote(p).map(into_trash))
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = paths.first() else {
        return Ok(ExitCode::UsageError);
    };

    let session = Session::open(&first.alias).await?;
    let (container, items) = session.resolve_all(&paths).await?;

    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Restoring {} item(s)", items.len()),
    );
    let report = session.engine.restore_items(&container, &items).await;
    spinner.finish_and_clear();

    Ok(print_report(formatter, "restored", &report?))
}

/// Accept the original key of a trashed item as well as its trash key
fn into_trash(mut path: RemotePath) -> RemotePath {
    let key = path.key.trim_start_matches('/');
    if !key.is_empty() && !is_trashed(key) {
        path.key = trash_key(key);
    }
    path
}

async fn empty(args: BucketArg, formatter: &Formatter) -> Result<ExitCode> {
    let path = parse_remote(&args.path)?;
    let session = Session::open(&path.alias).await?;
    let container = path.container();

    let spinner = ProgressBar::spinner(formatter.config(), "Emptying trash");
    let removed = session.engine.empty_trash(&container).await;
    spinner.finish_and_clear();
    let removed = removed?;

    if formatter.is_json() {
        formatter.json(&EmptyOutput {
            container: container.to_string(),
            removed,
        });
    } else if removed == 0 {
        formatter.println("Trash is already empty.");
    } else {
        formatter.success(&format!("Removed {removed} item(s) from the trash of {container}"));
    }
    Ok(ExitCode::Success)
}

async fn toggle(args: BucketArg, enabled: bool, formatter: &Formatter) -> Result<ExitCode> {
    let path = parse_remote(&args.path)?;
    let session = Session::open(&path.alias).await?;
    let container = path.container();
    container.ensure_active()?;
    set_trash_enabled(session.settings(), &container, enabled)?;

    if formatter.is_json() {
        formatter.json(&TrashStateOutput {
            container: container.to_string(),
            trash_enabled: enabled,
        });
    } else if enabled {
        formatter.success(&format!("Trash enabled for {container}"));
    } else {
        formatter.success(&format!(
            "Trash disabled for {container}; rm now deletes for good"
        ));
    }
    Ok(ExitCode::Success)
}
