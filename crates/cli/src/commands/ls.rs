//! ls command - List the contents of a folder
//!
//! Shows one level by default, folders first, with the trash folder hidden at
//! the bucket root. `--recursive` shows every key under the prefix.

use clap::Args;
use relo_core::path::is_trashed;
use relo_core::tree::visible_entries;
use relo_core::{ObjectRef, Result, parse_remote};
use serde::Serialize;

use super::context::Session;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// List objects and folders
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Remote path (alias/bucket[/prefix])
    pub path: String,

    /// List every key under the prefix
    #[arg(short, long)]
    pub recursive: bool,

    /// Summarize output (show totals only)
    #[arg(long)]
    pub summarize: bool,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
struct LsOutput {
    items: Vec<ObjectRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
}

#[derive(Debug, Serialize)]
struct Summary {
    total_objects: usize,
    total_folders: usize,
    total_size_bytes: u64,
    total_size_human: String,
}

impl Summary {
    fn of(items: &[ObjectRef]) -> Self {
        let total_size_bytes = items.iter().map(|i| i.size).sum();
        Self {
            total_objects: items.iter().filter(|i| !i.is_folder).count(),
            total_folders: items.iter().filter(|i| i.is_folder).count(),
            total_size_bytes,
            total_size_human: humansize::format_size(total_size_bytes, humansize::BINARY),
        }
    }
}

/// Execute the ls command
pub async fn execute(args: LsArgs, formatter: &Formatter) -> Result<ExitCode> {
    let path = parse_remote(&args.path)?;
    let session = Session::open(&path.alias).await?;
    let container = path.container();
    let prefix = path.prefix();

    let listing = session.engine.list(&container, &prefix).await?;
    let items = if args.recursive {
        entries_below(listing, &prefix)
    } else {
        visible_entries(&listing, &prefix)
    };

    if formatter.is_json() {
        formatter.json(&LsOutput {
            summary: args.summarize.then(|| Summary::of(&items)),
            items,
        });
        return Ok(ExitCode::Success);
    }

    if !args.summarize {
        let rows = items
            .iter()
            .map(|item| {
                let modified = item
                    .last_modified
                    .map(|d| d.strftime("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                let size = if item.is_folder {
                    String::new()
                } else {
                    item.size_human()
                };
                let name = item.key.strip_prefix(&prefix).unwrap_or(&item.key);
                vec![formatter.dim(&modified), size, name.to_string()]
            })
            .collect();
        formatter.table(&["Modified", "Size", "Name"], rows);
    }
    let summary = Summary::of(&items);
    if args.summarize || items.is_empty() {
        formatter.println(&format!(
            "Total: {} objects, {} folders, {}",
            summary.total_objects, summary.total_folders, summary.total_size_human
        ));
    }
    Ok(ExitCode::Success)
}

/// Every key under `prefix`, minus the prefix marker and, from the root, the trash
fn entries_below(listing: Vec<ObjectRef>, prefix: &str) -> Vec<ObjectRef> {
    listing
        .into_iter()
        .filter(|o| o.key != prefix)
        .filter(|o| !prefix.is_empty() || !is_trashed(&o.key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_below_hides_trash_from_root() {
        let listing = vec![
            ObjectRef::folder(".trash/"),
            ObjectRef::file(".trash/old.txt", 3),
            ObjectRef::folder("docs/"),
            ObjectRef::file("docs/a.txt", 5),
        ];
        let keys: Vec<String> = entries_below(listing, "")
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["docs/", "docs/a.txt"]);
    }

    #[test]
    fn test_entries_below_drops_own_marker() {
        let listing = vec![ObjectRef::folder("docs/"), ObjectRef::file("docs/a.txt", 5)];
        let keys: Vec<String> = entries_below(listing, "docs/")
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["docs/a.txt"]);
    }

    #[test]
    fn test_summary_counts() {
        let items = vec![
            ObjectRef::folder("docs/"),
            ObjectRef::file("a.txt", 1024),
            ObjectRef::file("b.txt", 1024),
        ];
        let summary = Summary::of(&items);
        assert_eq!(summary.total_objects, 2);
        assert_eq!(summary.total_folders, 1);
        assert_eq!(summary.total_size_bytes, 2048);
        assert_eq!(summary.total_size_human, "2 KiB");
    }
}
