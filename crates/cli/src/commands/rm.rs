//! rm command - Delete objects or folders
//!
//! With trash enabled for the bucket (`relo trash enable`), items are moved
//! under `.trash/` and can be restored. Otherwise, with `--permanent`, or for
//! items already in the trash, they are deleted for good.

use clap::Args;
use relo_core::{Result, parse_remote};

use super::context::{Session, print_report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Remove objects or folders
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Items to remove (alias/bucket/key)
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,

    /// Skip the trash even when it is enabled
    #[arg(long)]
    pub permanent: bool,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, formatter: &Formatter) -> Result<ExitCode> {
    let paths = args
        .paths
        .iter()
        .map(|p| parse_remote(p))
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = paths.first() else {
        return Ok(ExitCode::UsageError);
    };

    let session = Session::open(&first.alias).await?;
    let (container, items) = session.resolve_all(&paths).await?;
    let to_trash = !args.permanent && session.trash_enabled(&container)?;

    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Removing {} item(s)", items.len()),
    );
    let report = session
        .engine
        .delete_items(&container, &items, to_trash)
        .await;
    spinner.finish_and_clear();

    let action = if to_trash { "trashed" } else { "removed" };
    Ok(print_report(formatter, action, &report?))
}
