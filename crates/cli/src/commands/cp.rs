//! cp command - Copy objects and folders to another prefix
//!
//! Sources must share one bucket; the destination may be any bucket, also
//! one behind another alias. Every item is validated, then copied
//! server-side within one alias or streamed between two.

use clap::Args;
use relo_core::{Error, RemotePath, Result, TransferMode, parse_remote};

use super::context::{Session, print_report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Copy objects or folders
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Sources (alias/bucket/key); a trailing slash or an existing prefix is a folder
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Destination folder (alias/bucket[/prefix])
    pub dest: String,
}

/// Execute the cp command
pub async fn execute(args: CpArgs, formatter: &Formatter) -> Result<ExitCode> {
    relocate(&args.sources, &args.dest, TransferMode::Copy, formatter).await
}

/// Shared by `cp` and `mv`
pub(crate) async fn relocate(
    sources: &[String],
    dest: &str,
    mode: TransferMode,
    formatter: &Formatter,
) -> Result<ExitCode> {
    let dest = parse_remote(dest)?;
    let sources = sources
        .iter()
        .map(|s| parse_remote(s))
        .collect::<Result<Vec<RemotePath>>>()?;
    let first = sources
        .first()
        .ok_or_else(|| Error::Precondition("no sources given".into()))?;

    let session = Session::open_for(&[first.alias.as_str(), dest.alias.as_str()]).await?;
    let (src_container, items) = session.resolve_all(&sources).await?;
    let dest_container = dest.container();

    let (verb, done) = match mode {
        TransferMode::Copy => ("Copying", "copied"),
        TransferMode::Move => ("Moving", "moved"),
    };
    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("{verb} {} item(s) to {dest}", items.len()),
    );
    let report = match mode {
        TransferMode::Copy => {
            session
                .engine
                .copy_items(&src_container, &items, &dest_container, &dest.key)
                .await
        }
        TransferMode::Move => {
            session
                .engine
                .move_items(&src_container, &items, &dest_container, &dest.key)
                .await
        }
    };
    spinner.finish_and_clear();

    Ok(print_report(formatter, done, &report?))
}
