//! put command - Upload local files and folders
//!
//! A local folder keeps its name and inner layout under the destination
//! prefix. Name collisions with what is already there go through the
//! conflict prompt; an uploaded folder is resolved once as a unit.

use std::path::{Path, PathBuf};

use clap::Args;
use relo_core::{Error, Result, UploadItem, parse_remote};

use super::context::{Session, print_report};
use super::prompt::{OnConflict, conflict_prompt};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Upload local files or folders
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Local files or folders
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// Destination folder (alias/bucket[/prefix])
    pub dest: String,

    /// What to do when a name is already taken at the destination
    #[arg(long, value_enum)]
    pub on_conflict: Option<OnConflict>,
}

/// Execute the put command
pub async fn execute(args: PutArgs, formatter: &Formatter) -> Result<ExitCode> {
    let dest = parse_remote(&args.dest)?;
    let files = collect_files(&args.sources)?;
    let session = Session::open(&dest.alias).await?;

    let mut items = Vec::with_capacity(files.len());
    for (relative_path, local) in files {
        let data = tokio::fs::read(&local).await?;
        items.push(UploadItem::new(relative_path, data));
    }

    let prompt = conflict_prompt(args.on_conflict, session.defaults(), formatter)?;
    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Uploading {} file(s) to {dest}", items.len()),
    );
    let report = session
        .engine
        .upload(&dest.container(), &dest.key, items, prompt.as_ref())
        .await;
    spinner.finish_and_clear();

    Ok(print_report(formatter, "uploaded", &report?))
}

/// Every file to upload, paired with its path relative to the destination
fn collect_files(sources: &[PathBuf]) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for source in sources {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(format!("'{}' has no name", source.display())))?;
        if std::fs::metadata(source)?.is_dir() {
            walk(source, &name, &mut out)?;
        } else {
            out.push((name, source.clone()));
        }
    }
    Ok(out)
}

fn walk(dir: &Path, relative: &str, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let child = format!("{relative}/{}", entry.file_name().to_string_lossy());
        if entry.file_type()?.is_dir() {
            walk(&entry.path(), &child, out)?;
        } else {
            out.push((child, entry.path()));
        }
    }
    Ok(())
}
