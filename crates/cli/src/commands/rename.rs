//! rename command - Give an object or folder a new name in place

use clap::Args;
use relo_core::{Result, parse_remote};

use super::context::{Session, print_report};
use super::prompt::{OnConflict, conflict_prompt};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Rename an object or folder
#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Item to rename (alias/bucket/key)
    pub path: String,

    /// New name, without any folder part
    pub new_name: String,

    /// What to do when a sibling already has the new name
    #[arg(long, value_enum)]
    pub on_conflict: Option<OnConflict>,
}

/// Execute the rename command
pub async fn execute(args: RenameArgs, formatter: &Formatter) -> Result<ExitCode> {
    let path = parse_remote(&args.path)?;
    let session = Session::open(&path.alias).await?;
    let item = session.resolve(&path).await?;
    let prompt = conflict_prompt(args.on_conflict, session.defaults(), formatter)?;

    let report = session
        .engine
        .rename_item(&path.container(), &item, &args.new_name, prompt.as_ref())
        .await?;
    Ok(print_report(formatter, "renamed", &report))
}
