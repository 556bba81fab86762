//! mv command - Move objects and folders to another prefix
//!
//! A move is a copy followed by a delete of the source. When the delete
//! fails, a fresh listing decides whether the item really stayed behind.

use clap::Args;
use relo_core::{Result, TransferMode};

use super::cp::relocate;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Move objects or folders
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Sources (alias/bucket/key); a trailing slash or an existing prefix is a folder
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Destination folder (alias/bucket[/prefix])
    pub dest: String,
}

/// Execute the mv command
pub async fn execute(args: MvArgs, formatter: &Formatter) -> Result<ExitCode> {
    relocate(&args.sources, &args.dest, TransferMode::Move, formatter).await
}
