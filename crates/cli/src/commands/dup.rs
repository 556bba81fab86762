//! dup command - Duplicate objects or folders next to themselves
//!
//! `report.pdf` becomes `report_copy.pdf`, then `report_copy_1.pdf` and so
//! on while the name is taken.

use clap::Args;
use relo_core::{Result, parse_remote};

use super::context::{Session, print_report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Duplicate objects or folders in place
#[derive(Args, Debug)]
pub struct DupArgs {
    /// Items to duplicate (alias/bucket/key)
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,
}

/// Execute the dup command
pub async fn execute(args: DupArgs, formatter: &Formatter) -> Result<ExitCode> {
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

    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Duplicating {} item(s)", items.len()),
    );
    let report = session.engine.duplicate_items(&container, &items).await;
    spinner.finish_and_clear();

    Ok(print_report(formatter, "duplicated", &report?))
}
