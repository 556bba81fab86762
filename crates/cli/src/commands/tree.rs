//! tree command - Show the folder hierarchy of a bucket
//!
//! This is the set of destinations a move or copy can target.

use clap::Args;
use relo_core::{Error, FolderNode, FolderTreeBuilder, Result, parse_remote};

use super::context::Session;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Show folders as a tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Remote path (alias/bucket[/prefix]); a prefix shows only that subtree
    pub path: String,

    /// Include the trash folder
    #[arg(long)]
    pub show_trash: bool,

    /// Stop descending after this many levels
    #[arg(short = 'L', long)]
    pub depth: Option<usize>,
}

/// Execute the tree command
pub async fn execute(args: TreeArgs, formatter: &Formatter) -> Result<ExitCode> {
    let path = parse_remote(&args.path)?;
    let session = Session::open(&path.alias).await?;

    let listing = session.engine.list(&path.container(), "").await?;
    let root = FolderTreeBuilder::new()
        .hide_trash(!args.show_trash)
        .build(&listing);

    let prefix = path.prefix();
    let node = root
        .find(&prefix)
        .ok_or_else(|| Error::NotFound(format!("folder {path}")))?;

    if formatter.is_json() {
        formatter.json(node);
        return Ok(ExitCode::Success);
    }
    for line in render(node, args.depth) {
        formatter.println(&line);
    }
    Ok(ExitCode::Success)
}

/// One line per folder, indented by depth below `node`
fn render(node: &FolderNode, max_depth: Option<usize>) -> Vec<String> {
    node.walk()
        .into_iter()
        .filter(|(depth, _)| max_depth.is_none_or(|max| *depth <= max))
        .map(|(depth, folder)| {
            if depth == 0 {
                folder.name.clone()
            } else {
                format!("{}└─ {}", "   ".repeat(depth - 1), folder.name)
            }
        })
        .collect()
}
