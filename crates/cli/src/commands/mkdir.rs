//! mkdir command - Create an empty folder
//!
//! A folder is an empty marker object whose key ends in `/`. Creating one
//! where a folder of that name already exists, explicit or implied by the
//! keys below it, is refused.

use clap::Args;
use relo_core::path::{key_name, parent_prefix};
use relo_core::{Error, Result, parse_remote};
use serde::Serialize;

use super::context::Session;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Create an empty folder
#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Folder to create (alias/bucket/prefix/name)
    pub path: String,
}

#[derive(Serialize)]
struct MkdirOutput {
    container: String,
    key: String,
}

/// Execute the mkdir command
pub async fn execute(args: MkdirArgs, formatter: &Formatter) -> Result<ExitCode> {
    let path = parse_remote(&args.path)?;
    let key = path.key.trim_matches('/');
    if key.is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{path}' names a bucket; give the folder to create inside it"
        )));
    }

    let session = Session::open(&path.alias).await?;
    let container = path.container();
    let folder = session
        .engine
        .create_folder(&container, parent_prefix(key), key_name(key))
        .await?;

    if formatter.is_json() {
        formatter.json(&MkdirOutput {
            container: container.to_string(),
            key: folder.key,
        });
    } else {
        formatter.success(&format!("Created {container}/{}", folder.key));
    }
    Ok(ExitCode::Success)
}
