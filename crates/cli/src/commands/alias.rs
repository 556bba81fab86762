//! Alias management commands
//!
//! Aliases are named references to S3-compatible storage endpoints,
//! including connection details, credentials and the activity log opt-in.

use clap::Subcommand;
use relo_core::{Alias, AliasManager, Result};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Alias subcommands for managing storage service connections
#[derive(Subcommand, Debug)]
pub enum AliasCommands {
    /// Add or update an alias
    Set(SetArgs),

    /// List all configured aliases
    List(ListArgs),

    /// Remove an alias
    Remove(RemoveArgs),
}

/// Arguments for the `alias set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Alias name (e.g., "local", "s3", "minio")
    pub name: String,

    /// S3 endpoint URL (e.g., "http://localhost:9000", "https://s3.amazonaws.com")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,

    /// Record every mutation made through this alias in the activity log
    #[arg(long)]
    pub activity_log: bool,
}

/// Arguments for the `alias list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show full details including region and lookup style
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `alias remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the alias to remove
    pub name: String,
}

/// JSON output for alias list
#[derive(Serialize)]
struct AliasListOutput {
    aliases: Vec<AliasInfo>,
}

/// Alias information for JSON output (without sensitive data)
#[derive(Serialize)]
struct AliasInfo {
    name: String,
    endpoint: String,
    region: String,
    bucket_lookup: String,
    activity_log: bool,
}

impl From<&Alias> for AliasInfo {
    fn from(alias: &Alias) -> Self {
        Self {
            name: alias.name.clone(),
            endpoint: alias.endpoint.clone(),
            region: alias.region.clone(),
            bucket_lookup: alias.bucket_lookup.clone(),
            activity_log: alias.activity_log,
        }
    }
}

/// JSON output for alias set/remove operations
#[derive(Serialize)]
struct AliasOperationOutput {
    success: bool,
    alias: String,
    message: String,
}

/// Execute an alias subcommand
pub async fn execute(cmd: AliasCommands, formatter: &Formatter) -> Result<ExitCode> {
    let manager = AliasManager::new()?;
    match cmd {
        AliasCommands::Set(args) => execute_set(args, &manager, formatter),
        AliasCommands::List(args) => execute_list(args, &manager, formatter),
        AliasCommands::Remove(args) => execute_remove(args, &manager, formatter),
    }
}

fn execute_set(args: SetArgs, manager: &AliasManager, formatter: &Formatter) -> Result<ExitCode> {
    let mut alias = Alias::new(&args.name, &args.endpoint, &args.access_key, &args.secret_key);
    alias.region = args.region;
    alias.bucket_lookup = args.bucket_lookup;
    alias.activity_log = args.activity_log;

    let message = if manager.set(alias)? {
        format!("Alias '{}' updated", args.name)
    } else {
        format!("Alias '{}' configured", args.name)
    };
    report_operation(formatter, &args.name, message);
    Ok(ExitCode::Success)
}

fn execute_list(args: ListArgs, manager: &AliasManager, formatter: &Formatter) -> Result<ExitCode> {
    let aliases = manager.list()?;

    if formatter.is_json() {
        formatter.json(&AliasListOutput {
            aliases: aliases.iter().map(AliasInfo::from).collect(),
        });
    } else if aliases.is_empty() {
        formatter.println("No aliases configured.");
    } else if args.long {
        let rows = aliases
            .iter()
            .map(|a| {
                vec![
                    a.name.clone(),
                    a.endpoint.clone(),
                    a.region.clone(),
                    a.bucket_lookup.clone(),
                    if a.activity_log { "on" } else { "off" }.to_string(),
                ]
            })
            .collect();
        formatter.table(&["Name", "Endpoint", "Region", "Lookup", "Activity log"], rows);
    } else {
        for alias in &aliases {
            formatter.println(&format!("{:<12} {}", alias.name, alias.endpoint));
        }
    }
    Ok(ExitCode::Success)
}

fn execute_remove(args: RemoveArgs, manager: &AliasManager, formatter: &Formatter) -> Result<ExitCode> {
    let removed = manager.remove(&args.name)?;
    report_operation(
        formatter,
        &removed.name,
        format!("Alias '{}' ({}) removed", removed.name, removed.endpoint),
    );
    Ok(ExitCode::Success)
}

fn report_operation(formatter: &Formatter, alias: &str, message: String) {
    if formatter.is_json() {
        formatter.json(&AliasOperationOutput {
            success: true,
            alias: alias.to_string(),
            message,
        });
    } else {
        formatter.success(&message);
    }
}
