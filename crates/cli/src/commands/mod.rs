//! CLI command definitions and execution
//!
//! Every command returns `relo_core::Result<ExitCode>`; errors are reported
//! once, here, and mapped to their exit code.

use clap::{Parser, Subcommand};
use relo_core::ConfigManager;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod alias;
mod context;
mod cp;
mod dup;
mod log;
mod ls;
mod mkdir;
mod mv;
mod prompt;
mod put;
mod rename;
mod rm;
mod transfer;
mod trash;
mod tree;

/// relo - safe move, copy, trash and restore for S3-compatible storage
///
/// Paths have the form alias/bucket[/key]. A key ending in '/' is a folder.
#[derive(Parser, Debug)]
#[command(name = "relo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bars and spinners
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage storage service aliases
    #[command(subcommand)]
    Alias(alias::AliasCommands),

    /// List the contents of a folder
    Ls(ls::LsArgs),

    /// Show the folder tree of a bucket
    Tree(tree::TreeArgs),

    /// Create an empty folder
    Mkdir(mkdir::MkdirArgs),

    /// Move objects or folders into another folder
    Mv(mv::MvArgs),

    /// Copy objects or folders into another folder
    Cp(cp::CpArgs),

    /// Duplicate objects or folders in place
    Dup(dup::DupArgs),

    /// Rename an object or folder
    Rename(rename::RenameArgs),

    /// Remove objects or folders (to the trash when enabled)
    Rm(rm::RmArgs),

    /// Inspect, restore and empty the trash
    #[command(subcommand)]
    Trash(trash::TrashCommands),

    /// Upload local files or folders
    Put(put::PutArgs),

    /// Copy or move items as tracked jobs with progress
    Transfer(transfer::TransferArgs),

    /// Show the activity log
    Log(log::LogArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let flags = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };
    let output_config = match ConfigManager::new().and_then(|m| m.load()) {
        Ok(config) => flags.with_defaults(&config.defaults),
        Err(e) => {
            tracing::debug!(error = %e, "config not loaded, using flags only");
            flags
        }
    };
    let formatter = Formatter::new(output_config);

    let result = match cli.command {
        Commands::Alias(cmd) => alias::execute(cmd, &formatter).await,
        Commands::Ls(args) => ls::execute(args, &formatter).await,
        Commands::Tree(args) => tree::execute(args, &formatter).await,
        Commands::Mkdir(args) => mkdir::execute(args, &formatter).await,
        Commands::Mv(args) => mv::execute(args, &formatter).await,
        Commands::Cp(args) => cp::execute(args, &formatter).await,
        Commands::Dup(args) => dup::execute(args, &formatter).await,
        Commands::Rename(args) => rename::execute(args, &formatter).await,
        Commands::Rm(args) => rm::execute(args, &formatter).await,
        Commands::Trash(cmd) => trash::execute(cmd, &formatter).await,
        Commands::Put(args) => put::execute(args, &formatter).await,
        Commands::Transfer(args) => transfer::execute(args, &formatter).await,
        Commands::Log(args) => log::execute(args, &formatter).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}
