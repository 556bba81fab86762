//! relo - safe relocation for S3-compatible object storage
//!
//! Move, copy, duplicate, rename, trash and restore objects and folders,
//! with conflict handling and a per-item report for every batch.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use relo_cli::commands::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let exit_code = commands::execute(cli).await;

    std::process::exit(exit_code.as_i32());
}
