//! Argument parsing tests
//!
//! These run without a server: they only check how the command line maps
//! onto the command structs.

use clap::Parser;
use relo_cli::commands::{Cli, Commands};

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("relo").chain(args.iter().copied()))
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&["ls", "local/bucket", "--json", "--no-color", "-q"]).unwrap();
    assert!(cli.json);
    assert!(cli.no_color);
    assert!(cli.quiet);
    assert!(!cli.debug);
}

#[test]
fn test_mv_takes_many_sources_and_one_destination() {
    let cli = parse(&["mv", "local/b/a.txt", "local/b/docs/", "local/b/archive/"]).unwrap();
    let Commands::Mv(args) = cli.command else {
        panic!("expected mv");
    };
    assert_eq!(args.sources, vec!["local/b/a.txt", "local/b/docs/"]);
    assert_eq!(args.dest, "local/b/archive/");
}

#[test]
fn test_mv_needs_a_destination() {
    assert!(parse(&["mv", "local/b/a.txt"]).is_err());
}

#[test]
fn test_rm_permanent() {
    let cli = parse(&["rm", "--permanent", "local/b/a.txt"]).unwrap();
    let Commands::Rm(args) = cli.command else {
        panic!("expected rm");
    };
    assert!(args.permanent);
    assert_eq!(args.paths, vec!["local/b/a.txt"]);
}

#[test]
fn test_put_on_conflict_values() {
    for value in ["ask", "overwrite", "skip", "rename"] {
        assert!(
            parse(&["put", "./a.txt", "local/b/", "--on-conflict", value]).is_ok(),
            "{value} should be accepted"
        );
    }
    assert!(parse(&["put", "./a.txt", "local/b/", "--on-conflict", "merge"]).is_err());
}

#[test]
fn test_transfer_move_and_retries() {
    let cli = parse(&[
        "transfer",
        "local/src/big.bin",
        "local/dst/",
        "--move",
        "--retries",
        "2",
    ])
    .unwrap();
    let Commands::Transfer(args) = cli.command else {
        panic!("expected transfer");
    };
    assert!(args.move_items);
    assert_eq!(args.retries, 2);
    assert_eq!(args.dest, "local/dst/");
}

#[test]
fn test_transfer_defaults_to_copy_without_retries() {
    let cli = parse(&["transfer", "local/src/a", "local/dst/"]).unwrap();
    let Commands::Transfer(args) = cli.command else {
        panic!("expected transfer");
    };
    assert!(!args.move_items);
    assert_eq!(args.retries, 0);
}

#[test]
fn test_trash_subcommands() {
    for sub in ["list", "empty", "enable", "disable"] {
        assert!(parse(&["trash", sub, "local/bucket"]).is_ok(), "trash {sub}");
    }
    assert!(parse(&["trash", "restore", "local/b/.trash/a.txt", "local/b/c.txt"]).is_ok());
    assert!(parse(&["trash", "restore"]).is_err());
}

#[test]
fn test_log_filters() {
    let cli = parse(&[
        "log",
        "local/bucket",
        "--action",
        "permanent_delete",
        "--status",
        "failed",
        "-n",
        "5",
    ])
    .unwrap();
    let Commands::Log(args) = cli.command else {
        panic!("expected log");
    };
    assert_eq!(args.path.as_deref(), Some("local/bucket"));
    assert_eq!(args.limit, 5);
    assert!(args.action.is_some());
    assert!(args.status.is_some());
}

#[test]
fn test_log_rejects_unknown_action() {
    assert!(parse(&["log", "--action", "teleport"]).is_err());
}

#[test]
fn test_log_clear_excludes_filters() {
    assert!(parse(&["log", "--clear", "--action", "move"]).is_err());
    assert!(parse(&["log", "--clear"]).is_ok());
}

#[test]
fn test_alias_set_activity_log() {
    let cli = parse(&[
        "alias",
        "set",
        "local",
        "http://localhost:9000",
        "ak",
        "sk",
        "--activity-log",
    ])
    .unwrap();
    assert!(matches!(cli.command, Commands::Alias(_)));
}

#[test]
fn test_rename_needs_new_name() {
    assert!(parse(&["rename", "local/b/a.txt"]).is_err());
    assert!(parse(&["rename", "local/b/a.txt", "b.txt"]).is_ok());
}

#[test]
fn test_mkdir_takes_one_path() {
    let cli = parse(&["mkdir", "local/b/docs/new"]).unwrap();
    let Commands::Mkdir(args) = cli.command else {
        panic!("expected mkdir");
    };
    assert_eq!(args.path, "local/b/docs/new");
    assert!(parse(&["mkdir"]).is_err());
    assert!(parse(&["mkdir", "local/b/x", "local/b/y"]).is_err());
}

#[test]
fn test_log_accepts_create_folder() {
    assert!(parse(&["log", "--action", "create_folder"]).is_ok());
}
