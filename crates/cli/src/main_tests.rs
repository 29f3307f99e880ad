// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::CommandFactory;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn run_parses_force_and_targets() {
    let cli = Cli::parse_from([
        "kiln", "run", "ci.yaml", "--force", "build", "--force", "test", "--target", "deploy",
        "--concurrency", "2", "--dry-run",
    ]);
    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.file, PathBuf::from("ci.yaml"));
            assert_eq!(args.force, ["build", "test"]);
            assert_eq!(args.targets, ["deploy"]);
            assert_eq!(args.concurrency, Some(2));
            assert!(args.dry_run);
            assert!(!args.detach);
        }
        _ => panic!("expected run"),
    }
}

#[test]
fn global_workdir_and_json_flags_parse() {
    let cli = Cli::parse_from(["kiln", "--workdir", "/data/kiln", "--json", "list"]);
    assert_eq!(cli.workdir, Some(PathBuf::from("/data/kiln")));
    assert!(cli.json);
    assert_eq!(cli.output_format(), output::OutputFormat::Json);
}

#[test]
fn exec_requires_file_and_step() {
    assert!(Cli::try_parse_from(["kiln", "exec", "ci.yaml"]).is_err());
    let cli = Cli::parse_from(["kiln", "exec", "ci.yaml", "lint"]);
    match cli.command {
        Commands::Exec(args) => {
            assert_eq!(args.step, "lint");
        }
        _ => panic!("expected exec"),
    }
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let err = Cli::try_parse_from(["kiln", "frobnicate"]).unwrap_err();
    // clap exits with code 2 for usage errors.
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn workspaces_root_prefers_flag() {
    let cli = Cli::parse_from(["kiln", "--workdir", "/custom", "list"]);
    assert_eq!(cli.workspaces_root(), PathBuf::from("/custom"));
}
