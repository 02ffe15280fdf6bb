use std::env;
use std::path::PathBuf;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use consync::sync::{CheckCommand, ResetCommand, StatusCommand, SyncCommand, SyncOptions};
use consync::{Config, Result};

fn main() {
    let matches = App::new("consync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Mirror a tree of Markdown files into a Confluence space")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("project-dir")
                .long("project-dir")
                .help("Project root containing consync.yaml")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("sync")
                .about("Reconcile the local tree with the remote space")
                .arg(
                    Arg::with_name("force")
                        .long("force")
                        .help("Update every page even when unchanged"),
                )
                .arg(
                    Arg::with_name("dry-run")
                        .long("dry-run")
                        .help("Compute the plan but make no remote calls"),
                ),
        )
        .subcommand(
            SubCommand::with_name("status").about("Show the plan without executing it"),
        )
        .subcommand(SubCommand::with_name("check").about("Check internal links"))
        .subcommand(SubCommand::with_name("reset").about("Delete the persisted sync state"))
        .get_matches();

    std::process::exit(run(&matches));
}

fn run(matches: &ArgMatches) -> i32 {
    let project_root = match matches.value_of("project-dir") {
        Some(dir) => PathBuf::from(dir),
        None => match env::current_dir() {
            Ok(dir) => dir,
            Err(err) => {
                eprintln!("Error: cannot determine working directory: {}", err);
                return 1;
            }
        },
    };

    let config = match Config::load(&project_root) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            return err.exit_code();
        }
    };

    let result: Result<()> = match matches.subcommand() {
        ("sync", Some(sub)) => SyncCommand::run(
            config,
            SyncOptions {
                force: sub.is_present("force"),
                dry_run: sub.is_present("dry-run"),
            },
        ),
        ("status", _) => StatusCommand::run(config),
        ("check", _) => CheckCommand::run(config),
        ("reset", _) => ResetCommand::run(config),
        _ => unreachable!("subcommand is required"),
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            err.exit_code()
        }
    }
}
