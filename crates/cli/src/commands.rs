//! Clap command tree definition.

use clap::{value_parser, Arg, ArgAction, Command};

/// Accepted values for `--format`.
pub const FORMATS: [&str; 3] = ["text", "hex", "base64"];

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("quarry")
        .about("Command-line driver for a quarry database")
        .version(quarry_engine::VERSION)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .help("Database directory")
                .value_parser(value_parser!(std::path::PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("create-if-missing")
                .long("create-if-missing")
                .help("Create the database if it does not exist")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("error-if-exists")
                .long("error-if-exists")
                .help("Fail if the database already exists")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("paranoid")
                .long("paranoid")
                .help("Treat any damage found in the log as fatal")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sync")
                .long("sync")
                .help("Flush writes to disk before reporting success")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Runtime configuration (quarry.toml)")
                .value_parser(value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v, -vv, -vvv)")
                .action(ArgAction::Count),
        )
        .subcommand(build_get())
        .subcommand(
            Command::new("put")
                .about("Store a value under a key")
                .arg(Arg::new("key").required(true).value_name("KEY"))
                .arg(Arg::new("value").required(true).value_name("VALUE")),
        )
        .subcommand(
            Command::new("del")
                .about("Delete a key")
                .arg(Arg::new("key").required(true).value_name("KEY")),
        )
        .subcommand(build_scan())
        .subcommand(
            Command::new("batch")
                .about("Apply `put <key> <value>` / `del <key>` lines from stdin as one atomic batch"),
        )
        .subcommand(Command::new("destroy").about("Delete the database directory"))
        .subcommand(Command::new("repair").about("Salvage what can be read from a damaged database"))
}

fn format_arg() -> Arg {
    Arg::new("format")
        .long("format")
        .value_name("FORMAT")
        .help("Output encoding for values")
        .value_parser(FORMATS)
        .default_value("text")
}

fn build_get() -> Command {
    Command::new("get")
        .about("Read the value stored under a key")
        .arg(Arg::new("key").required(true).value_name("KEY"))
        .arg(format_arg())
}

fn build_scan() -> Command {
    Command::new("scan")
        .about("List entries in key order")
        .arg(
            Arg::new("start")
                .long("start")
                .value_name("KEY")
                .help("First key to list (last key when reversed)"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_name("N")
                .help("Stop after N entries")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("reverse")
                .long("reverse")
                .help("Walk from the end towards the start")
                .action(ArgAction::SetTrue),
        )
        .arg(format_arg())
}
