//! quarry: command-line driver for a quarry database.
//!
//! `quarry --db <PATH> [flags] COMMAND` runs one command and exits. Data
//! commands open the database through the asynchronous handle, run the
//! operation, close, and print the result; `destroy` and `repair` act on
//! the directory directly.

mod commands;
mod format;
mod parse;
mod state;

use std::io;
use std::process;

use anyhow::Context;
use quarry_engine::{Runtime, RuntimeConfig};
use tracing::Level;

use commands::build_cli;
use format::{format_entries, format_error, format_lookup};
use parse::{matches_to_action, read_batch, CliAction, GlobalArgs};
use state::SessionState;

fn main() {
    let matches = build_cli().get_matches();
    if let Err(e) = run(&matches) {
        eprintln!("{}", format_error(&e));
        process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn load_config(globals: &GlobalArgs) -> anyhow::Result<RuntimeConfig> {
    match &globals.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn run(matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let globals = GlobalArgs::from_matches(matches)?;
    init_tracing(globals.verbosity);

    let config = load_config(&globals)?;
    let options = globals.apply(config.options.clone());
    let action = matches_to_action(matches)?;

    let runtime = Runtime::new(config).context("starting runtime")?;
    if action.is_directory_op() {
        match action {
            CliAction::Destroy => runtime
                .destroy_db(&globals.db, &options)
                .with_context(|| format!("destroying {}", globals.db.display()))?,
            _ => runtime
                .repair_db(&globals.db, &options)
                .with_context(|| format!("repairing {}", globals.db.display()))?,
        }
        println!("OK");
        return Ok(());
    }

    let session = SessionState::open(runtime, &globals.db, options, globals.sync)
        .with_context(|| format!("opening {}", globals.db.display()))?;
    let output = execute(&session, action);
    session.close().context("closing database")?;
    println!("{}", output?);
    Ok(())
}

fn execute(session: &SessionState, action: CliAction) -> anyhow::Result<String> {
    let output = match action {
        CliAction::Get { key, format } => {
            let value = session.get(&key)?;
            format_lookup(value.as_ref().map(|v| v.as_bytes()), format)
        }
        CliAction::Put { key, value } => {
            session.put(&key, &value)?;
            "OK".to_string()
        }
        CliAction::Del { key } => {
            session.del(&key)?;
            "OK".to_string()
        }
        CliAction::Scan {
            start,
            limit,
            reverse,
            format,
        } => {
            let entries = session.scan(start.as_deref(), limit, reverse)?;
            format_entries(&entries, format)
        }
        CliAction::Batch => {
            let batch = read_batch(io::stdin().lock()).context("reading batch from stdin")?;
            session.write(&batch)?;
            format!("OK ({} mutations)", batch.len())
        }
        other @ (CliAction::Destroy | CliAction::Repair) => {
            anyhow::bail!("{:?} does not run against an open database", other)
        }
    };
    Ok(output)
}
