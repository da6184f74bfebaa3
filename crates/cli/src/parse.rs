//! ArgMatches → CliAction conversion, and batch-line parsing.

use std::io::BufRead;
use std::path::PathBuf;

use clap::ArgMatches;
use quarry_core::{Error, Options, Result};
use quarry_engine::WriteBatch;

use crate::format::OutputFormat;

/// Usage shown for a malformed batch line.
pub const BATCH_USAGE: &str = "usage: `put <key> <value>` or `del <key>`";

/// The command to run against the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Get {
        key: String,
        format: OutputFormat,
    },
    Put {
        key: String,
        value: String,
    },
    Del {
        key: String,
    },
    Scan {
        start: Option<String>,
        limit: Option<usize>,
        reverse: bool,
        format: OutputFormat,
    },
    /// Mutations are read from stdin once the database is open.
    Batch,
    Destroy,
    Repair,
}

impl CliAction {
    /// True for commands that work on the directory rather than an open handle.
    pub fn is_directory_op(&self) -> bool {
        matches!(self, CliAction::Destroy | CliAction::Repair)
    }
}

/// Flags shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub db: PathBuf,
    pub config: Option<PathBuf>,
    pub sync: bool,
    pub verbosity: u8,
    create_if_missing: bool,
    error_if_exists: bool,
    paranoid: bool,
}

impl GlobalArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let db = matches
            .get_one::<PathBuf>("db")
            .cloned()
            .ok_or_else(|| Error::bad_argument("--db is required"))?;
        Ok(GlobalArgs {
            db,
            config: matches.get_one::<PathBuf>("config").cloned(),
            sync: matches.get_flag("sync"),
            verbosity: matches.get_count("verbose"),
            create_if_missing: matches.get_flag("create-if-missing"),
            error_if_exists: matches.get_flag("error-if-exists"),
            paranoid: matches.get_flag("paranoid"),
        })
    }

    /// Layer the command-line flags over the configured defaults. Flags only
    /// switch options on.
    pub fn apply(&self, mut options: Options) -> Options {
        options.create_if_missing |= self.create_if_missing;
        options.error_if_exists |= self.error_if_exists;
        options.paranoid_checks |= self.paranoid;
        options
    }
}

/// Convert clap ArgMatches into a CliAction.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction> {
    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| Error::bad_argument("No command provided"))?;

    let action = match name {
        "get" => CliAction::Get {
            key: required(sub, "key")?,
            format: format_of(sub),
        },
        "put" => CliAction::Put {
            key: required(sub, "key")?,
            value: required(sub, "value")?,
        },
        "del" => CliAction::Del {
            key: required(sub, "key")?,
        },
        "scan" => CliAction::Scan {
            start: sub.get_one::<String>("start").cloned(),
            limit: sub.get_one::<usize>("limit").copied(),
            reverse: sub.get_flag("reverse"),
            format: format_of(sub),
        },
        "batch" => CliAction::Batch,
        "destroy" => CliAction::Destroy,
        "repair" => CliAction::Repair,
        other => return Err(Error::bad_argument(format!("Unknown command: {}", other))),
    };
    Ok(action)
}

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| Error::bad_argument(format!("<{}> is required", name.to_uppercase())))
}

fn format_of(matches: &ArgMatches) -> OutputFormat {
    matches
        .get_one::<String>("format")
        .map(|s| OutputFormat::from_name(s))
        .unwrap_or_default()
}

/// One mutation from a batch script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchLine<'a> {
    Put { key: &'a str, value: &'a str },
    Del { key: &'a str },
}

/// Parse one batch line. Blank lines and `#` comments yield `None`.
///
/// The value of a `put` is the rest of the line after the key, so it may
/// contain spaces.
pub fn parse_batch_line(line: &str) -> Result<Option<BatchLine<'_>>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (op, rest) = split_word(trimmed);
    let (key, value) = split_word(rest);

    match op {
        "put" if !key.is_empty() && !value.is_empty() => Ok(Some(BatchLine::Put { key, value })),
        "del" if !key.is_empty() && value.is_empty() => Ok(Some(BatchLine::Del { key })),
        _ => Err(Error::bad_argument(format!(
            "malformed batch line {:?}; {}",
            trimmed, BATCH_USAGE
        ))),
    }
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(at) => (&s[..at], s[at..].trim_start()),
        None => (s, ""),
    }
}

/// Read a whole batch script.
pub fn read_batch(input: impl BufRead) -> Result<WriteBatch> {
    let mut batch = WriteBatch::new();
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        match parse_batch_line(&line) {
            Ok(Some(BatchLine::Put { key, value })) => {
                batch.put(key, value);
            }
            Ok(Some(BatchLine::Del { key })) => {
                batch.del(key);
            }
            Ok(None) => {}
            Err(e) => {
                return Err(Error::bad_argument(format!("line {}: {}", index + 1, message(&e))))
            }
        }
    }
    Ok(batch)
}

fn message(err: &Error) -> String {
    match err {
        Error::BadArgument(msg) => msg.clone(),
        other => other.to_string(),
    }
}
