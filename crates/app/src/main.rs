use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_core::model::{
    ConversionStats, HistoryId, LessonId, OptionsPatch, SessionState, UserProfile,
};
use services::{
    ApiConfig, Clock, HeadlessShell, LearningStats, OfflineTransport, Outcome, PortalContext,
};
use storage::Mirror;

const DB_PATH_VAR: &str = "PORTAL_DB_PATH";
const DEFAULT_DB_PATH: &str = "portal.sqlite3";
const DEFAULT_RECENT: usize = 10;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { command: &'static str, name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { name: &'static str, raw: String },
    InvalidOption(String),
    InvalidDbPath { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { command, name } => {
                write!(f, "{command} requires <{name}>")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidNumber { name, raw } => write!(f, "invalid {name}: {raw}"),
            ArgsError::InvalidOption(raw) => {
                write!(f, "invalid option {raw}, expected <name>=on|off")
            }
            ArgsError::InvalidDbPath { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  portal [--db <path>] [--offline] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                          session, learning and conversion summary");
    eprintln!("  login <username> <password>");
    eprintln!("  logout");
    eprintln!("  sync                            refresh modules, progress and quiz results");
    eprintln!("  progress <lesson-id> <percent>");
    eprintln!("  quiz <lesson-id> <score>");
    eprintln!("  study <lesson-id> <seconds>");
    eprintln!("  convert <file|->                convert Java source to Python");
    eprintln!("  history [limit]                 recent conversions, newest first");
    eprintln!("  delete-history <id>");
    eprintln!("  clear-history");
    eprintln!("  options [<name>=on|off ...]     comments, type-hints, readability, exceptions");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PORTAL_API_BASE_URL, PORTAL_API_TIMEOUT_SECS, PORTAL_DB_PATH, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Status,
    Login { username: String, password: String },
    Logout,
    Sync,
    Progress { lesson: LessonId, percent: f64 },
    Quiz { lesson: LessonId, score: f64 },
    Study { lesson: LessonId, secs: u64 },
    Convert { input: String },
    History { limit: usize },
    DeleteHistory { id: HistoryId },
    ClearHistory,
    Options { patch: OptionsPatch },
}

struct Args {
    db_path: PathBuf,
    offline: bool,
    command: Command,
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn positional(
    rest: &mut impl Iterator<Item = String>,
    command: &'static str,
    name: &'static str,
) -> Result<String, ArgsError> {
    rest.next()
        .ok_or(ArgsError::MissingArgument { command, name })
}

fn number<T: std::str::FromStr>(raw: String, name: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { name, raw })
}

fn parse_toggle(raw: &str, patch: &mut OptionsPatch) -> Result<(), ArgsError> {
    let invalid = || ArgsError::InvalidOption(raw.to_string());
    let (name, value) = raw.split_once('=').ok_or_else(invalid)?;
    let value = match value {
        "on" | "true" => true,
        "off" | "false" => false,
        _ => return Err(invalid()),
    };
    match name {
        "comments" => patch.preserve_comments = Some(value),
        "type-hints" => patch.include_type_hints = Some(value),
        "readability" => patch.optimize_for_readability = Some(value),
        "exceptions" => patch.handle_exceptions = Some(value),
        _ => return Err(invalid()),
    }
    Ok(())
}

impl Command {
    fn parse(name: &str, rest: Vec<String>) -> Result<Self, ArgsError> {
        let mut rest = rest.into_iter();
        let command = match name {
            "status" => Self::Status,
            "login" => Self::Login {
                username: positional(&mut rest, "login", "username")?,
                password: positional(&mut rest, "login", "password")?,
            },
            "logout" => Self::Logout,
            "sync" => Self::Sync,
            "progress" => Self::Progress {
                lesson: LessonId::new(positional(&mut rest, "progress", "lesson-id")?),
                percent: number(positional(&mut rest, "progress", "percent")?, "percent")?,
            },
            "quiz" => Self::Quiz {
                lesson: LessonId::new(positional(&mut rest, "quiz", "lesson-id")?),
                score: number(positional(&mut rest, "quiz", "score")?, "score")?,
            },
            "study" => Self::Study {
                lesson: LessonId::new(positional(&mut rest, "study", "lesson-id")?),
                secs: number(positional(&mut rest, "study", "seconds")?, "seconds")?,
            },
            "convert" => Self::Convert {
                input: positional(&mut rest, "convert", "file")?,
            },
            "history" => Self::History {
                limit: match rest.next() {
                    Some(raw) => number(raw, "limit")?,
                    None => DEFAULT_RECENT,
                },
            },
            "delete-history" => Self::DeleteHistory {
                id: HistoryId::new(positional(&mut rest, "delete-history", "id")?),
            },
            "clear-history" => Self::ClearHistory,
            "options" => {
                let mut patch = OptionsPatch::default();
                for raw in rest.by_ref() {
                    parse_toggle(&raw, &mut patch)?;
                }
                Self::Options { patch }
            }
            other => return Err(ArgsError::UnknownCommand(other.to_string())),
        };
        if let Some(extra) = rest.next() {
            return Err(ArgsError::UnknownArg(extra));
        }
        Ok(command)
    }
}

impl Args {
    /// `None` means help was requested.
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut db_path = std::env::var(DB_PATH_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from);
        let mut offline = false;
        let mut words = Vec::new();

        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbPath { raw: value });
                    }
                    db_path = PathBuf::from(value);
                }
                "--offline" => offline = true,
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => words.push(arg),
            }
        }

        let mut words = words.into_iter();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let command = Command::parse(&name, words.collect())?;
        Ok(Some(Self {
            db_path,
            offline,
            command,
        }))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    state: SessionState,
    user: Option<UserProfile>,
    learning: LearningStats,
    unsynced_lessons: Vec<LessonId>,
    conversions: ConversionStats,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn prepare_db_dir(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.as_os_str().is_empty() {
        return Err(ArgsError::InvalidDbPath {
            raw: path.display().to_string(),
        }
        .into());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn read_source(input: &str) -> std::io::Result<String> {
    if input == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        return Ok(source);
    }
    std::fs::read_to_string(input)
}

/// Print `outcome` as JSON on stdout. Returns whether it succeeded.
fn emit<T: Serialize>(outcome: &Outcome<T>) -> Result<bool, serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(outcome.success)
}

fn emit_result<T: Serialize, E: fmt::Display>(result: Result<T, E>) -> Result<bool, serde_json::Error> {
    emit(&Outcome::<T>::from(result))
}

async fn execute(context: &PortalContext, command: Command) -> Result<bool, Box<dyn std::error::Error>> {
    let session = context.session();
    let learning = context.learning();
    let conversion = context.conversion();

    let success = match command {
        Command::Status => emit(&Outcome::ok(Status {
            state: session.state(),
            user: session.user(),
            learning: learning.stats(),
            unsynced_lessons: learning.unsynced_lessons(),
            conversions: conversion.stats(),
        }))?,
        Command::Login { username, password } => {
            emit_result(session.login(&username, &password).await)?
        }
        Command::Logout => {
            session.logout().await;
            emit(&Outcome::ok(session.state()))?
        }
        Command::Sync => {
            if let Err(err) = session.ensure_fresh().await {
                warn!(error = %err, "could not refresh session before sync");
            }
            emit(&Outcome::ok(learning.initialize().await))?
        }
        Command::Progress { lesson, percent } => {
            emit_result(learning.update_progress(&lesson, percent).await)?
        }
        Command::Quiz { lesson, score } => {
            emit_result(learning.submit_quiz(&lesson, score, Vec::new()).await)?
        }
        Command::Study { lesson, secs } => emit(&Outcome::ok(
            learning.record_time(&lesson, Duration::from_secs(secs)).await,
        ))?,
        Command::Convert { input } => {
            let source = read_source(&input)?;
            emit_result(conversion.convert(&source, None).await)?
        }
        Command::History { limit } => emit(&Outcome::ok(conversion.recent(limit)))?,
        Command::DeleteHistory { id } => {
            if conversion.delete_history_entry(&id) {
                emit(&Outcome::ok(id))?
            } else {
                emit(&Outcome::<HistoryId>::failed(format!("no history entry {id}")))?
            }
        }
        Command::ClearHistory => {
            conversion.clear_history();
            emit(&Outcome::ok(conversion.stats()))?
        }
        Command::Options { patch } => {
            let options = if patch == OptionsPatch::default() {
                conversion.options()
            } else {
                conversion.update_options(patch)
            };
            emit(&Outcome::ok(options))?
        }
    };
    Ok(success)
}

async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let Some(args) = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?
    else {
        print_usage();
        return Ok(true);
    };

    let config = ApiConfig::from_env()?;
    prepare_db_dir(&args.db_path)?;
    let mirror = Mirror::sqlite(&args.db_path)?;
    debug!(db = %args.db_path.display(), offline = args.offline, base_url = %config.base_url, "starting");

    let shell = Arc::new(HeadlessShell);
    let context = if args.offline {
        PortalContext::new(Arc::new(OfflineTransport), config, mirror, shell, Clock::system())
    } else {
        PortalContext::with_reqwest(config, mirror, shell, Clock::system())?
    };

    if let Some(validation) = context.start() {
        if let Err(err) = validation.await {
            warn!(error = %err, "session validation task failed");
        }
    }

    let success = execute(&context, args.command).await?;
    context.shutdown();
    Ok(success)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_global_flags_and_command() {
        let args = Args::parse(words(&["--db", "tmp/p.db", "--offline", "progress", "vars", "40"]))
            .unwrap()
            .unwrap();
        assert_eq!(args.db_path, PathBuf::from("tmp/p.db"));
        assert!(args.offline);
        assert_eq!(
            args.command,
            Command::Progress {
                lesson: LessonId::new("vars"),
                percent: 40.0
            }
        );
    }

    #[test]
    fn no_command_means_help() {
        assert!(Args::parse(words(&[])).unwrap().is_none());
        assert!(Args::parse(words(&["--offline", "-h"])).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Args::parse(words(&["fly"])),
            Err(ArgsError::UnknownCommand(_))
        ));
        assert!(matches!(
            Args::parse(words(&["login", "ada"])),
            Err(ArgsError::MissingArgument { name: "password", .. })
        ));
        assert!(matches!(
            Args::parse(words(&["progress", "vars", "lots"])),
            Err(ArgsError::InvalidNumber { name: "percent", .. })
        ));
        assert!(matches!(
            Args::parse(words(&["logout", "now"])),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            Args::parse(words(&["--db"])),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
    }

    #[test]
    fn option_toggles_build_a_patch() {
        let args = Args::parse(words(&["options", "comments=off", "type-hints=on"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            args.command,
            Command::Options {
                patch: OptionsPatch {
                    preserve_comments: Some(false),
                    include_type_hints: Some(true),
                    ..OptionsPatch::default()
                }
            }
        );
        assert!(matches!(
            Args::parse(words(&["options", "comments=maybe"])),
            Err(ArgsError::InvalidOption(_))
        ));
    }

    #[test]
    fn history_limit_defaults() {
        let args = Args::parse(words(&["history"])).unwrap().unwrap();
        assert_eq!(args.command, Command::History { limit: DEFAULT_RECENT });
    }
}
