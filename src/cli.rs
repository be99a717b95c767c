//! Command-line parsing.
//!
//! Options come before the command; everything after the command word
//! belongs to it, so `run ls -la` passes `-la` through to `ls`.

use std::path::PathBuf;

use crate::error::AppError;

pub const USAGE: &str = "\
Usage: formal-playground [OPTIONS] [COMMAND]

Commands:
  chat                       Streaming chat console (default)
  tree [DIR]                 List tracked project files (git ls-files)
  ollama-env [RC_FILE]       Append Ollama exports to RC_FILE (default: ~/.bashrc)
  run <PROGRAM> [ARGS...]    Run a program inside the playground work dir
  process <FILE>             Summarise a file inside the playground
  help                       Print this help

Options:
  -h, --help                 Print help
  -f, --config <PATH>        Path to configuration file (default: config/default.toml)
  -v, -vv, -vvv, -vvvv       Increase logging verbosity
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Chat,
    Tree { dir: Option<PathBuf> },
    OllamaEnv { rc_file: Option<PathBuf> },
    Run { program: String, args: Vec<String> },
    Process { path: PathBuf },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    /// Set when `-v` flags were given; overrides the configured level.
    pub log_level: Option<&'static str>,
    pub command: CliCommand,
}

pub fn parse_args<I>(args: I) -> Result<CliArgs, AppError>
where
    I: IntoIterator<Item = String>,
{
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut iter = args.into_iter();
    let mut command_word = None;

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                command_word = Some("help".to_string());
                break;
            }
            "-f" | "--config" => match iter.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => return Err(AppError::Usage("-f/--config requires a path argument".into())),
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            a if a.starts_with('-') => return Err(AppError::Usage(format!("unknown option: {a}"))),
            _ => {
                command_word = Some(arg.clone());
                break;
            }
        }
    }

    let rest: Vec<String> = iter.collect();
    let command = match command_word.as_deref().unwrap_or("chat") {
        "chat" => no_extra("chat", &rest, CliCommand::Chat)?,
        "help" => CliCommand::Help,
        "tree" => CliCommand::Tree { dir: optional_path("tree", rest)? },
        "ollama-env" => CliCommand::OllamaEnv { rc_file: optional_path("ollama-env", rest)? },
        "run" => {
            let mut rest = rest.into_iter();
            let program = rest
                .next()
                .ok_or_else(|| AppError::Usage("run requires a program".into()))?;
            CliCommand::Run { program, args: rest.collect() }
        }
        "process" => {
            let path = optional_path("process", rest)?
                .ok_or_else(|| AppError::Usage("process requires a file".into()))?;
            CliCommand::Process { path }
        }
        other => return Err(AppError::Usage(format!("unknown command: {other}"))),
    };

    // Each -v raises verbosity one tier:
    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    Ok(CliArgs { config_path, log_level, command })
}

fn no_extra(command: &str, rest: &[String], parsed: CliCommand) -> Result<CliCommand, AppError> {
    if let Some(extra) = rest.first() {
        return Err(AppError::Usage(format!("{command}: unexpected argument '{extra}'")));
    }
    Ok(parsed)
}

fn optional_path(command: &str, rest: Vec<String>) -> Result<Option<PathBuf>, AppError> {
    match rest.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(PathBuf::from(one))),
        [_, extra, ..] => Err(AppError::Usage(format!("{command}: unexpected argument '{extra}'"))),
    }
}
