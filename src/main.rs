//! formal-playground entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse the command line
//!   3. Load config, logging to logs/setup.log while no logger exists,
//!      then move that file to the configured `[logging].setup_file`
//!   4. Init the rotating logger at the configured (or `-v`) level
//!   5. Dispatch the command

use std::path::Path;

use formal_playground::chat::{self, ChatSession};
use formal_playground::cli::{self, CliCommand, USAGE};
use formal_playground::config::{self, Config};
use formal_playground::error::AppError;
use formal_playground::llm::providers;
use formal_playground::logger;
use formal_playground::protocol::Protocol;
use formal_playground::runtime::{EVENTS_TOPIC, PosixPlayground, Runtime, Task, TaskOutput};
use formal_playground::utils::{shell_rc, tree};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(run());
    // A console read parked on stdin never finishes; don't wait for it.
    runtime.shutdown_background();

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Optional; missing .env is fine.
    let _ = dotenvy::dotenv();

    let args = cli::parse_args(std::env::args().skip(1))?;
    if args.command == CliCommand::Help {
        print!("{USAGE}");
        return Ok(());
    }

    let cwd = std::env::current_dir()?;

    let bootstrap_dir = cwd.join(logger::BOOTSTRAP_DIR);
    let setup = logger::setup_dispatch(&bootstrap_dir, logger::BOOTSTRAP_FILE)?;
    let config = tracing::dispatcher::with_default(&setup, || {
        let loaded = config::load(args.config_path.as_deref());
        match &loaded {
            Ok(c) => info!(name = %c.name, work_dir = %c.work_dir.display(), "config loaded"),
            Err(e) => error!("config load failed: {e}"),
        }
        loaded
    })?;
    drop(setup);
    logger::relocate_setup_log(&bootstrap_dir.join(logger::BOOTSTRAP_FILE), &config.logging, &cwd)?;

    let level = args.log_level.unwrap_or(config.log_level.as_str());
    let targets = logger::init(level, &config.logging, &cwd)?;
    debug!(log_dir = %targets.log_dir.display(), %level, "logging ready");

    match args.command {
        CliCommand::Chat => run_chat(&config).await,
        CliCommand::Tree { dir } => {
            let dir = dir.unwrap_or_else(|| cwd.clone());
            for file in tree::project_tree(&dir, config.tree_max_files)? {
                println!("{file}");
            }
            Ok(())
        }
        CliCommand::OllamaEnv { rc_file } => {
            let rc = rc_file
                .or_else(shell_rc::default_rc_path)
                .ok_or_else(|| AppError::Config("cannot locate home directory for ~/.bashrc".into()))?;
            shell_rc::install_ollama_env(&rc)?;
            println!("Ollama environment appended to {}", rc.display());
            println!("Run `source {}` to apply it to this shell.", rc.display());
            Ok(())
        }
        CliCommand::Run { program, args } => {
            run_task(&config.work_dir, Task::Command { program, args }).await
        }
        CliCommand::Process { path } => run_task(&config.work_dir, Task::ProcessFile { path }).await,
        CliCommand::Help => Ok(()),
    }
}

async fn run_chat(config: &Config) -> Result<(), AppError> {
    let provider = providers::build(&config.llm, config.llm_api_key.clone())?;
    if let Err(e) = provider.ping().await {
        warn!(provider = provider.name(), "llm endpoint not reachable: {e}");
    }

    let shutdown = CancellationToken::new();
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, closing chat");
            watcher.cancel();
        }
    });

    let mut session = ChatSession::new(provider, &config.chat);
    let stdin = BufReader::new(tokio::io::stdin());
    chat::run(&mut session, stdin, &mut std::io::stdout(), shutdown).await
}

async fn run_task(work_dir: &Path, task: Task) -> Result<(), AppError> {
    let mut playground = PosixPlayground::new(work_dir);
    let mut events = playground.events().subscribe(EVENTS_TOPIC)?;
    playground.start()?;

    let result = {
        let _wire = playground.events().open();
        let session = playground.open();
        let result = playground.execute(task).await;
        if let Err(e) = &result {
            session.report(e);
        }
        result
    };
    playground.stop()?;

    while let Some(event) = events.try_recv() {
        debug!(topic = %event.topic, payload = %event.payload, "playground event");
    }

    match result? {
        TaskOutput::Command { code, stdout, stderr } => {
            print!("{stdout}");
            eprint!("{stderr}");
            match code {
                Some(0) => Ok(()),
                Some(code) => Err(AppError::Runtime(format!("command exited with status {code}"))),
                None => Err(AppError::Runtime("command terminated by signal".into())),
            }
        }
        TaskOutput::File { path, lines, bytes, tokens } => {
            println!("{}: {lines} lines, {bytes} bytes", path.display());
            if let Some(tokens) = tokens {
                println!("tokens: {tokens}");
            }
            Ok(())
        }
    }
}
