//! POSIX playground runtime: starts, stops and executes tasks inside a
//! working directory.
//!
//! ```text
//!   Stopped ──start()──▶ Running ──stop()──▶ Stopped
//!                          │
//!                      execute(task)
//! ```
//!
//! Every task is tagged with the playground's [`ContextManager`] id in the
//! logs. File tasks run with the context lock held; commands only carry the
//! id, since a blocking lock cannot be held across the child's `await`.
//!
//! Lifecycle and task events are published on [`EVENTS_TOPIC`] of the
//! playground's [`LocalProtocol`]; subscribe through [`PosixPlayground::events`].

use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde_json::json;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::context::ContextManager;
use crate::error::AppError;
use crate::protocol::{LocalProtocol, Protocol};
use crate::token_space::{TokenSpace, token_space_for};

/// Topic carrying `started` / `stopped` / `task` events.
pub const EVENTS_TOPIC: &str = "playground";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Stopped,
    Running,
}

/// Work a runtime can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Spawn `program` with `args` in the runtime's working directory.
    Command { program: String, args: Vec<String> },
    /// Read a file under the runtime's context and summarise it.
    ProcessFile { path: PathBuf },
}

impl Task {
    pub fn command(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Task::Command { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Command {
        /// `None` when the child was killed by a signal.
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    File {
        path: PathBuf,
        /// Non-empty lines.
        lines: usize,
        bytes: u64,
        /// Whitespace tokens pushed to a token space, for file types that
        /// request one (`.py`, `.md`).
        tokens: Option<usize>,
    },
}

pub trait Runtime {
    fn state(&self) -> RuntimeState;

    /// Transition `Stopped -> Running`.
    fn start(&mut self) -> Result<(), AppError>;

    /// Transition `Running -> Stopped`.
    fn stop(&mut self) -> Result<(), AppError>;

    /// Run one task. Fails unless the runtime is running.
    fn execute(&self, task: Task) -> impl Future<Output = Result<TaskOutput, AppError>> + Send;
}

#[derive(Debug)]
pub struct PosixPlayground {
    work_dir: PathBuf,
    context: ContextManager,
    events: LocalProtocol,
    state: RuntimeState,
}

impl PosixPlayground {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            context: ContextManager::new(),
            events: LocalProtocol::new(),
            state: RuntimeState::Stopped,
        }
    }

    pub fn events(&self) -> &LocalProtocol {
        &self.events
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    /// Log entry now and exit when the returned guard drops.
    pub fn open(&self) -> PlaygroundSession<'_> {
        info!(context = %self.context.id(), work_dir = %self.work_dir.display(), "entering playground");
        PlaygroundSession { playground: self }
    }

    fn emit(&self, event: &str, detail: serde_json::Value) -> Result<(), AppError> {
        let payload = json!({ "event": event, "context": self.context.id(), "detail": detail });
        self.events.publish(EVENTS_TOPIC, payload)?;
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.work_dir.join(path) }
    }

    async fn run_command(&self, program: String, args: Vec<String>) -> Result<TaskOutput, AppError> {
        let context = self.context.id();
        debug!(%context, %program, ?args, "spawning command");

        let output = Command::new(&program)
            .args(&args)
            .current_dir(&self.work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::Runtime(format!("failed to run '{program}': {e}")))?;

        let code = output.status.code();
        info!(%context, %program, ?code, "command finished");
        Ok(TaskOutput::Command {
            code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn process_file(&self, path: &Path) -> Result<TaskOutput, AppError> {
        let path = self.resolve(path);
        self.context.scope(|guard| {
            info!(context = %guard.id(), path = %path.display(), "processing file");
            let content = std::fs::read(&path)
                .map_err(|e| AppError::Runtime(format!("cannot read {}: {e}", path.display())))?;
            let lines = content.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count();
            let tokens = extension_key(&path).and_then(|key| token_space_for::<String, _>([key])).map(|mut stack| {
                for token in String::from_utf8_lossy(&content).split_whitespace() {
                    stack.push(token.to_string());
                }
                stack.len()
            });
            Ok(TaskOutput::File { path: path.clone(), lines, bytes: content.len() as u64, tokens })
        })
    }
}

impl Runtime for PosixPlayground {
    fn state(&self) -> RuntimeState {
        self.state
    }

    fn start(&mut self) -> Result<(), AppError> {
        if self.state == RuntimeState::Running {
            return Err(AppError::Runtime("playground already running".into()));
        }
        if !self.work_dir.is_dir() {
            return Err(AppError::Runtime(format!(
                "work dir {} is not a directory",
                self.work_dir.display()
            )));
        }
        self.state = RuntimeState::Running;
        info!(context = %self.context.id(), "playground started");
        self.emit("started", json!({ "work_dir": self.work_dir }))
    }

    fn stop(&mut self) -> Result<(), AppError> {
        if self.state == RuntimeState::Stopped {
            return Err(AppError::Runtime("playground is not running".into()));
        }
        self.state = RuntimeState::Stopped;
        info!(context = %self.context.id(), "playground stopped");
        self.emit("stopped", serde_json::Value::Null)
    }

    async fn execute(&self, task: Task) -> Result<TaskOutput, AppError> {
        if self.state != RuntimeState::Running {
            return Err(AppError::Runtime("playground is not running".into()));
        }
        let label = format!("{task:?}");
        let result = match task {
            Task::Command { program, args } => self.run_command(program, args).await,
            Task::ProcessFile { path } => self.process_file(&path),
        };
        self.emit("task", json!({ "task": label, "ok": result.is_ok() }))?;
        result
    }
}

/// `.ext` of `path`, the form token-space keys use for file types.
fn extension_key(path: &Path) -> Option<String> {
    path.extension().map(|ext| format!(".{}", ext.to_string_lossy()))
}

/// Guard returned by [`PosixPlayground::open`].
pub struct PlaygroundSession<'a> {
    playground: &'a PosixPlayground,
}

impl PlaygroundSession<'_> {
    /// Record a failure seen while the playground was open.
    pub fn report(&self, err: &dyn Display) {
        error!(context = %self.playground.context.id(), error = %err, "exception caught in playground");
    }
}

impl Drop for PlaygroundSession<'_> {
    fn drop(&mut self) {
        info!(context = %self.playground.context.id(), "exiting playground");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(dir: &Path) -> PosixPlayground {
        let mut p = PosixPlayground::new(dir);
        p.start().unwrap();
        p
    }

    #[test]
    fn state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = PosixPlayground::new(dir.path());
        assert_eq!(p.state(), RuntimeState::Stopped);
        assert!(p.stop().is_err());
        p.start().unwrap();
        assert_eq!(p.state(), RuntimeState::Running);
        assert!(p.start().is_err());
        p.stop().unwrap();
        assert_eq!(p.state(), RuntimeState::Stopped);
    }

    #[test]
    fn start_requires_existing_dir() {
        let mut p = PosixPlayground::new("/nonexistent/playground");
        assert!(p.start().unwrap_err().to_string().contains("not a directory"));
    }

    #[tokio::test]
    async fn execute_requires_running() {
        let dir = tempfile::tempdir().unwrap();
        let p = PosixPlayground::new(dir.path());
        let err = p.execute(Task::command("true", Vec::<String>::new())).await.unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runs_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let p = running(dir.path());

        let out = p.execute(Task::command("ls", ["-1"])).await.unwrap();
        match out {
            TaskOutput::Command { code, stdout, .. } => {
                assert_eq!(code, Some(0));
                assert!(stdout.lines().any(|l| l == "marker.txt"));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_exit_code_and_stderr_captured() {
        let dir = tempfile::tempdir().unwrap();
        let p = running(dir.path());
        let out = p.execute(Task::command("sh", ["-c", "echo oops >&2; exit 3"])).await.unwrap();
        assert_eq!(
            out,
            TaskOutput::Command { code: Some(3), stdout: String::new(), stderr: "oops\n".into() }
        );
    }

    #[tokio::test]
    async fn missing_program_is_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = running(dir.path());
        let err = p
            .execute(Task::command("definitely-not-a-real-program-xyz", Vec::<String>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Runtime(_)));
    }

    #[tokio::test]
    async fn process_file_counts_lines_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "# title\n\nbody\n").unwrap();
        let p = running(dir.path());

        let out = p.execute(Task::ProcessFile { path: "notes.md".into() }).await.unwrap();
        assert_eq!(
            out,
            TaskOutput::File { path: dir.path().join("notes.md"), lines: 2, bytes: 14, tokens: Some(3) }
        );
        // context lock released afterwards
        assert!(p.context().try_enter().unwrap().is_some());
    }

    #[tokio::test]
    async fn plain_files_get_no_token_space() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "a,b\n1,2\n").unwrap();
        let p = running(dir.path());

        match p.execute(Task::ProcessFile { path: "data.csv".into() }).await.unwrap() {
            TaskOutput::File { lines, tokens, .. } => {
                assert_eq!(lines, 2);
                assert_eq!(tokens, None);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = PosixPlayground::new(dir.path());
        let mut events = p.events().subscribe(EVENTS_TOPIC).unwrap();

        p.start().unwrap();
        let _ = p.execute(Task::ProcessFile { path: "absent.txt".into() }).await;
        p.stop().unwrap();

        let mut seen = Vec::new();
        while let Some(env) = events.try_recv() {
            assert_eq!(env.payload["context"], json!(p.context().id()));
            seen.push(env.payload);
        }
        let names: Vec<_> = seen.iter().map(|v| v["event"].as_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["started", "task", "stopped"]);
        assert_eq!(seen[1]["detail"]["ok"], json!(false));
    }

    #[tokio::test]
    async fn process_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let p = running(dir.path());
        let err = p.execute(Task::ProcessFile { path: "absent.txt".into() }).await.unwrap_err();
        assert!(err.to_string().contains("absent.txt"));
    }
}
