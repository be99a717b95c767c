//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path given with `--config`), then applies `PLAYGROUND_WORK_DIR`
//! and `PLAYGROUND_LOG_LEVEL` env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log sink configuration (`[logging]`).
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Name of the logs directory, resolved against the working directory.
    pub dir: PathBuf,
    /// File name of the rotating application log.
    pub file: String,
    /// File name of the bootstrap log written before config is known.
    pub setup_file: String,
    /// Rotate before a write that would bring the log to this many bytes.
    pub max_bytes: u64,
    /// Number of numbered backups to keep (`app.log.1` … `app.log.N`).
    pub backup_count: usize,
    /// Mirror log lines to stdout.
    pub console: bool,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// HTTP timeout in seconds: the whole request for `complete`, the gap
    /// between chunks while streaming.
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"openai"`, `"openai-compatible"`).
    /// Maps to `default` in `[llm]`.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Seed messages for the chat console (`[chat]`).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub system_prompt: String,
    pub greeting: String,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    /// Working directory for the playground runtime (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY` env var. Never sourced from TOML.
    pub llm_api_key: Option<String>,
    pub chat: ChatConfig,
    /// Upper bound on files listed by the `tree` command.
    pub tree_max_files: usize,
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    app: RawApp,
    #[serde(default)]
    logging: RawLogging,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    chat: RawChat,
    #[serde(default)]
    tree: RawTree,
}

#[derive(Deserialize)]
struct RawApp {
    name: String,
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawLogging {
    #[serde(default = "default_logs_dir")]
    dir: String,
    #[serde(default = "default_log_file")]
    file: String,
    #[serde(default = "default_setup_file")]
    setup_file: String,
    #[serde(default = "default_max_bytes")]
    max_bytes: u64,
    #[serde(default = "default_backup_count")]
    backup_count: usize,
    #[serde(default = "default_true")]
    console: bool,
}

impl Default for RawLogging {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
            file: default_log_file(),
            setup_file: default_setup_file(),
            max_bytes: default_max_bytes(),
            backup_count: default_backup_count(),
            console: true,
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawChat {
    #[serde(default = "default_system_prompt")]
    system_prompt: String,
    #[serde(default = "default_greeting")]
    greeting: String,
}

impl Default for RawChat {
    fn default() -> Self {
        Self { system_prompt: default_system_prompt(), greeting: default_greeting() }
    }
}

#[derive(Deserialize)]
struct RawTree {
    #[serde(default = "default_tree_max_files")]
    max_files: usize,
}

impl Default for RawTree {
    fn default() -> Self {
        Self { max_files: default_tree_max_files() }
    }
}

fn default_work_dir() -> String { ".".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_logs_dir() -> String { "logs".to_string() }
fn default_log_file() -> String { "app.log".to_string() }
fn default_setup_file() -> String { "setup.log".to_string() }
fn default_max_bytes() -> u64 { 10 * 1024 * 1024 }
fn default_backup_count() -> usize { 10 }
fn default_llm_provider() -> String { "openai-compatible".to_string() }
fn default_openai_api_base_url() -> String { "http://localhost:1234/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "local-model".to_string() }
fn default_openai_temperature() -> f32 { 0.7 }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_tree_max_files() -> usize { 100 }

fn default_system_prompt() -> String {
    "You are an intelligent assistant. Provide well-reasoned answers that are both correct and helpful."
        .to_string()
}

fn default_greeting() -> String {
    "Hello, introduce yourself to someone opening this program for the first time. Be concise."
        .to_string()
}

fn default_true() -> bool {
    true
}

/// Load config from `path` (or [`DEFAULT_CONFIG_PATH`]), then apply env-var overrides.
pub fn load(path: Option<&Path>) -> Result<Config, AppError> {
    let work_dir_override = env::var("PLAYGROUND_WORK_DIR").ok();
    let log_level_override = env::var("PLAYGROUND_LOG_LEVEL").ok();
    let mut config = load_from(
        path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH)),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )?;
    config.llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    Ok(config)
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, work_dir_override, log_level_override)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))
}

fn parse(
    raw: &str,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, toml::de::Error> {
    let parsed: RawConfig = toml::from_str(raw)?;
    let app = parsed.app;

    let work_dir = expand_home(work_dir_override.unwrap_or(&app.work_dir));
    let log_level = log_level_override.unwrap_or(&app.log_level).to_string();

    Ok(Config {
        name: app.name,
        work_dir,
        log_level,
        logging: LoggingConfig {
            dir: expand_home(&parsed.logging.dir),
            file: parsed.logging.file,
            setup_file: parsed.logging.setup_file,
            max_bytes: parsed.logging.max_bytes,
            backup_count: parsed.logging.backup_count,
            console: parsed.logging.console,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: None,
        chat: ChatConfig {
            system_prompt: parsed.chat.system_prompt,
            greeting: parsed.chat.greeting,
        },
        tree_max_files: parsed.tree.max_files,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Safe `Config` for unit tests: dummy LLM, no API keys, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            logging: LoggingConfig {
                dir: work_dir.join("logs"),
                file: default_log_file(),
                setup_file: default_setup_file(),
                max_bytes: default_max_bytes(),
                backup_count: default_backup_count(),
                console: false,
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            chat: ChatConfig {
                system_prompt: default_system_prompt(),
                greeting: default_greeting(),
            },
            tree_max_files: default_tree_max_files(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[app]
name = "test-playground"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.name, "test-playground");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.work_dir, PathBuf::from("."));
        assert_eq!(cfg.logging.dir, PathBuf::from("logs"));
        assert_eq!(cfg.logging.file, "app.log");
        assert_eq!(cfg.logging.max_bytes, 10_485_760);
        assert_eq!(cfg.logging.backup_count, 10);
        assert!(cfg.logging.console);
        assert_eq!(cfg.llm.provider, "openai-compatible");
        assert_eq!(cfg.llm.openai.api_base_url, "http://localhost:1234/v1/chat/completions");
        assert!((cfg.llm.openai.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.tree_max_files, 100);
        assert!(cfg.chat.greeting.starts_with("Hello"));
        assert!(cfg.llm_api_key.is_none());
    }

    #[test]
    fn explicit_sections_override_defaults() {
        let f = write_toml(
            r#"
[app]
name = "p"
log_level = "debug"

[logging]
max_bytes = 2048
backup_count = 2
console = false

[llm]
default = "dummy"

[llm.openai]
model = "qwen2"
temperature = 0.1

[chat]
system_prompt = "be terse"
greeting = "hi"

[tree]
max_files = 5
"#,
        );
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.logging.max_bytes, 2048);
        assert_eq!(cfg.logging.backup_count, 2);
        assert!(!cfg.logging.console);
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.llm.openai.model, "qwen2");
        assert_eq!(cfg.chat.system_prompt, "be terse");
        assert_eq!(cfg.chat.greeting, "hi");
        assert_eq!(cfg.tree_max_files, 5);
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.playground");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".playground"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
        assert!(msg.contains("/nonexistent/config.toml"));
    }

    #[test]
    fn missing_app_section_errors() {
        let f = write_toml("[llm]\ndefault = \"dummy\"\n");
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/test-override"), Some("trace")).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/test-override"));
        assert_eq!(cfg.log_level, "trace");
    }

    #[test]
    fn shipped_default_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let cfg = load_from(&path, None, None).unwrap();
        assert_eq!(cfg.name, "formal-playground");
    }
}
