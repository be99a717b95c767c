//! Appending lines to shell startup files.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::AppError;

/// Exports and alias that make a local Ollama server reachable from other hosts.
pub fn ollama_env_lines() -> Vec<&'static str> {
    vec![
        "export OLLAMA_HOST=0.0.0.0",
        "export OLLAMA_ORIGINS=:127.0.0.1:11434",
        "export OLLAMA_PORT=11434",
        "# Custom alias",
        r#"alias lll="ls -alh""#,
    ]
}

/// `~/.bashrc`, or `None` when no home directory is known.
pub fn default_rc_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".bashrc"))
}

/// Append each line plus `\n` to `path`, creating the file if needed.
pub fn append_to_file<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<(), AppError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        writeln!(file, "{}", line.as_ref())?;
    }
    file.flush()?;
    info!(path = %path.display(), lines = lines.len(), "content appended");
    Ok(())
}

/// Append [`ollama_env_lines`] to `rc_path`.
///
/// A child process cannot change its parent shell's environment; callers
/// should tell the user to `source` the file.
pub fn install_ollama_env(rc_path: &Path) -> Result<(), AppError> {
    append_to_file(rc_path, ollama_env_lines().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rc");

        append_to_file(&path, &["one"]).unwrap();
        append_to_file(&path, &["two".to_string(), "three".to_string()]).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    fn append_to_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = append_to_file(&dir.path().join("no/such/rc"), &["x"]).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn ollama_env_installs_after_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".bashrc");
        std::fs::write(&rc, "# existing\n").unwrap();

        install_ollama_env(&rc).unwrap();

        let text = std::fs::read_to_string(&rc).unwrap();
        assert!(text.starts_with("# existing\nexport OLLAMA_HOST=0.0.0.0\n"));
        assert!(text.contains("export OLLAMA_PORT=11434\n"));
        assert!(text.ends_with("alias lll=\"ls -alh\"\n"));
    }

    #[test]
    fn default_rc_is_bashrc() {
        if let Some(p) = default_rc_path() {
            assert!(p.ends_with(".bashrc"));
        }
    }
}
