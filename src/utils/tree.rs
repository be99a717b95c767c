//! Project file listing via `git ls-files`.

use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::AppError;

/// Tracked files of the git work tree at `dir`, relative to it.
///
/// Fails when git cannot list the tree, or when more than `max_files`
/// entries come back; large trees should be browsed directory by directory
/// instead.
pub fn project_tree(dir: &Path, max_files: usize) -> Result<Vec<String>, AppError> {
    let output = Command::new("git")
        .args(["ls-files"])
        .current_dir(dir)
        .output()
        .map_err(|e| AppError::Tree(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Tree(format!("git ls-files failed: {}", stderr.trim())));
    }

    let files: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_owned)
        .collect();

    if files.len() > max_files {
        warn!(count = files.len(), max_files, "project tree too large");
        return Err(AppError::Tree(format!(
            "too many files ({} > {max_files}); list each directory with `ls` instead",
            files.len()
        )));
    }

    debug!(count = files.len(), dir = %dir.display(), "project tree listed");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(dir: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// A repo with `n` tracked files, or `None` when git is unavailable.
    fn repo_with_files(n: usize) -> Option<tempfile::TempDir> {
        let dir = tempfile::tempdir().unwrap();
        if !git(dir.path(), &["init", "-q"]) {
            return None;
        }
        for i in 0..n {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        git(dir.path(), &["add", "."]).then_some(dir)
    }

    #[test]
    fn lists_tracked_files() {
        let Some(dir) = repo_with_files(3) else { return };
        let mut files = project_tree(dir.path(), 100).unwrap();
        files.sort();
        assert_eq!(files, vec!["f0.txt", "f1.txt", "f2.txt"]);
    }

    #[test]
    fn too_many_files_errors() {
        let Some(dir) = repo_with_files(4) else { return };
        let err = project_tree(dir.path(), 3).unwrap_err().to_string();
        assert!(err.contains("too many files"));
        assert!(project_tree(dir.path(), 4).is_ok());
    }

    #[test]
    fn outside_repo_errors() {
        let dir = tempfile::tempdir().unwrap();
        if !git(dir.path(), &["--version"]) {
            return;
        }
        // tempdir may sit inside an enclosing repo on some hosts
        if git(dir.path(), &["rev-parse", "--is-inside-work-tree"]) {
            return;
        }
        assert!(matches!(project_tree(dir.path(), 100), Err(AppError::Tree(_))));
    }
}
