//! Small shell-side helpers used by the CLI commands.

pub mod shell_rc;
pub mod tree;
