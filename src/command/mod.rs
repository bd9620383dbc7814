//! Hook command execution.
//!
//! # Data Flow
//! ```text
//! HookCommand (config / CLI)
//!     → runner.rs (spawn, feed stdin, drain stdout + stderr)
//!     → CommandOutput (exit code, captured output)
//! ```
//!
//! # Design Decisions
//! - Pipes are drained concurrently so a chatty child never blocks on a full pipe
//! - A non-zero exit is not an error here; callers decide what it means

pub mod runner;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use runner::{run, CommandError, CommandOutput};

/// An external command run around config renders.
///
/// A plain string is handed to `sh -c`; a list is executed directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HookCommand {
    Shell(String),
    Argv(Vec<String>),
}

impl HookCommand {
    /// Program and arguments to execute.
    pub fn argv(&self) -> Vec<String> {
        match self {
            HookCommand::Shell(line) => vec!["sh".to_string(), "-c".to_string(), line.clone()],
            HookCommand::Argv(args) => args.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            HookCommand::Shell(line) => line.trim().is_empty(),
            HookCommand::Argv(args) => args.first().map_or(true, |p| p.is_empty()),
        }
    }
}

impl fmt::Display for HookCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookCommand::Shell(line) => write!(f, "{}", line),
            HookCommand::Argv(args) => write!(f, "{}", args.join(" ")),
        }
    }
}

impl From<String> for HookCommand {
    fn from(line: String) -> Self {
        HookCommand::Shell(line)
    }
}
