//! Subprocess runner.
//!
//! # Responsibilities
//! - Spawn the hook with piped stdio
//! - Write optional stdin while reading stdout and stderr
//! - Wait for exit only after every pipe reached EOF

use std::io;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::command::HookCommand;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run `cmd` to completion, optionally feeding `stdin`.
pub async fn run(cmd: &HookCommand, stdin: Option<&[u8]>) -> Result<CommandOutput, CommandError> {
    let argv = cmd.argv();
    let (program, args) = match argv.split_first() {
        Some((program, args)) if !program.is_empty() => (program, args),
        _ => return Err(CommandError::Empty),
    };
    let command = cmd.to_string();

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

    let child_stdin = child.stdin.take();
    let mut child_stdout = child.stdout.take();
    let mut child_stderr = child.stderr.take();

    let write_stdin = async {
        if let (Some(mut pipe), Some(data)) = (child_stdin, stdin) {
            match pipe.write_all(data).await {
                Ok(()) => {}
                // The child may exit without reading its input.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e),
            }
            // Dropping the pipe closes it, signalling EOF.
        }
        Ok(())
    };
    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(pipe) = child_stdout.as_mut() {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, io::Error>(buf)
    };
    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(pipe) = child_stderr.as_mut() {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, io::Error>(buf)
    };

    let (written, stdout, stderr) = tokio::join!(write_stdin, read_stdout, read_stderr);
    let io_err = |source| CommandError::Io {
        command: command.clone(),
        source,
    };
    written.map_err(io_err)?;
    let stdout = stdout.map_err(io_err)?;
    let stderr = stderr.map_err(io_err)?;

    let status = child.wait().await.map_err(io_err)?;
    tracing::debug!(command = %command, status = ?status.code(), "Command finished");

    Ok(CommandOutput {
        status: status.code(),
        stdout,
        stderr,
    })
}
