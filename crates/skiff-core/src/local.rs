//! Local process execution for `CMD` and local `VAR ... = CMD(...)`.
//!
//! Streaming runs forward the child's stdout and stderr through two
//! concurrent tasks. Both tasks are joined after the child exits, so all of
//! its output has been written before the call returns.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Errors from running a local process.
#[derive(Error, Debug)]
pub enum LocalError {
    /// The argv was empty.
    #[error("empty command")]
    EmptyCommand,

    /// The program could not be started.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The program ran but did not succeed.
    #[error("local command `{command}` failed ({})", exit_description(.code))]
    Failed { command: String, code: Option<i32> },

    /// Reading output or waiting on the child failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An output forwarding task panicked.
    #[error("output task failed: {0}")]
    Task(String),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Spawns local processes, optionally from a fixed working directory.
#[derive(Debug, Clone, Default)]
pub struct LocalShell {
    cwd: Option<PathBuf>,
}

impl LocalShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every command from `cwd` instead of the process directory.
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }

    fn command(&self, argv: &[String]) -> Result<Command, LocalError> {
        let (program, args) = argv.split_first().ok_or(LocalError::EmptyCommand)?;
        let mut command = Command::new(program);
        command.args(args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        Ok(command)
    }

    /// Run `argv`, streaming its output to this process's stdout/stderr.
    pub async fn run_streaming(&self, argv: &[String]) -> Result<(), LocalError> {
        self.run_streaming_to(argv, tokio::io::stdout(), tokio::io::stderr())
            .await
            .map(|_| ())
    }

    /// Run `argv`, forwarding stdout and stderr into the given writers.
    /// The writers are handed back once the child has exited and both have
    /// been flushed.
    pub async fn run_streaming_to<O, E>(
        &self,
        argv: &[String],
        stdout: O,
        stderr: E,
    ) -> Result<(O, E), LocalError>
    where
        O: AsyncWrite + Unpin + Send + 'static,
        E: AsyncWrite + Unpin + Send + 'static,
    {
        let command_line = argv.join(" ");
        let mut child = self
            .command(argv)?
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LocalError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        debug!(command = %command_line, pid = ?child.id(), "spawned local command");

        let out_task = tokio::spawn(forward(child.stdout.take(), stdout));
        let err_task = tokio::spawn(forward(child.stderr.take(), stderr));

        let status = child.wait().await?;
        let (out, err) = tokio::join!(out_task, err_task);
        let stdout = out.map_err(|e| LocalError::Task(e.to_string()))??;
        let stderr = err.map_err(|e| LocalError::Task(e.to_string()))??;

        if !status.success() {
            return Err(LocalError::Failed {
                command: command_line,
                code: status.code(),
            });
        }
        Ok((stdout, stderr))
    }

    /// Run `argv` and return its stdout. Fails on a non-zero exit.
    pub async fn run_captured(&self, argv: &[String]) -> Result<String, LocalError> {
        let command_line = argv.join(" ");
        let output = self
            .command(argv)?
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| LocalError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !output.status.success() {
            debug!(
                command = %command_line,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "local command failed"
            );
            return Err(LocalError::Failed {
                command: command_line,
                code: output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

async fn forward<R, W>(reader: Option<R>, mut writer: W) -> io::Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(mut reader) = reader {
        tokio::io::copy(&mut reader, &mut writer).await?;
    }
    writer.flush().await?;
    Ok(writer)
}
