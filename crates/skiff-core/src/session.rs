//! Remote session trait for backend-agnostic command execution and file
//! operations.
//!
//! The runner only talks to a [`RemoteSession`] obtained from a
//! [`Connector`]. The production backend is [`crate::ssh::SshConnector`];
//! tests plug in an in-memory implementation.
//!
//! Every path crossing this boundary is already resolved to an absolute
//! POSIX path (remote side) or an absolute [`Path`] (local side).
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use skiff_core::session::{build_command, CommandOptions};
//!
//! let mut env = BTreeMap::new();
//! env.insert("FOO".to_string(), "bar".to_string());
//! let options = CommandOptions { cwd: Some("/home/deploy".to_string()), env };
//!
//! assert_eq!(
//!     build_command("echo $FOO", &options),
//!     "export FOO=bar; cd /home/deploy && echo $FOO"
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::report::TransferProgress;

/// Environment injected into remote commands, in a stable order.
pub type Environment = BTreeMap<String, String>;

/// Errors that can occur during remote session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The SSH or SFTP layer reported an error.
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// Authentication was rejected.
    #[error("authentication failed for {user}@{host}")]
    Auth { user: String, host: String },

    /// A remote command exited with a non-zero status. The message leaves
    /// out `command`, which may hold substituted values.
    #[error("remote command failed with exit status {status}")]
    CommandFailed { command: String, status: i32 },

    /// A remote path does not exist.
    #[error("remote path not found: {0}")]
    NotFound(String),

    /// An I/O error occurred (network or local file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("session task failed: {0}")]
    Task(String),
}

/// Working directory and environment for a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    pub cwd: Option<String>,
    pub env: Environment,
}

/// Prefixes `command` with `cd <cwd> &&` and one `export K=V;` per
/// environment entry.
pub fn build_command(command: &str, options: &CommandOptions) -> String {
    let command = match options.cwd.as_deref() {
        Some(cwd) if !cwd.is_empty() => format!("cd {} && {}", shell_quote(cwd), command),
        _ => command.to_string(),
    };

    if options.env.is_empty() {
        return command;
    }

    let exports: Vec<String> = options
        .env
        .iter()
        .map(|(key, value)| format!("export {}={};", key, value))
        .collect();
    format!("{} {}", exports.join(" "), command)
}

/// Single-quotes `word` for a POSIX shell unless it only holds characters
/// that need no quoting.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Subset of remote file metadata the runner needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub size: u64,
    /// Permission bits (`0o755` and friends).
    pub mode: u32,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Opens remote sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial and authenticate. The returned session is ready for commands.
    async fn dial(&self, target: &ConnectTarget) -> Result<Box<dyn RemoteSession>, SessionError>;
}

/// Asks the operator for a password when `CONNECT` doesn't carry one.
pub trait PasswordPrompt: Send + Sync {
    fn prompt(&self, message: &str) -> std::io::Result<String>;
}

/// Prompt for non-interactive runs; always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl PasswordPrompt for NoPrompt {
    fn prompt(&self, _message: &str) -> std::io::Result<String> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no password given and no terminal to ask for one",
        ))
    }
}

/// A live connection to a remote host.
///
/// Commands stream their output to the operator's terminal; file methods
/// operate over SFTP. At most one operation is in flight at a time.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Tear the connection down. Called exactly once by the runner.
    async fn close(&mut self) -> Result<(), SessionError>;

    /// The directory the session starts in (usually the user's home).
    async fn initial_working_dir(&self) -> Result<String, SessionError>;

    /// Run a command, streaming stdout and stderr live. Returns once the
    /// command has exited and all of its output has been forwarded.
    async fn run_command(&self, command: &str, options: &CommandOptions)
        -> Result<(), SessionError>;

    /// Run a command and return its combined stdout and stderr.
    async fn run_command_captured(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<String, SessionError>;

    /// Read an environment variable as the remote shell sees it, with `env`
    /// exported first. Returns the trimmed value.
    async fn read_env(&self, name: &str, env: &Environment) -> Result<String, SessionError> {
        let options = CommandOptions {
            cwd: None,
            env: env.clone(),
        };
        let output = self
            .run_command_captured(&format!("echo ${}", name), &options)
            .await?;
        Ok(output.trim().to_string())
    }

    /// Stat a remote path. Missing paths yield [`SessionError::NotFound`].
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SessionError>;

    /// List a remote directory, without `.` and `..`.
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError>;

    /// Create a remote directory and any missing parents.
    async fn mkdir_all(&self, path: &str) -> Result<(), SessionError>;

    /// Copy a local file to `remote`, creating or truncating it. Returns the
    /// number of bytes written.
    async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        progress: Box<dyn TransferProgress>,
    ) -> Result<u64, SessionError>;

    /// Copy a remote file to `local`, creating or truncating it. Returns the
    /// number of bytes written.
    async fn download_file(
        &self,
        remote: &str,
        local: &Path,
        progress: Box<dyn TransferProgress>,
    ) -> Result<u64, SessionError>;

    /// Duplicate a remote file's content.
    async fn copy_file(&self, source: &str, destination: &str) -> Result<(), SessionError>;

    /// Set permission bits on a remote path.
    async fn chmod(&self, path: &str, mode: u32) -> Result<(), SessionError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError>;

    /// Remove a file or an empty directory.
    async fn remove(&self, path: &str) -> Result<(), SessionError>;
}
