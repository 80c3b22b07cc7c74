//! Error types for script parsing and execution.
//!
//! Parse-time problems surface as [`SkiffError::Grammar`] before anything
//! runs. Execution-time problems are wrapped in [`SkiffError::Step`] so the
//! operator sees which step failed and what it was doing.

use thiserror::Error;

use crate::local::LocalError;
use crate::session::SessionError;
use crate::transfer::TransferError;

/// Top-level error returned by [`crate::parser::parse`] and
/// [`crate::runner::Runner::run`].
#[derive(Error, Debug)]
pub enum SkiffError {
    /// Malformed line, unknown keyword, or wrong argument shape.
    #[error("Grammar error at line {line}: {message}")]
    Grammar { message: String, line: usize },

    /// A step failed while the script was running.
    #[error("Step {step} failed ({action}): {source}")]
    Step {
        step: usize,
        action: String,
        #[source]
        source: ActionError,
    },

    /// Reading the script or other local I/O outside a step.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkiffError {
    pub(crate) fn grammar(line: usize, message: impl Into<String>) -> Self {
        SkiffError::Grammar {
            message: message.into(),
            line,
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> i32 {
        match self {
            SkiffError::Grammar { .. } => 2,
            SkiffError::Step { source, .. } => match source {
                ActionError::NotConnected => 3,
                _ => 1,
            },
            SkiffError::Io(_) => 4,
        }
    }

    /// The failing step's inner error, if this is an execution failure.
    pub fn action_error(&self) -> Option<&ActionError> {
        match self {
            SkiffError::Step { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why a single action failed.
#[derive(Error, Debug)]
pub enum ActionError {
    /// A remote action ran before any CONNECT succeeded.
    #[error("you need to connect to a server first")]
    NotConnected,

    /// Dialing or authenticating failed.
    #[error("connection failed: {0}")]
    Connection(#[source] SessionError),

    /// A remote command, rename, copy or delete failed.
    #[error(transparent)]
    Remote(#[from] SessionError),

    /// An upload or download failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// A local command failed.
    #[error(transparent)]
    Local(#[from] LocalError),

    /// Reading the password from the terminal failed.
    #[error("password prompt failed: {0}")]
    Prompt(#[source] std::io::Error),
}
