//! Remote channel errors

use thiserror::Error;

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote execution failures.
///
/// All of them surface to the caller; the channel never swallows one.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Host unreachable or authentication refused
    #[error("cannot reach {host}: {reason}")]
    Connection { host: String, reason: String },

    /// Connect or command exceeded its bound
    #[error("{host}: timed out after {seconds}s")]
    Timeout { host: String, seconds: u64 },

    /// Remote process exited non-zero or wrote diagnostics
    #[error("{host}: `{command}` failed (status {status:?}): {stderr}")]
    Command {
        host: String,
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// File delivery failed
    #[error("{host}: cannot write {path}: {reason}")]
    Transfer {
        host: String,
        path: String,
        reason: String,
    },
}

impl RemoteError {
    /// Diagnostic text reported by the remote side, if any.
    pub fn diagnostics(&self) -> &str {
        match self {
            Self::Command { stderr, .. } => stderr,
            Self::Transfer { reason, .. } => reason,
            Self::Connection { reason, .. } => reason,
            Self::Timeout { .. } => "",
        }
    }
}
